use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use warden::config::{self, Config, Format};
use warden::Controller;
use warden_daemon::{read_pid, PidFile};
use warden_guard::{store, ActualState, DesiredState, ShutdownOutcome};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("warden-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::remove_dir_all(&dir);
	let _ = std::fs::create_dir_all(&dir);
	dir
}

/// Two long-running shell children, `alpha` and `beta`, rooted at `dir`.
fn two_child_config(dir: &Path) -> Config {
	for name in ["alpha", "beta"] {
		std::fs::write(dir.join(format!("{}.sh", name)), "exec sleep 30\n").unwrap();
	}
	let json = r#"{
		"subprocess": {"max_stop_timeout": 2},
		"subprocesses": [
			{"name": "alpha", "binary": "alpha.sh", "interpreter": "/bin/sh"},
			{"name": "beta", "binary": "beta.sh", "interpreter": "/bin/sh"}
		]
	}"#;
	Config::resolve(config::parse(json, Format::Json).unwrap(), dir).unwrap()
}

async fn wait_for_pids(controller: &Controller) -> Vec<u32> {
	for _ in 0..100 {
		let mut pids = Vec::new();
		for guard in controller.guards() {
			if let Some(pid) = guard.pid().await {
				pids.push(pid);
			}
		}
		if pids.len() == controller.guards().len() {
			return pids;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("children did not start");
}

fn pid_exists(pid: u32) -> bool {
	kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn supervises_until_shutdown_then_stops_children_in_order() {
	let dir = temp_dir("lifecycle");
	let config = two_child_config(&dir);
	let pid_file = PidFile::create(&config.pid_file).unwrap();

	let controller = Controller::new(&config);
	assert!(!controller.running());

	let (tx, rx) = tokio::sync::oneshot::channel::<Vec<u32>>();
	let outcomes = controller
		.run_until(async {
			let pids = wait_for_pids(&controller).await;
			assert!(controller.running());
			let _ = tx.send(pids);
		})
		.await;

	let names: Vec<&str> = outcomes.iter().map(|(name, _)| name.as_str()).collect();
	assert_eq!(names, vec!["alpha", "beta"]);
	assert!(outcomes.iter().all(|(_, outcome)| *outcome == ShutdownOutcome::Exited));
	assert!(!controller.running());

	for pid in rx.await.unwrap() {
		assert!(!pid_exists(pid), "child {} still alive", pid);
	}
	for guard in controller.guards() {
		assert_eq!(guard.actual_state().await, ActualState::Stopped);
		// Shutdown is not a stop request: the next run resumes the children.
		assert_eq!(guard.desired_state().await, DesiredState::Running);
	}

	// The PID file outlives the children and goes with the guard.
	assert_eq!(read_pid(&config.pid_file), Some(std::process::id()));
	drop(pid_file);
	assert!(!config.pid_file.exists());

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn persisted_stop_is_honoured_on_next_run() {
	let dir = temp_dir("persisted-stop");
	let config = two_child_config(&dir);
	let beta_state = config.guard_config("beta").state_file;
	store::write_value(&beta_state, &DesiredState::Stopped).unwrap();

	let controller = Controller::new(&config);
	let outcomes = controller
		.run_until(async {
			let alpha = &controller.guards()[0];
			for _ in 0..100 {
				if alpha.pid().await.is_some() {
					break;
				}
				tokio::time::sleep(Duration::from_millis(50)).await;
			}
			assert!(alpha.pid().await.is_some());
		})
		.await;

	assert_eq!(outcomes[0], ("alpha".to_string(), ShutdownOutcome::Exited));
	assert_eq!(outcomes[1], ("beta".to_string(), ShutdownOutcome::NotRunning));
	assert_eq!(store::read_value::<DesiredState>(&beta_state), Some(DesiredState::Stopped));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn per_child_files_land_in_the_config_root() {
	let dir = temp_dir("files");
	let config = two_child_config(&dir);
	let controller = Controller::new(&config);

	controller
		.run_until(async {
			wait_for_pids(&controller).await;
		})
		.await;

	assert!(dir.join("state.alpha").exists());
	assert!(dir.join("state.beta").exists());
	assert!(dir.join("stderr_file.alpha").exists());

	let _ = std::fs::remove_dir_all(&dir);
}

use std::fs::File;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;

use crate::failure::{describe_failure, ExitKind};
use crate::store;
use crate::types::*;

const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps one child program in its desired state.
pub struct ProcessGuard {
	spec: ChildSpec,
	config: GuardConfig,
	inner: Mutex<GuardState>,
}

struct GuardState {
	desired: DesiredState,
	runtime: ChildRuntime,
}

/// The OS process tracked by a guard, if any.
pub enum ChildRuntime {
	Absent,
	Running(RunningChild),
}

impl ChildRuntime {
	/// The tracked child, only while it has not exited.
	fn live(&mut self) -> Option<&mut RunningChild> {
		match self {
			ChildRuntime::Running(child) => {
				if child.is_alive() {
					Some(child)
				} else {
					None
				}
			}
			ChildRuntime::Absent => None,
		}
	}
}

pub struct RunningChild {
	child: Child,
	pid: u32,
	exit: Option<ExitStatus>,
	/// `try_wait` failed, so the exit status will never be known.
	lost: bool,
}

impl RunningChild {
	/// `None` once the child has been reaped and its pid may be reused.
	fn new(child: Child) -> Option<Self> {
		let pid = child.id()?;
		Some(Self {
			child,
			pid,
			exit: None,
			lost: false,
		})
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn exit_status(&self) -> Option<ExitStatus> {
		self.exit
	}

	/// Polls the OS; reaps and records the exit status once the child is gone.
	pub fn is_alive(&mut self) -> bool {
		if self.exit.is_some() || self.lost {
			return false;
		}
		match self.child.try_wait() {
			Ok(None) => true,
			Ok(Some(status)) => {
				self.exit = Some(status);
				false
			}
			Err(e) => {
				tracing::warn!("lost track of pid {}: {}", self.pid, e);
				self.lost = true;
				false
			}
		}
	}

	fn signal(&self, signal: Signal) {
		match kill(Pid::from_raw(self.pid as i32), signal) {
			Ok(()) | Err(Errno::ESRCH) => {}
			Err(e) => tracing::warn!("failed to send {:?} to pid {}: {}", signal, self.pid, e),
		}
	}
}

impl ProcessGuard {
	/// Build a guard, resuming the desired state persisted by a previous run.
	pub fn new(spec: ChildSpec, config: GuardConfig) -> Self {
		let desired = store::read_value(&config.state_file).unwrap_or(if spec.autostart {
			DesiredState::Running
		} else {
			DesiredState::Stopped
		});
		tracing::debug!("{}: initial desired state {:?}", spec.name, desired);
		Self {
			spec,
			config,
			inner: Mutex::new(GuardState {
				desired,
				runtime: ChildRuntime::Absent,
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.spec.name
	}

	pub fn check_interval(&self) -> Duration {
		self.config.check_interval
	}

	pub async fn desired_state(&self) -> DesiredState {
		self.inner.lock().await.desired
	}

	/// Record intent in memory and on disk. Returns `false` if the store write failed.
	pub async fn set_desired_state(&self, desired: DesiredState) -> bool {
		let mut state = self.inner.lock().await;
		self.set_desired(&mut state, desired)
	}

	pub async fn actual_state(&self) -> ActualState {
		let mut state = self.inner.lock().await;
		match state.runtime.live() {
			Some(_) => ActualState::Running,
			None => ActualState::Stopped,
		}
	}

	/// Pid of the live child, if any.
	pub async fn pid(&self) -> Option<u32> {
		let mut state = self.inner.lock().await;
		state.runtime.live().map(|child| child.pid())
	}

	/// Launch the child unless it is already alive.
	pub async fn start(&self) -> bool {
		let mut state = self.inner.lock().await;
		self.start_locked(&mut state)
	}

	/// Signal the child (SIGINT, or SIGKILL when `hard`) and forget it without waiting.
	pub async fn stop(&self, hard: bool) -> bool {
		let mut state = self.inner.lock().await;
		self.stop_locked(&mut state, hard)
	}

	pub async fn restart(&self, hard: bool) -> bool {
		let mut state = self.inner.lock().await;
		self.stop_locked(&mut state, hard) && self.start_locked(&mut state)
	}

	/// Terminate for supervisor shutdown: SIGTERM, then SIGKILL once
	/// `max_stop_timeout` has passed. Desired state is left as is.
	pub async fn stop_for_shutdown(&self) -> ShutdownOutcome {
		let mut state = self.inner.lock().await;
		let runtime = std::mem::replace(&mut state.runtime, ChildRuntime::Absent);
		let mut child = match runtime {
			ChildRuntime::Running(child) => child,
			ChildRuntime::Absent => return ShutdownOutcome::NotRunning,
		};
		if !child.is_alive() {
			return ShutdownOutcome::NotRunning;
		}

		tracing::info!("Stopping subprocess {} ({})", self.spec.name, child.pid);
		child.signal(Signal::SIGTERM);

		let mut waited = Duration::ZERO;
		let mut killed = false;
		while child.is_alive() {
			if !killed && waited >= self.config.max_stop_timeout {
				child.signal(Signal::SIGKILL);
				tracing::error!("Subprocess ({}; {}) was killed", self.spec.name, child.pid);
				killed = true;
			}
			tokio::time::sleep(STOP_POLL_INTERVAL).await;
			waited += STOP_POLL_INTERVAL;
		}

		if killed {
			ShutdownOutcome::ForceKilled
		} else {
			ShutdownOutcome::Exited
		}
	}

	/// Diagnostic for a child that was launched and has since exited.
	pub async fn classify_failure(&self) -> Option<String> {
		let mut state = self.inner.lock().await;
		self.failure_locked(&mut state)
	}

	/// One reconciliation pass. No child is launched once `running` is cleared.
	pub async fn reconcile(&self, running: &AtomicBool) -> Tick {
		let mut state = self.inner.lock().await;
		let alive = state.runtime.live().is_some();

		match (state.desired, alive) {
			(DesiredState::Running, false) => {
				if let Some(message) = self.failure_locked(&mut state) {
					tracing::error!("Process {} failed : {}", self.spec.name, message);
				}
				if !running.load(Ordering::SeqCst) {
					return Tick::Idle;
				}
				if self.start_locked(&mut state) {
					Tick::Started
				} else {
					Tick::StartFailed
				}
			}
			(DesiredState::Stopped, true) => {
				self.stop_locked(&mut state, false);
				Tick::Stopped
			}
			_ => Tick::Idle,
		}
	}

	fn set_desired(&self, state: &mut GuardState, desired: DesiredState) -> bool {
		state.desired = desired;
		match store::write_value(&self.config.state_file, &desired) {
			Ok(()) => true,
			Err(e) => {
				tracing::error!(
					"unable to save state in file {}: {}",
					self.config.state_file.display(),
					e
				);
				false
			}
		}
	}

	fn start_locked(&self, state: &mut GuardState) -> bool {
		if state.runtime.live().is_some() {
			return true;
		}

		// A message left by an earlier run must not be attributed to this one.
		let _ = std::fs::remove_file(&self.config.error_message_file);

		let mut cmd = self.command();
		let piped = match self.open_stderr() {
			Some(file) => {
				cmd.stderr(Stdio::from(file));
				false
			}
			None => {
				cmd.stderr(Stdio::piped());
				true
			}
		};

		tracing::info!("Starting {}", self.describe_command());
		match cmd.spawn() {
			Ok(mut child) => {
				if piped {
					if let Some(stderr) = child.stderr.take() {
						tokio::spawn(forward_stderr(self.spec.name.clone(), stderr));
					}
				}
				let child = match RunningChild::new(child) {
					Some(child) => child,
					None => {
						tracing::error!("{}: exited before its pid could be recorded", self.spec.name);
						state.runtime = ChildRuntime::Absent;
						return false;
					}
				};
				tracing::info!("{}: started (pid {})", self.spec.name, child.pid);
				state.runtime = ChildRuntime::Running(child);
				self.set_desired(state, DesiredState::Running);
				true
			}
			Err(e) => {
				tracing::error!("{} (Error code: {})", e, e.raw_os_error().unwrap_or(0));
				state.runtime = ChildRuntime::Absent;
				false
			}
		}
	}

	fn stop_locked(&self, state: &mut GuardState, hard: bool) -> bool {
		let child = match state.runtime.live() {
			Some(child) => child,
			None => return true,
		};

		tracing::info!("Stopping subprocess ({}), hard: {}", child.pid, hard);
		child.signal(if hard { Signal::SIGKILL } else { Signal::SIGINT });
		state.runtime = ChildRuntime::Absent;
		self.set_desired(state, DesiredState::Stopped);
		true
	}

	fn failure_locked(&self, state: &mut GuardState) -> Option<String> {
		let child = match &mut state.runtime {
			ChildRuntime::Running(child) => child,
			ChildRuntime::Absent => return None,
		};
		if child.is_alive() {
			return None;
		}
		Some(describe_failure(
			&self.spec.name,
			&self.config.error_message_file,
			self.config.stderr_file.as_deref(),
			child.exit_status().as_ref().map(ExitKind::from_status),
		))
	}

	fn command(&self) -> Command {
		let mut cmd = match self.spec.launcher() {
			Some(interpreter) => {
				let mut cmd = Command::new(interpreter);
				cmd.arg(&self.spec.binary);
				cmd
			}
			None => Command::new(&self.spec.binary),
		};

		cmd.args(&self.spec.args)
			.arg("--exit-error-message-file")
			.arg(&self.config.error_message_file)
			.stdin(Stdio::null());

		if let Some(dir) = self.spec.binary.parent() {
			cmd.env("LD_LIBRARY_PATH", dir);
		}
		for (key, val) in &self.spec.env {
			cmd.env(key, val);
		}
		cmd
	}

	fn describe_command(&self) -> String {
		let mut parts: Vec<String> = Vec::new();
		if let Some(interpreter) = self.spec.launcher() {
			parts.push(interpreter.to_string());
		}
		parts.push(self.spec.binary.display().to_string());
		parts.extend(self.spec.args.iter().cloned());
		parts.push("--exit-error-message-file".to_string());
		parts.push(self.config.error_message_file.display().to_string());
		parts.join(" ")
	}

	fn open_stderr(&self) -> Option<File> {
		let path = self.config.stderr_file.as_ref()?;
		match File::create(path) {
			Ok(file) => Some(file),
			Err(e) => {
				tracing::warn!("{}: cannot open {} ({}), using a pipe", self.spec.name, path.display(), e);
				None
			}
		}
	}
}

async fn forward_stderr(name: String, stderr: ChildStderr) {
	let mut lines = BufReader::new(stderr).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		tracing::warn!("[{}] {}", name, line);
	}
}

use std::process::ExitCode;

use owo_colors::OwoColorize;
use warden::cli::{self, Command};
use warden::config::{self, Config};
use warden::Controller;
use warden_daemon::{Daemon, DaemonError, Detached, PidFile, ProcessIdentity, StopOutcome};
use warden_guard::{store, DesiredState};

fn main() -> ExitCode {
	let argv: Vec<String> = std::env::args().skip(1).collect();
	let args = match cli::parse_args(&argv) {
		Ok(args) => args,
		Err(message) => {
			println!("{}", message);
			print_usage();
			return ExitCode::FAILURE;
		}
	};
	if args.command == Command::Help {
		print_usage();
		return ExitCode::SUCCESS;
	}

	let config_path = config::locate(args.config.as_deref());
	let config = match Config::load(&config_path) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};
	let identity = match ProcessIdentity::current() {
		Ok(identity) => identity,
		Err(e) => {
			eprintln!("{} cannot resolve own executable: {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};
	let daemon = Daemon::new(config.daemon_paths(), identity);

	match args.command {
		Command::Start => cmd_start(&daemon, &config, args.foreground),
		Command::Stop => cmd_stop(&daemon),
		Command::Restart => cmd_restart(&daemon, &config, args.foreground),
		Command::Status => cmd_status(&daemon, &config),
		Command::Help => ExitCode::SUCCESS,
	}
}

fn print_usage() {
	println!("{} {} - keeps configured programs running", "warden".bold(), env!("CARGO_PKG_VERSION"));
	println!();
	println!("usage: {} [-c <config>] [-f] [command]", "warden".bold());
	println!();
	println!("{}", "commands".cyan().bold());
	println!("  {}     Start the watchdog daemon (alias: run)", "start".bold());
	println!("  {}      Stop the watchdog daemon (alias: exit, close)", "stop".bold());
	println!("  {}   Restart the watchdog daemon (alias: re)", "restart".bold());
	println!("  {}    Show daemon and subprocess state (default, alias: stat)", "status".bold());
	println!("  {}      Show this help", "help".bold());
	println!();
	println!("{}", "options".cyan().bold());
	println!("  {}  Configuration file (default: ${} or warden.toml / wd.cfg next to the binary)", "-c, --config".bold(), config::CONFIG_ENV);
	println!("  {}  Run in the foreground without detaching", "-f, --foreground".bold());
}

fn cmd_start(daemon: &Daemon, config: &Config, foreground: bool) -> ExitCode {
	if foreground {
		return match daemon.start_foreground() {
			Ok(pid_file) => serve(config, pid_file, true),
			Err(e) => start_failed(e),
		};
	}
	report_detach(daemon.start(), config)
}

fn cmd_stop(daemon: &Daemon) -> ExitCode {
	match daemon.stop() {
		Ok(StopOutcome::Stopped(_)) => ExitCode::SUCCESS,
		Ok(StopOutcome::NotRunning) | Ok(StopOutcome::Stale(_)) => {
			println!("Daemon is not running");
			ExitCode::SUCCESS
		}
		Err(e) => {
			println!("Could not stop watchdog. Pid : {}", daemon.running_pid().unwrap_or(0));
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}

fn cmd_restart(daemon: &Daemon, config: &Config, foreground: bool) -> ExitCode {
	if daemon.running_pid().is_none() {
		println!("Watchdog is not running. Starting ..");
		return cmd_start(daemon, config, foreground);
	}
	if foreground {
		if let Err(e) = daemon.stop() {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
		return cmd_start(daemon, config, true);
	}
	report_detach(daemon.restart(), config)
}

fn cmd_status(daemon: &Daemon, config: &Config) -> ExitCode {
	match daemon.running_pid() {
		Some(pid) => println!("Watchdog is running. Pid: {}", pid.green()),
		None => println!("Watchdog is not running"),
	}

	for spec in &config.children {
		let state_file = config.guard_config(&spec.name).state_file;
		let state = match store::read_value::<DesiredState>(&state_file) {
			Some(DesiredState::Running) => "running".green().to_string(),
			Some(DesiredState::Stopped) => "stopped".red().to_string(),
			None => "unset".dimmed().to_string(),
		};
		println!("  {:<20} {}", spec.name.bold(), state);
	}
	ExitCode::SUCCESS
}

fn report_detach(result: Result<Detached, DaemonError>, config: &Config) -> ExitCode {
	match result {
		Ok(Detached::Parent { pid: Some(_) }) => ExitCode::SUCCESS,
		Ok(Detached::Parent { pid: None }) => {
			println!("Could not start daemon");
			ExitCode::FAILURE
		}
		Ok(Detached::Daemon(pid_file)) => serve(config, pid_file, false),
		Err(e) => start_failed(e),
	}
}

fn start_failed(e: DaemonError) -> ExitCode {
	match e {
		DaemonError::AlreadyRunning(pid) => {
			println!("Already started. Pid : {}", pid);
			ExitCode::SUCCESS
		}
		e => {
			println!("Could not start daemon");
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}

/// Body of the daemon process. The PID file is released only after every
/// child has been stopped.
fn serve(config: &Config, pid_file: PidFile, ansi: bool) -> ExitCode {
	warden::init_tracing(config.log_level, ansi);
	tracing::info!(
		"Watchdog running (pid {}, pid file {}), config root {}",
		pid_file.pid(),
		pid_file.path().display(),
		config.root.display()
	);

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(runtime) => runtime,
		Err(e) => {
			tracing::error!("cannot start runtime: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let controller = Controller::new(config);
	let code = match runtime.block_on(controller.run()) {
		Ok(_) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!("cannot install signal handlers: {}", e);
			ExitCode::FAILURE
		}
	};

	drop(runtime);
	drop(pid_file);
	code
}

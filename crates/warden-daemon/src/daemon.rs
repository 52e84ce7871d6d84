use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::{umask, Mode};
use nix::sys::wait::waitpid;
use nix::unistd::{chdir, dup2, fork, setsid, ForkResult, Pid};

use crate::identity::ProcessIdentity;
use crate::paths::DaemonPaths;
use crate::pidfile::{read_pid, PidFile};

const STOP_POLL: Duration = Duration::from_millis(100);
const STARTUP_POLLS: u32 = 50;

/// Errors from daemon lifecycle operations.
#[derive(Debug)]
pub enum DaemonError {
	/// A live daemon with the expected identity already owns the PID file.
	AlreadyRunning(u32),
	/// fork() or setsid() failed.
	Detach(Errno),
	/// Signal delivery failed for a reason other than "no such process".
	Signal { pid: u32, errno: Errno },
	/// IO error on the PID file or standard streams.
	Io(io::Error),
}

impl std::fmt::Display for DaemonError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DaemonError::AlreadyRunning(pid) => write!(f, "already running (pid {})", pid),
			DaemonError::Detach(e) => write!(f, "failed to detach: {}", e),
			DaemonError::Signal { pid, errno } => write!(f, "failed to signal pid {}: {}", pid, errno),
			DaemonError::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for DaemonError {}

impl From<io::Error> for DaemonError {
	fn from(e: io::Error) -> Self {
		DaemonError::Io(e)
	}
}

/// Which side of the detachment the caller is on after [`Daemon::start`].
#[derive(Debug)]
pub enum Detached {
	/// The invoking process. `pid` is the daemon's pid once its PID file appeared.
	Parent { pid: Option<u32> },
	/// The detached daemon. Dropping the guard removes the PID file.
	Daemon(PidFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
	Stopped(u32),
	/// No PID file.
	NotRunning,
	/// The PID file named a dead or unrelated process; the file was removed.
	Stale(u32),
}

pub struct Daemon {
	pub paths: DaemonPaths,
	identity: ProcessIdentity,
}

impl Daemon {
	pub fn new(paths: DaemonPaths, identity: ProcessIdentity) -> Self {
		Self { paths, identity }
	}

	/// Pid of the running daemon, if the PID file names a live process with our identity.
	pub fn running_pid(&self) -> Option<u32> {
		read_pid(&self.paths.pid_path).filter(|pid| self.identity.matches(*pid))
	}

	/// Detach and become the daemon.
	///
	/// Returns [`Detached::Parent`] in the invoking process and
	/// [`Detached::Daemon`] in the final, session-less daemon process. The
	/// intermediate process exits inside this call. Must be called before any
	/// threads (including a tokio runtime) are started.
	pub fn start(&self) -> Result<Detached, DaemonError> {
		self.ensure_not_running()?;

		// SAFETY: the caller guarantees the process is still single-threaded.
		match unsafe { fork() }.map_err(DaemonError::Detach)? {
			ForkResult::Parent { child } => {
				let _ = waitpid(child, None);
				return Ok(Detached::Parent {
					pid: self.wait_for_daemon(),
				});
			}
			ForkResult::Child => {}
		}

		let _ = chdir("/");
		setsid().map_err(DaemonError::Detach)?;
		umask(Mode::empty());

		// SAFETY: still single-threaded, see above.
		match unsafe { fork() } {
			Ok(ForkResult::Parent { .. }) => std::process::exit(0),
			Ok(ForkResult::Child) => {}
			Err(e) => {
				eprintln!("second fork failed: {}", e);
				std::process::exit(1);
			}
		}

		self.redirect_stdio()?;
		let pid_file = PidFile::create(&self.paths.pid_path)?;
		Ok(Detached::Daemon(pid_file))
	}

	/// Claim the PID file without detaching.
	pub fn start_foreground(&self) -> Result<PidFile, DaemonError> {
		self.ensure_not_running()?;
		Ok(PidFile::create(&self.paths.pid_path)?)
	}

	/// Terminate the running daemon and wait until the OS confirms it is gone.
	pub fn stop(&self) -> Result<StopOutcome, DaemonError> {
		let pid = match read_pid(&self.paths.pid_path) {
			Some(pid) => pid,
			None => return Ok(StopOutcome::NotRunning),
		};

		if !self.identity.matches(pid) {
			tracing::warn!(
				"pid {} from {} is not a running {}",
				pid,
				self.paths.pid_path.display(),
				self.identity.exe().display()
			);
			let _ = std::fs::remove_file(&self.paths.pid_path);
			return Ok(StopOutcome::Stale(pid));
		}

		let target = Pid::from_raw(pid as i32);
		loop {
			match kill(target, Signal::SIGTERM) {
				Ok(()) => std::thread::sleep(STOP_POLL),
				Err(Errno::ESRCH) => break,
				Err(errno) => return Err(DaemonError::Signal { pid, errno }),
			}
		}

		let _ = std::fs::remove_file(&self.paths.pid_path);
		Ok(StopOutcome::Stopped(pid))
	}

	pub fn restart(&self) -> Result<Detached, DaemonError> {
		self.stop()?;
		self.start()
	}

	fn ensure_not_running(&self) -> Result<(), DaemonError> {
		if let Some(pid) = self.running_pid() {
			return Err(DaemonError::AlreadyRunning(pid));
		}
		// Whatever is left over belongs to a dead daemon.
		if self.paths.pid_path.exists() {
			let _ = std::fs::remove_file(&self.paths.pid_path);
		}
		Ok(())
	}

	fn wait_for_daemon(&self) -> Option<u32> {
		for _ in 0..STARTUP_POLLS {
			if let Some(pid) = self.running_pid() {
				return Some(pid);
			}
			std::thread::sleep(STOP_POLL);
		}
		None
	}

	fn redirect_stdio(&self) -> io::Result<()> {
		let null = File::open("/dev/null")?;
		let log = match OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.paths.log_path)
		{
			Ok(f) => f,
			Err(_) => OpenOptions::new().write(true).open("/dev/null")?,
		};

		dup2(null.as_raw_fd(), 0).map_err(io::Error::from)?;
		dup2(log.as_raw_fd(), 1).map_err(io::Error::from)?;
		dup2(log.as_raw_fd(), 2).map_err(io::Error::from)?;
		Ok(())
	}
}

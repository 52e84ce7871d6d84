use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// The executable a daemon process is expected to be running.
///
/// A PID file can outlive its daemon and the pid can be recycled by an
/// unrelated process, so a live pid only counts when its executable matches.
#[derive(Debug, Clone)]
pub struct ProcessIdentity {
	exe: PathBuf,
}

impl ProcessIdentity {
	pub fn new(exe: impl Into<PathBuf>) -> Self {
		let exe = exe.into();
		let exe = exe.canonicalize().unwrap_or(exe);
		Self { exe }
	}

	/// Identity of the running executable.
	pub fn current() -> io::Result<Self> {
		Ok(Self::new(std::env::current_exe()?))
	}

	pub fn exe(&self) -> &Path {
		&self.exe
	}

	/// True when `pid` is alive and runs this executable.
	pub fn matches(&self, pid: u32) -> bool {
		is_alive(pid) && self.same_executable(pid)
	}

	#[cfg(target_os = "linux")]
	fn same_executable(&self, pid: u32) -> bool {
		if let Ok(target) = std::fs::read_link(format!("/proc/{}/exe", pid)) {
			let target = strip_deleted(&target);
			let target = target.canonicalize().unwrap_or(target);
			if target == self.exe {
				return true;
			}
		}

		// /proc/<pid>/exe is unreadable for other users' processes; cmdline is not.
		let cmdline = match std::fs::read(format!("/proc/{}/cmdline", pid)) {
			Ok(c) => c,
			Err(_) => return false,
		};
		let argv0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
		let argv0 = String::from_utf8_lossy(argv0);
		self.same_file_name(Path::new(argv0.as_ref()))
	}

	#[cfg(target_os = "macos")]
	fn same_executable(&self, pid: u32) -> bool {
		match libproc::proc_pid::pidpath(pid as i32) {
			Ok(path) => {
				let path = PathBuf::from(path);
				path.canonicalize().unwrap_or(path) == self.exe
			}
			Err(_) => false,
		}
	}

	#[cfg(not(any(target_os = "linux", target_os = "macos")))]
	fn same_executable(&self, _pid: u32) -> bool {
		true
	}

	#[cfg(target_os = "linux")]
	fn same_file_name(&self, other: &Path) -> bool {
		match (self.exe.file_name(), other.file_name()) {
			(Some(a), Some(b)) => a == b,
			_ => false,
		}
	}
}

/// True if a process with this pid exists (zombies included).
pub fn is_alive(pid: u32) -> bool {
	if pid == 0 || pid > i32::MAX as u32 {
		return false;
	}
	match kill(Pid::from_raw(pid as i32), None) {
		Ok(()) => true,
		Err(Errno::EPERM) => true,
		Err(_) => false,
	}
}

// The kernel appends " (deleted)" when the binary was replaced on disk.
#[cfg(target_os = "linux")]
fn strip_deleted(path: &Path) -> PathBuf {
	let text = path.to_string_lossy();
	match text.strip_suffix(" (deleted)") {
		Some(stripped) => PathBuf::from(stripped),
		None => path.to_path_buf(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_process_matches_itself() {
		let identity = ProcessIdentity::current().unwrap();
		assert!(identity.matches(std::process::id()));
	}

	#[test]
	fn other_executable_does_not_match() {
		let identity = ProcessIdentity::new("/definitely/not/warden");
		assert!(!identity.matches(std::process::id()));
	}

	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!is_alive(0));
	}

	#[cfg(target_os = "linux")]
	#[test]
	fn deleted_suffix_is_stripped() {
		assert_eq!(strip_deleted(Path::new("/usr/bin/warden (deleted)")), PathBuf::from("/usr/bin/warden"));
		assert_eq!(strip_deleted(Path::new("/usr/bin/warden")), PathBuf::from("/usr/bin/warden"));
	}
}

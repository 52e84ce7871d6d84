use std::io;
use std::path::{Path, PathBuf};

/// Read the pid stored in a PID file. Missing or garbage content reads as `None`.
pub fn read_pid(path: &Path) -> Option<u32> {
	std::fs::read_to_string(path)
		.ok()
		.and_then(|s| s.trim().parse().ok())
		.filter(|pid| *pid > 0)
}

pub fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, format!("{}\n", pid))
}

/// PID file owned by the running daemon. The file is removed when this is dropped.
#[derive(Debug)]
pub struct PidFile {
	path: PathBuf,
	pid: u32,
}

impl PidFile {
	/// Record the current process id at `path`.
	pub fn create(path: &Path) -> io::Result<Self> {
		let pid = std::process::id();
		write_pid(path, pid)?;
		Ok(Self {
			path: path.to_path_buf(),
			pid,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}
}

impl Drop for PidFile {
	fn drop(&mut self) {
		// A replacement daemon may already own the file.
		if read_pid(&self.path) == Some(self.pid) {
			let _ = std::fs::remove_file(&self.path);
		}
	}
}

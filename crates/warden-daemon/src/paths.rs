use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DaemonPaths {
	pub pid_path: PathBuf,
	pub log_path: PathBuf,
}

impl DaemonPaths {
	pub fn new(pid_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
		Self {
			pid_path: pid_path.into(),
			log_path: log_path.into(),
		}
	}

	/// Both files resolved against `root` unless already absolute.
	pub fn in_dir(root: &Path, pid_name: &str, log_name: &str) -> Self {
		Self::new(resolve(root, pid_name), resolve(root, log_name))
	}
}

/// Joins `name` onto `root` unless `name` is already absolute.
pub fn resolve(root: &Path, name: &str) -> PathBuf {
	let path = Path::new(name);
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		root.join(path)
	}
}

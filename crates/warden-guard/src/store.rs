//! Single-value files: one scalar per file, written whole.

use std::fmt::Display;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Read and parse the value stored at `path`. Missing, unreadable or
/// unparsable files read as `None`.
pub fn read_value<T: FromStr>(path: &Path) -> Option<T> {
	match std::fs::read_to_string(path) {
		Ok(content) => content.trim().parse().ok(),
		Err(e) if e.kind() == io::ErrorKind::NotFound => None,
		Err(e) => {
			tracing::error!("unable to read from file {}: {}", path.display(), e);
			None
		}
	}
}

/// Replace the value stored at `path`. The new content is written to a
/// sibling file first and renamed over, so readers see old or new, never half.
pub fn write_value<T: Display>(path: &Path, value: &T) -> io::Result<()> {
	let file_name = path
		.file_name()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
	let mut tmp_name = file_name.to_os_string();
	tmp_name.push(".tmp");
	let tmp = path.with_file_name(tmp_name);

	std::fs::write(&tmp, value.to_string())?;
	std::fs::rename(&tmp, path)
}

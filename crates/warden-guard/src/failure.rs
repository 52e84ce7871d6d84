//! Failure diagnostics for children that exited while they were meant to run.

use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
	Signal(i32),
	Code(i32),
}

impl ExitKind {
	pub fn from_status(status: &ExitStatus) -> Self {
		match status.signal() {
			Some(signo) => ExitKind::Signal(signo),
			None => ExitKind::Code(status.code().unwrap_or(-1)),
		}
	}

	pub fn label(&self) -> String {
		match *self {
			ExitKind::Signal(signo) if signo == Signal::SIGABRT as i32 => "SIGABRT received".to_string(),
			ExitKind::Signal(signo) if signo == Signal::SIGKILL as i32 => "SIGKILL received".to_string(),
			ExitKind::Signal(signo) if signo == Signal::SIGSEGV as i32 => "Segmentation fault".to_string(),
			// Signals are reported as negative codes.
			ExitKind::Signal(signo) => format!("exit code {}", -signo),
			ExitKind::Code(code) => format!("exit code {}", code),
		}
	}
}

/// Compose the diagnostic for a failed child: the child's own error message,
/// then whatever it wrote to stderr, then how it exited.
pub fn describe_failure(
	name: &str,
	error_message_file: &Path,
	stderr_file: Option<&Path>,
	exit: Option<ExitKind>,
) -> String {
	let mut message = String::new();
	if let Ok(content) = std::fs::read_to_string(error_message_file) {
		message.push_str(&content);
	}
	if let Some(Ok(content)) = stderr_file.map(std::fs::read_to_string) {
		message.push_str(&content);
	}

	if let Some(exit) = exit {
		if !message.is_empty() {
			message.push(' ');
		}
		message.push_str(&exit.label());
	}

	if message.is_empty() {
		format!("Unexpected termination of {}", name)
	} else {
		message
	}
}

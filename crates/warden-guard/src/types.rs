use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// One configured child program. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSpec {
	pub name: String,
	pub binary: PathBuf,
	/// Program that runs `binary`, e.g. `python3`. `None` means infer from the extension.
	pub interpreter: Option<String>,
	pub args: Vec<String>,
	pub env: HashMap<String, String>,
	/// Desired state when nothing has been persisted yet.
	pub autostart: bool,
}

impl ChildSpec {
	pub fn new(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			binary: binary.into(),
			interpreter: None,
			args: Vec::new(),
			env: HashMap::new(),
			autostart: false,
		}
	}

	pub fn with_autostart(mut self, autostart: bool) -> Self {
		self.autostart = autostart;
		self
	}

	pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
		self.interpreter = Some(interpreter.into());
		self
	}

	/// The interpreter to launch `binary` with, if it needs one.
	pub fn launcher(&self) -> Option<&str> {
		if let Some(interpreter) = self.interpreter.as_deref() {
			return Some(interpreter);
		}
		match self.binary.extension().and_then(|e| e.to_str()) {
			Some("py") => Some("python"),
			_ => None,
		}
	}
}

/// What the supervisor intends for a child, independent of what the OS reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
	Stopped = 1,
	Running = 2,
}

impl DesiredState {
	pub fn as_value(self) -> u8 {
		self as u8
	}

	pub fn from_value(value: u8) -> Option<Self> {
		match value {
			1 => Some(DesiredState::Stopped),
			2 => Some(DesiredState::Running),
			_ => None,
		}
	}
}

impl fmt::Display for DesiredState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_value())
	}
}

impl FromStr for DesiredState {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let value: u8 = s.trim().parse().map_err(|_| format!("invalid state: {}", s))?;
		DesiredState::from_value(value).ok_or_else(|| format!("unknown state value: {}", value))
	}
}

/// OS-observed liveness of a child. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualState {
	Stopped,
	Running,
}

/// Per-child files and timings, already resolved to absolute paths.
#[derive(Debug, Clone)]
pub struct GuardConfig {
	pub state_file: PathBuf,
	pub error_message_file: PathBuf,
	/// Where the child's stderr is captured. `None` keeps it on a pipe.
	pub stderr_file: Option<PathBuf>,
	pub check_interval: Duration,
	pub max_stop_timeout: Duration,
}

impl GuardConfig {
	/// Defaults for a child whose files live under `dir`.
	pub fn in_dir(dir: &Path, name: &str) -> Self {
		Self {
			state_file: dir.join(format!("state.{}", name)),
			error_message_file: dir.join(format!("error_file.{}", name)),
			stderr_file: Some(dir.join(format!("stderr_file.{}", name))),
			check_interval: Duration::from_secs(1),
			max_stop_timeout: Duration::from_secs(10),
		}
	}
}

/// How [`crate::ProcessGuard::stop_for_shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
	NotRunning,
	Exited,
	ForceKilled,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
	Idle,
	Started,
	StartFailed,
	Stopped,
}

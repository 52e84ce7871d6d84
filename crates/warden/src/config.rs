use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_daemon::paths::resolve;
use warden_daemon::DaemonPaths;
use warden_guard::{ChildSpec, GuardConfig};

pub const CONFIG_ENV: &str = "WARDEN_CONFIG";
const CONFIG_NAMES: [&str; 2] = ["warden.toml", "wd.cfg"];

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
	#[serde(default)]
	pub watchdog: WatchdogSection,
	#[serde(default)]
	pub subprocess: SubprocessSection,
	#[serde(default)]
	pub pg: PgSection,
	#[serde(default)]
	pub subprocesses: Vec<ChildEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
	#[serde(default = "default_pidfile")]
	pub pidfile: String,
	#[serde(default = "default_logfile")]
	pub logfile: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for WatchdogSection {
	fn default() -> Self {
		Self {
			pidfile: default_pidfile(),
			logfile: default_logfile(),
			log_level: default_log_level(),
		}
	}
}

fn default_pidfile() -> String {
	"pid".into()
}
fn default_logfile() -> String {
	"watchdog.log".into()
}
fn default_log_level() -> String {
	"info".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubprocessSection {
	#[serde(default = "default_statefile")]
	pub statefile: String,
	#[serde(default = "default_exit_error_message_file")]
	pub exit_error_message_file: String,
	#[serde(default = "default_max_stop_timeout")]
	pub max_stop_timeout: f64,
	#[serde(default = "default_stderr_file")]
	pub stderr_file: String,
}

impl Default for SubprocessSection {
	fn default() -> Self {
		Self {
			statefile: default_statefile(),
			exit_error_message_file: default_exit_error_message_file(),
			max_stop_timeout: default_max_stop_timeout(),
			stderr_file: default_stderr_file(),
		}
	}
}

fn default_statefile() -> String {
	"state".into()
}
fn default_exit_error_message_file() -> String {
	"error_file".into()
}
fn default_max_stop_timeout() -> f64 {
	10.0
}
fn default_stderr_file() -> String {
	"stderr_file".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PgSection {
	#[serde(default = "default_check_interval")]
	pub check_interval_sec: f64,
}

impl Default for PgSection {
	fn default() -> Self {
		Self {
			check_interval_sec: default_check_interval(),
		}
	}
}

fn default_check_interval() -> f64 {
	1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildEntry {
	pub name: String,
	pub binary: String,
	pub interpreter: Option<String>,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub env: HashMap<String, String>,
	#[serde(default = "default_true")]
	pub autostart: bool,
}

fn default_true() -> bool {
	true
}

/// Errors loading the configuration. All of them are fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
	Read { path: PathBuf, source: std::io::Error },
	Parse { path: PathBuf, message: String },
	Invalid(String),
}

impl std::fmt::Display for ConfigError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ConfigError::Read { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
			ConfigError::Parse { path, message } => write!(f, "invalid config {}: {}", path.display(), message),
			ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
		}
	}
}

impl std::error::Error for ConfigError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ConfigError::Read { source, .. } => Some(source),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Toml,
	Json,
}

impl Format {
	/// `.toml` files are TOML; anything else (`wd.cfg`, `.json`) is JSON.
	pub fn of(path: &Path) -> Self {
		match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => Format::Toml,
			_ => Format::Json,
		}
	}
}

/// Resolved configuration: every path absolute, every default applied.
#[derive(Debug, Clone)]
pub struct Config {
	/// Directory relative paths are resolved against.
	pub root: PathBuf,
	pub pid_file: PathBuf,
	pub log_file: PathBuf,
	pub log_level: tracing::Level,
	pub state_file: PathBuf,
	pub error_message_file: PathBuf,
	pub stderr_file: PathBuf,
	pub check_interval: Duration,
	pub max_stop_timeout: Duration,
	pub children: Vec<ChildSpec>,
}

impl Config {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let read_err = |source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		};
		let path = path.canonicalize().map_err(read_err)?;
		let text = std::fs::read_to_string(&path).map_err(read_err)?;
		let root = path.parent().unwrap_or(Path::new("/")).to_path_buf();
		let file = parse(&text, Format::of(&path)).map_err(|message| ConfigError::Parse {
			path: path.clone(),
			message,
		})?;
		Config::resolve(file, &root)
	}

	/// Apply defaults and resolve paths against `root`.
	pub fn resolve(file: ConfigFile, root: &Path) -> Result<Self, ConfigError> {
		let watchdog = &file.watchdog;
		let subprocess = &file.subprocess;

		let log_level = or_default(&watchdog.log_level, default_log_level)
			.parse::<tracing::Level>()
			.map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", watchdog.log_level)))?;

		let error_message_file = resolve(
			root,
			&or_default(&subprocess.exit_error_message_file, default_exit_error_message_file),
		);
		// stderr is captured next to the error message file.
		let stderr_dir = error_message_file.parent().unwrap_or(root).to_path_buf();
		let stderr_file = resolve(&stderr_dir, &or_default(&subprocess.stderr_file, default_stderr_file));

		let check_interval = seconds_or_default(file.pg.check_interval_sec, default_check_interval);
		let max_stop_timeout = seconds_or_default(subprocess.max_stop_timeout, default_max_stop_timeout);

		let children = children(&file.subprocesses, root)?;

		Ok(Self {
			root: root.to_path_buf(),
			pid_file: resolve(root, &or_default(&watchdog.pidfile, default_pidfile)),
			log_file: resolve(root, &or_default(&watchdog.logfile, default_logfile)),
			log_level,
			state_file: resolve(root, &or_default(&subprocess.statefile, default_statefile)),
			error_message_file,
			stderr_file,
			check_interval,
			max_stop_timeout,
			children,
		})
	}

	pub fn daemon_paths(&self) -> DaemonPaths {
		DaemonPaths::new(&self.pid_file, &self.log_file)
	}

	/// Files and timings for one child. Per-child files carry a `.<name>` suffix.
	pub fn guard_config(&self, name: &str) -> GuardConfig {
		GuardConfig {
			state_file: per_child(&self.state_file, name),
			error_message_file: per_child(&self.error_message_file, name),
			stderr_file: Some(per_child(&self.stderr_file, name)),
			check_interval: self.check_interval,
			max_stop_timeout: self.max_stop_timeout,
		}
	}
}

/// Where to look for the configuration: `explicit`, then `$WARDEN_CONFIG`,
/// then `warden.toml` or `wd.cfg` next to the executable.
pub fn locate(explicit: Option<&Path>) -> PathBuf {
	if let Some(path) = explicit {
		return path.to_path_buf();
	}
	if let Ok(path) = std::env::var(CONFIG_ENV) {
		if !path.is_empty() {
			return PathBuf::from(path);
		}
	}

	let exe_dir = std::env::current_exe()
		.ok()
		.and_then(|exe| exe.parent().map(Path::to_path_buf))
		.unwrap_or_else(|| PathBuf::from("."));
	CONFIG_NAMES
		.iter()
		.map(|name| exe_dir.join(name))
		.find(|path| path.exists())
		.unwrap_or_else(|| exe_dir.join(CONFIG_NAMES[0]))
}

pub fn parse(text: &str, format: Format) -> Result<ConfigFile, String> {
	match format {
		Format::Toml => toml::from_str(text).map_err(|e| e.to_string()),
		Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
	}
}

fn children(entries: &[ChildEntry], root: &Path) -> Result<Vec<ChildSpec>, ConfigError> {
	if entries.is_empty() {
		return Err(ConfigError::Invalid("no subprocesses configured".into()));
	}

	let mut seen = HashSet::new();
	let mut specs = Vec::with_capacity(entries.len());
	for entry in entries {
		let name = entry.name.trim();
		if name.is_empty() || name.contains('/') {
			return Err(ConfigError::Invalid(format!("invalid subprocess name '{}'", entry.name)));
		}
		if !seen.insert(name.to_string()) {
			return Err(ConfigError::Invalid(format!("duplicate subprocess name '{}'", name)));
		}
		if entry.binary.trim().is_empty() {
			return Err(ConfigError::Invalid(format!("subprocess '{}' has no binary", name)));
		}

		let mut spec = ChildSpec::new(name, resolve(root, entry.binary.trim())).with_autostart(entry.autostart);
		if let Some(interpreter) = entry.interpreter.as_deref().filter(|i| !i.is_empty()) {
			spec = spec.with_interpreter(interpreter);
		}
		spec.args = entry.args.clone();
		spec.env = entry.env.clone();
		specs.push(spec);
	}
	Ok(specs)
}

// Empty values count as unset.
fn or_default(value: &str, default: fn() -> String) -> String {
	if value.trim().is_empty() {
		default()
	} else {
		value.to_string()
	}
}

// Zero, negative and non-finite values count as unset.
fn seconds_or_default(value: f64, default: fn() -> f64) -> Duration {
	if value.is_finite() && value > 0.0 {
		Duration::from_secs_f64(value)
	} else {
		Duration::from_secs_f64(default())
	}
}

fn per_child(path: &Path, name: &str) -> PathBuf {
	let mut file_name = path.file_name().unwrap_or_default().to_os_string();
	file_name.push(".");
	file_name.push(name);
	path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
	use super::*;

	const TOML: &str = r#"
[watchdog]
pidfile = "/var/run/warden.pid"

[subprocess]
max_stop_timeout = 3

[pg]
check_interval_sec = 2

[[subprocesses]]
name = "worker"
binary = "bin/worker"

[[subprocesses]]
name = "reporter"
binary = "/usr/local/bin/reporter.py"
args = ["--verbose"]
autostart = false
"#;

	#[test]
	fn toml_config_resolves() {
		let file = parse(TOML, Format::Toml).unwrap();
		let config = Config::resolve(file, Path::new("/opt/wd")).unwrap();

		assert_eq!(config.pid_file, PathBuf::from("/var/run/warden.pid"));
		assert_eq!(config.log_file, PathBuf::from("/opt/wd/watchdog.log"));
		assert_eq!(config.state_file, PathBuf::from("/opt/wd/state"));
		assert_eq!(config.error_message_file, PathBuf::from("/opt/wd/error_file"));
		assert_eq!(config.stderr_file, PathBuf::from("/opt/wd/stderr_file"));
		assert_eq!(config.check_interval, Duration::from_secs(2));
		assert_eq!(config.max_stop_timeout, Duration::from_secs(3));
		assert_eq!(config.log_level, tracing::Level::INFO);

		assert_eq!(config.children.len(), 2);
		assert_eq!(config.children[0].name, "worker");
		assert_eq!(config.children[0].binary, PathBuf::from("/opt/wd/bin/worker"));
		assert!(config.children[0].autostart);
		assert_eq!(config.children[1].launcher(), Some("python"));
		assert_eq!(config.children[1].args, vec!["--verbose".to_string()]);
		assert!(!config.children[1].autostart);
	}

	#[test]
	fn json_config_uses_defaults() {
		let json = r#"{"subprocesses": [{"name": "worker", "binary": "worker"}]}"#;
		let file = parse(json, Format::Json).unwrap();
		let config = Config::resolve(file, Path::new("/opt/wd")).unwrap();

		assert_eq!(config.pid_file, PathBuf::from("/opt/wd/pid"));
		assert_eq!(config.check_interval, Duration::from_secs(1));
		assert_eq!(config.max_stop_timeout, Duration::from_secs(10));
	}

	#[test]
	fn zero_and_empty_values_fall_back_to_defaults() {
		let json = r#"{
			"watchdog": {"pidfile": ""},
			"subprocess": {"max_stop_timeout": 0},
			"pg": {"check_interval_sec": 0},
			"subprocesses": [{"name": "worker", "binary": "worker"}]
		}"#;
		let config = Config::resolve(parse(json, Format::Json).unwrap(), Path::new("/opt/wd")).unwrap();
		assert_eq!(config.pid_file, PathBuf::from("/opt/wd/pid"));
		assert_eq!(config.check_interval, Duration::from_secs(1));
		assert_eq!(config.max_stop_timeout, Duration::from_secs(10));
	}

	#[test]
	fn fractional_and_negative_intervals() {
		let json = r#"{
			"subprocess": {"max_stop_timeout": -3},
			"pg": {"check_interval_sec": 0.5},
			"subprocesses": [{"name": "worker", "binary": "worker"}]
		}"#;
		let config = Config::resolve(parse(json, Format::Json).unwrap(), Path::new("/opt/wd")).unwrap();
		assert_eq!(config.check_interval, Duration::from_millis(500));
		assert_eq!(config.max_stop_timeout, Duration::from_secs(10));

		let toml = "[subprocess]\nmax_stop_timeout = 2.5\n\n[[subprocesses]]\nname = \"w\"\nbinary = \"w\"\n";
		let config = Config::resolve(parse(toml, Format::Toml).unwrap(), Path::new("/opt/wd")).unwrap();
		assert_eq!(config.max_stop_timeout, Duration::from_millis(2500));
	}

	#[test]
	fn stderr_file_follows_error_file_directory() {
		let json = r#"{
			"subprocess": {"exit_error_message_file": "/var/log/wd/errors"},
			"subprocesses": [{"name": "worker", "binary": "worker"}]
		}"#;
		let config = Config::resolve(parse(json, Format::Json).unwrap(), Path::new("/opt/wd")).unwrap();
		assert_eq!(config.stderr_file, PathBuf::from("/var/log/wd/stderr_file"));
	}

	#[test]
	fn guard_config_is_per_child() {
		let file = parse(TOML, Format::Toml).unwrap();
		let config = Config::resolve(file, Path::new("/opt/wd")).unwrap();
		let guard = config.guard_config("worker");

		assert_eq!(guard.state_file, PathBuf::from("/opt/wd/state.worker"));
		assert_eq!(guard.error_message_file, PathBuf::from("/opt/wd/error_file.worker"));
		assert_eq!(guard.stderr_file, Some(PathBuf::from("/opt/wd/stderr_file.worker")));
		assert_eq!(guard.check_interval, Duration::from_secs(2));
	}

	#[test]
	fn malformed_json_is_rejected() {
		assert!(parse("{not json", Format::Json).is_err());
	}

	#[test]
	fn missing_binary_field_is_rejected() {
		assert!(parse(r#"{"subprocesses": [{"name": "worker"}]}"#, Format::Json).is_err());
	}

	#[test]
	fn no_children_is_invalid() {
		let result = Config::resolve(ConfigFile::default(), Path::new("/opt/wd"));
		assert!(matches!(result, Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn duplicate_names_are_invalid() {
		let json = r#"{"subprocesses": [
			{"name": "worker", "binary": "a"},
			{"name": "worker", "binary": "b"}
		]}"#;
		let result = Config::resolve(parse(json, Format::Json).unwrap(), Path::new("/opt/wd"));
		assert!(matches!(result, Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn unknown_log_level_is_invalid() {
		let json = r#"{"watchdog": {"log_level": "loud"}, "subprocesses": [{"name": "w", "binary": "w"}]}"#;
		let result = Config::resolve(parse(json, Format::Json).unwrap(), Path::new("/opt/wd"));
		assert!(matches!(result, Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn format_by_extension() {
		assert_eq!(Format::of(Path::new("/opt/wd/warden.toml")), Format::Toml);
		assert_eq!(Format::of(Path::new("/opt/wd/wd.cfg")), Format::Json);
		assert_eq!(Format::of(Path::new("/opt/wd/wd.json")), Format::Json);
	}

	#[test]
	fn locate_prefers_explicit_path() {
		assert_eq!(locate(Some(Path::new("/etc/warden.toml"))), PathBuf::from("/etc/warden.toml"));
	}
}

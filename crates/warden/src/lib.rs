//! The `warden` watchdog: configuration, command line, and the controller
//! that runs one guard per configured child.

pub mod cli;
pub mod config;
pub mod controller;

pub use config::{Config, ConfigError};
pub use controller::Controller;

/// Install the global subscriber. The detached daemon writes plain text to
/// its log file, so colour is only used in the foreground.
pub fn init_tracing(level: tracing::Level, ansi: bool) {
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_ansi(ansi)
		.with_target(false)
		.init();
}

//! # warden-daemon
//!
//! Daemon lifecycle for the warden supervisor: detach from the invoking
//! terminal, enforce a single instance through a PID file, and wait for a
//! termination signal.

pub mod paths;
pub mod pidfile;
pub mod identity;
pub mod signals;
pub mod daemon;

pub use paths::DaemonPaths;
pub use pidfile::{read_pid, PidFile};
pub use identity::ProcessIdentity;
pub use signals::ShutdownSignals;
pub use daemon::{Daemon, DaemonError, Detached, StopOutcome};

//! # warden-guard
//!
//! Keeps child programs in their desired state.
//!
//! A [`ProcessGuard`] owns one child: its persisted desired state, the OS
//! process while it runs, and the diagnostics left behind when it dies. The
//! [`watch`] loop reconciles the two on a fixed interval.
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use warden_guard::{ChildSpec, GuardConfig, ProcessGuard, spawn_watch};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let spec = ChildSpec::new("worker", "/opt/wd/worker");
//! let guard = Arc::new(ProcessGuard::new(spec, GuardConfig::in_dir("/opt/wd".as_ref(), "worker")));
//! let running = Arc::new(AtomicBool::new(true));
//!
//! guard.start().await;
//! let handle = spawn_watch(Arc::clone(&guard), Arc::clone(&running));
//! # drop(handle);
//! # }
//! ```

pub mod types;
pub mod store;
pub mod failure;
pub mod guard;
pub mod watch;

pub use types::*;
pub use failure::{describe_failure, ExitKind};
pub use guard::{ChildRuntime, ProcessGuard, RunningChild};
pub use watch::{spawn_watch, watch};

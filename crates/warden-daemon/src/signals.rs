//! Termination signal handling for the daemon's main wait.
//!
//! Handlers are tokio's signal driver: the OS-level handler only records
//! receipt, and the [`ShutdownSignals::wait`] future observes it. Once a
//! signal kind is registered its default disposition never comes back, so a
//! repeated SIGTERM during shutdown cannot kill the daemon halfway through.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

pub struct ShutdownSignals {
	interrupt: Signal,
	terminate: Signal,
	hangup: Signal,
}

impl ShutdownSignals {
	/// Register SIGINT, SIGTERM and SIGHUP. Must run inside a tokio runtime.
	pub fn install() -> io::Result<Self> {
		Ok(Self {
			interrupt: signal(SignalKind::interrupt())?,
			terminate: signal(SignalKind::terminate())?,
			hangup: signal(SignalKind::hangup())?,
		})
	}

	/// Block until SIGINT or SIGTERM arrives. SIGHUP is ignored.
	/// Returns the name of the signal that ended the wait.
	pub async fn wait(&mut self) -> &'static str {
		loop {
			tokio::select! {
				_ = self.interrupt.recv() => return "SIGINT",
				_ = self.terminate.recv() => return "SIGTERM",
				_ = self.hangup.recv() => {
					tracing::debug!("SIGHUP ignored");
				}
			}
		}
	}
}

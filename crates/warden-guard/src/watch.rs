use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::guard::ProcessGuard;
use crate::types::Tick;

/// Spawn the supervision loop for `guard` on the current runtime.
pub fn spawn_watch(guard: Arc<ProcessGuard>, running: Arc<AtomicBool>) -> JoinHandle<()> {
	tokio::spawn(watch(guard, running))
}

/// Reconcile desired against actual state every check interval until
/// `running` is cleared. A failed start is simply retried on the next tick.
pub async fn watch(guard: Arc<ProcessGuard>, running: Arc<AtomicBool>) {
	let interval = guard.check_interval();
	tracing::debug!("{}: watching every {:?}", guard.name(), interval);

	while running.load(Ordering::SeqCst) {
		match guard.reconcile(&running).await {
			Tick::Idle => {}
			tick => tracing::debug!("{}: {:?}", guard.name(), tick),
		}
		tokio::time::sleep(interval).await;
	}

	tracing::debug!("{}: watch loop exited", guard.name());
}

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use warden_daemon::ShutdownSignals;
use warden_guard::{spawn_watch, ProcessGuard, ShutdownOutcome};

use crate::config::Config;

/// Runs one guard per configured child until told to shut down.
pub struct Controller {
	guards: Vec<Arc<ProcessGuard>>,
	running: Arc<AtomicBool>,
}

impl Controller {
	pub fn new(config: &Config) -> Self {
		let guards = config
			.children
			.iter()
			.map(|spec| Arc::new(ProcessGuard::new(spec.clone(), config.guard_config(&spec.name))))
			.collect();
		Self {
			guards,
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn guards(&self) -> &[Arc<ProcessGuard>] {
		&self.guards
	}

	pub fn running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Supervise until SIGINT or SIGTERM. Handlers are in place before any
	/// child is launched.
	pub async fn run(&self) -> io::Result<Vec<(String, ShutdownOutcome)>> {
		let mut signals = ShutdownSignals::install()?;
		let outcomes = self
			.run_until(async move {
				let name = signals.wait().await;
				tracing::info!("Received {}, shutting down", name);
			})
			.await;
		Ok(outcomes)
	}

	/// Supervise until `shutdown` completes, then stop every child in
	/// configuration order.
	pub async fn run_until<F>(&self, shutdown: F) -> Vec<(String, ShutdownOutcome)>
	where
		F: Future<Output = ()>,
	{
		self.running.store(true, Ordering::SeqCst);
		tracing::info!("Watchdog started, supervising {} subprocess(es)", self.guards.len());

		let handles: Vec<_> = self
			.guards
			.iter()
			.map(|guard| spawn_watch(Arc::clone(guard), Arc::clone(&self.running)))
			.collect();

		shutdown.await;
		self.running.store(false, Ordering::SeqCst);

		let mut outcomes = Vec::with_capacity(self.guards.len());
		for guard in &self.guards {
			let outcome = guard.stop_for_shutdown().await;
			tracing::info!("{}: {:?}", guard.name(), outcome);
			outcomes.push((guard.name().to_string(), outcome));
		}

		for handle in handles {
			if let Err(e) = handle.await {
				tracing::warn!("watch task ended abnormally: {}", e);
			}
		}

		tracing::info!("Watchdog stopped");
		outcomes
	}
}

//! Background timers driving the two processors.

use crate::orchestration::maturity::MaturityProcessor;
use crate::orchestration::refresh::PartialProfitRefresher;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Set by the first successful `Scheduler::start` in this process.
static STARTED: AtomicBool = AtomicBool::new(false);

pub struct Scheduler {
    maturity: MaturityProcessor,
    refresher: PartialProfitRefresher,
    maturity_every: Duration,
    refresh_every: Duration,
    handles: OnceLock<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        maturity: MaturityProcessor,
        refresher: PartialProfitRefresher,
        maturity_every: Duration,
        refresh_every: Duration,
    ) -> Self {
        Self {
            maturity,
            refresher,
            maturity_every,
            refresh_every,
            handles: OnceLock::new(),
        }
    }

    /// Spawn both timers. Only the first call in the process has any effect,
    /// whichever instance it is made on; returns whether this call started
    /// them. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if STARTED.swap(true, Ordering::AcqRel) {
            warn!("Scheduler already started in this process, ignoring start");
            return false;
        }

        let maturity = self.maturity.clone();
        let sweep = spawn_periodic("maturity_sweep", self.maturity_every, move || {
            let maturity = maturity.clone();
            async move {
                if let Err(e) = maturity.run_maturity_sweep().await {
                    error!(error = %e, "Maturity sweep failed");
                }
            }
        });

        let refresher = self.refresher.clone();
        let refresh = spawn_periodic("profit_refresh", self.refresh_every, move || {
            let refresher = refresher.clone();
            async move {
                if let Err(e) = refresher.run_partial_profit_refresh().await {
                    error!(error = %e, "Partial profit refresh failed");
                }
            }
        });

        if self.handles.set(vec![sweep, refresh]).is_err() {
            return false;
        }
        info!(
            maturity_every_secs = self.maturity_every.as_secs(),
            refresh_every_secs = self.refresh_every.as_secs(),
            "Scheduler started"
        );
        true
    }

    pub fn is_running(&self) -> bool {
        self.handles
            .get()
            .map(|handles| handles.iter().any(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Stop future ticks. Runs already in flight are left to finish.
    pub fn shutdown(&self) {
        if let Some(handles) = self.handles.get() {
            for handle in handles {
                handle.abort();
            }
            info!("Scheduler stopped");
        }
    }
}

/// Clears the in-flight flag when a run ends, including by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run `job` every `every`, starting one period from now.
///
/// Each run gets its own task so a hung run never stalls the timer; a tick
/// that fires while the previous run is still going is skipped.
pub(crate) fn spawn_periodic<F, Fut>(name: &'static str, every: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let in_flight = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if in_flight.swap(true, Ordering::AcqRel) {
                debug!(job = name, "Previous run still in flight, skipping tick");
                continue;
            }
            let guard = InFlight(Arc::clone(&in_flight));
            let run = job();
            tokio::spawn(async move {
                let _guard = guard;
                run.await;
            });
        }
    })
}

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::projection_worker::WorkerHandle;

/// Periodic auto-block sweep over tentative invoices past their DP grace window.
///
/// Turns the lazy "check on read" transition into one that happens without
/// client traffic.
#[derive(Debug, Clone)]
pub struct BlockSweeper {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for BlockSweeper {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Handle for the running sweeper (shutdown + trigger hook).
#[derive(Debug)]
pub struct BlockSweeperHandle {
    worker: WorkerHandle,
    trigger: mpsc::SyncSender<()>,
}

impl BlockSweeperHandle {
    /// Request an immediate sweep. Triggers are coalesced.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}

impl BlockSweeper {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Spawn the sweeper thread.
    ///
    /// `sweep` returns how many invoices it blocked. Failures are logged and
    /// retried with bounded exponential backoff; they never stop the loop.
    /// `runtime` is entered on the sweeper thread so Postgres-backed stores
    /// can reach the async pool.
    pub fn spawn<F, E>(
        &self,
        name: &'static str,
        runtime: Option<tokio::runtime::Handle>,
        mut sweep: F,
    ) -> std::io::Result<BlockSweeperHandle>
    where
        F: FnMut() -> Result<usize, E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);
        let cfg = self.clone();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = runtime.as_ref().map(|h| h.enter());
            sweeper_loop(name, cfg, shutdown_rx, trigger_rx, &mut sweep);
        })?;

        Ok(BlockSweeperHandle {
            worker: WorkerHandle::new(shutdown_tx, join),
            trigger: trigger_tx,
        })
    }
}

fn sweeper_loop<F, E>(
    name: &'static str,
    cfg: BlockSweeper,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    sweep: &mut F,
) where
    F: FnMut() -> Result<usize, E>,
    E: core::fmt::Display,
{
    info!(worker = name, interval_secs = cfg.interval.as_secs(), "block sweeper started");

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true; // sweep once on startup
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;
        match sweep() {
            Ok(0) => {
                failures = 0;
                debug!(worker = name, "block sweep found nothing due");
            }
            Ok(blocked) => {
                failures = 0;
                info!(worker = name, blocked, "block sweep blocked overdue invoices");
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let backoff = Duration::from_millis(250)
                    .saturating_mul(2u32.saturating_pow(failures.min(8)))
                    .min(cfg.max_backoff);
                warn!(worker = name, error = %err, failures, backoff_ms = backoff.as_millis() as u64, "block sweep failed");
                backoff_until = Some(Instant::now() + backoff);
                pending = true;
            }
        }
    }

    info!(worker = name, "block sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sweeps_on_start_and_on_trigger() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let sweeper = BlockSweeper::with_interval(Duration::from_secs(3600));
        let handle = sweeper
            .spawn("test-sweeper", None, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<usize, String>(0)
            })
            .unwrap();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.trigger();
        thread::sleep(Duration::from_millis(400));
        handle.shutdown();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_retried() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let sweeper = BlockSweeper::with_interval(Duration::from_secs(3600));
        let handle = sweeper
            .spawn("test-sweeper-retry", None, move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("store unavailable".to_string())
                } else {
                    Ok(1)
                }
            })
            .unwrap();

        thread::sleep(Duration::from_millis(1000));
        handle.shutdown();

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}

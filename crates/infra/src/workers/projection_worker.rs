use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use umrahops_events::{EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>, join: thread::JoinHandle<()>) -> Self {
        Self {
            shutdown,
            join: Some(join),
        }
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic projection worker loop.
///
/// - Subscribes to an event bus (before the thread starts, so no early
///   message is missed)
/// - Applies an idempotent handler for each message
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes events from the bus subscription.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe).
    pub fn spawn<M, B, H, E>(name: &'static str, bus: &B, mut handler: H) -> std::io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &mut handler))?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn worker_loop<M, H, E>(name: &'static str, sub: Subscription<M>, shutdown_rx: mpsc::Receiver<()>, handler: &mut H)
where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use umrahops_events::InMemoryEventBus;

    #[test]
    fn handles_messages_until_shutdown() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = ProjectionWorker::spawn("test-worker", &bus, move |n: u32| {
            sink.lock().unwrap().push(n);
            Ok::<(), ()>(())
        })
        .unwrap();

        bus.publish(1).unwrap();
        bus.publish(2).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}

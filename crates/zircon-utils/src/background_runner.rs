use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns background tokio tasks with graceful shutdown support.
///
/// Used for the periodic maintenance loops (prepared-write expiry, lease
/// renewal) that services run alongside their request handling.
pub struct BackgroundRunner {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundRunner {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn spawn<F, Fut>(&mut self, f: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(f(rx)));
    }

    /// Run `f` every `interval` until shutdown.
    pub fn spawn_periodic<F, Fut>(&mut self, interval: std::time::Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => { f().await; }
                    _ = rx.changed() => { break; }
                }
            }
        }));
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for BackgroundRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let mut runner = BackgroundRunner::new();
        let done = Arc::new(AtomicUsize::new(0));

        let done2 = Arc::clone(&done);
        runner.spawn(move |mut rx| async move {
            let _ = rx.changed().await;
            done2.fetch_add(1, Ordering::SeqCst);
        });

        runner.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_periodic_ticks() {
        let mut runner = BackgroundRunner::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticks2 = Arc::clone(&ticks);
        runner.spawn_periodic(Duration::from_millis(5), move || {
            let ticks3 = Arc::clone(&ticks2);
            async move {
                ticks3.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        runner.shutdown().await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}

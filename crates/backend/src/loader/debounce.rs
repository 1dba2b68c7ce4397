use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::batch::BatchSummary;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::DataError;

type WriteResult = Result<BatchSummary, DataError>;

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
    tx: watch::Sender<Option<WriteResult>>,
}

/// Coalesces rapid save requests for the same logical operation.
///
/// Each submission schedules the operation to run after the debounce window.
/// A newer submission for the same key cancels the scheduled one and takes
/// over its result channel, so every superseded caller resolves with the
/// winning request's result.
pub struct Debouncer {
    window: Duration,
    pending: Arc<Mutex<HashMap<String, PendingWrite>>>,
    generations: AtomicU64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, op: F) -> WriteResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WriteResult> + Send + 'static,
    {
        let mut rx = {
            let mut pending = self.pending.lock().unwrap();
            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;

            // Supersede: cancel the scheduled run, keep its result channel
            // so earlier callers resolve with this (winning) request.
            let tx = if let Some(previous) = pending.remove(key) {
                previous.handle.abort();
                previous.tx
            } else {
                let (tx, _) = watch::channel(None);
                tx
            };
            let rx = tx.subscribe();

            let handle = tokio::spawn({
                let key = key.to_string();
                let window = self.window;
                let map = Arc::clone(&self.pending);
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(window).await;
                    let result = op().await;
                    // Only the still-current generation may publish; a
                    // superseded run that somehow got here stays silent.
                    let winner = {
                        let mut pending = map.lock().unwrap();
                        match pending.get(&key) {
                            Some(p) if p.generation == generation => {
                                pending.remove(&key);
                                true
                            }
                            _ => false,
                        }
                    };
                    if winner {
                        let _ = tx.send(Some(result));
                    }
                }
            });

            pending.insert(
                key.to_string(),
                PendingWrite {
                    generation,
                    handle,
                    tx,
                },
            );
            rx
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(DataError::Store(Arc::new(anyhow::anyhow!(
                    "debounced write was dropped before completing"
                ))));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn summary_of(total: usize) -> BatchSummary {
        BatchSummary {
            total,
            inserted: total,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_request_in_window_executes() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(400)));
        let executions = Arc::new(AtomicUsize::new(0));

        let first = {
            let d = debouncer.clone();
            let counter = executions.clone();
            tokio::spawn(async move {
                d.run("save_sales", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(summary_of(1))
                })
                .await
            })
        };
        // Let the first submission register before superseding it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let d = debouncer.clone();
            let counter = executions.clone();
            tokio::spawn(async move {
                d.run("save_sales", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(summary_of(2))
                })
                .await
            })
        };

        let first_result = first.await.unwrap().unwrap();
        let second_result = second.await.unwrap().unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 1, "only the winner runs");
        // Superseded callers resolve with the winning request's result.
        assert_eq!(first_result.total, 2);
        assert_eq!(second_result.total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_outside_window_run_separately() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));
        let executions = Arc::new(AtomicUsize::new(0));

        for total in [1usize, 2] {
            let counter = executions.clone();
            let result = debouncer
                .run("save_sales", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(summary_of(total))
                })
                .await
                .unwrap();
            assert_eq!(result.total, total);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_coalesce() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));
        let executions = Arc::new(AtomicUsize::new(0));

        let sales = {
            let d = debouncer.clone();
            let counter = executions.clone();
            tokio::spawn(async move {
                d.run("save_sales", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(summary_of(1))
                })
                .await
            })
        };
        let sku = {
            let d = debouncer.clone();
            let counter = executions.clone();
            tokio::spawn(async move {
                d.run("save_sku", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(summary_of(9))
                })
                .await
            })
        };

        assert_eq!(sales.await.unwrap().unwrap().total, 1);
        assert_eq!(sku.await.unwrap().unwrap().total, 9);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_fan_out_to_all_coalesced_callers() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));

        let first = {
            let d = debouncer.clone();
            tokio::spawn(async move {
                d.run("save_sales", || async {
                    Ok(summary_of(1))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let d = debouncer.clone();
            tokio::spawn(async move {
                d.run("save_sales", || async {
                    Err(DataError::PermissionDenied("write blocked".to_string()))
                })
                .await
            })
        };

        assert!(matches!(
            first.await.unwrap(),
            Err(DataError::PermissionDenied(_))
        ));
        assert!(matches!(
            second.await.unwrap(),
            Err(DataError::PermissionDenied(_))
        ));
    }
}

//! Collapse concurrent identical work into one execution.
//!
//! When several callers miss the cache for the same key at once, only the
//! first runs the upstream fetch. The others wait for its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// In-flight map keyed by string.
#[derive(Debug)]
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a run for the same key is already in
    /// progress, in which case wait for and return that run's result.
    ///
    /// If the leading caller is cancelled, a waiting caller takes over.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                map.entry(key.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let value = cell.get_or_init(work).await.clone();

        // The next miss after completion starts a fresh run.
        let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if map.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            map.remove(key);
        }
        value
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("weather:1:2", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        7
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flight = SingleFlight::<usize>::new();
        let calls = AtomicUsize::new(0);

        for expected in 1..=3 {
            let value = flight
                .run("k", || async { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(value, expected);
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let flight = SingleFlight::<&'static str>::new();
        let a = flight.run("a", || async { "a" }).await;
        let b = flight.run("b", || async { "b" }).await;
        assert_eq!((a, b), ("a", "b"));
    }
}

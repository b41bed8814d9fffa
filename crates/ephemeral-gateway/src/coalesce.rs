//! Keyed call coalescing
//!
//! Concurrent calls with the same key share one in-flight computation. The
//! computation runs on its own task, so it always completes and clears its key
//! even if every waiter gave up; the next call after that starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::trace;

use crate::error::{GatewayError, Result};

type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;
type Flights<K, V> = Arc<Mutex<HashMap<K, Flight<V>>>>;

pub(crate) struct Coalescer<K, V> {
    flights: Flights<K, V>,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(flights: &Flights<K, V>) -> MutexGuard<'_, HashMap<K, Flight<V>>> {
        flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `work` for `key`, or join the computation already running for it.
    ///
    /// `work` is only invoked when no flight exists for `key`.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let flight = {
            let mut flights = Self::lock(&self.flights);
            match flights.get(&key) {
                Some(existing) => {
                    trace!(?key, "Joining in-flight call");
                    existing.clone()
                }
                None => {
                    let registry = Arc::clone(&self.flights);
                    let done_key = key.clone();
                    let fut = work();
                    // The removal below has to take the lock we hold, so it
                    // can't run before the insert.
                    let task = tokio::spawn(async move {
                        let result = fut.await;
                        Self::lock(&registry).remove(&done_key);
                        result
                    });
                    let flight = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(GatewayError::Internal(format!("in-flight call failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();
                    trace!(?key, "Starting call");
                    flights.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        Self::lock(&self.flights).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_computation() {
        let coalescer: Arc<Coalescer<u64, u64>> = Arc::new(Coalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let futs = (0..20).map(|_| {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            async move {
                coalescer
                    .run(1, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }
        });
        let results = futures::future::join_all(futs).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let coalescer: Coalescer<u64, u64> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let calls = Arc::clone(&calls);
            coalescer.run(1, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
        };
        let b = {
            let calls = Arc::clone(&calls);
            coalescer.run(2, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
        };
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_cleared_after_completion() {
        let coalescer: Coalescer<u64, u64> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let calls = Arc::clone(&calls);
            let value = coalescer
                .run(1, move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as u64 + 1) })
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let coalescer: Arc<Coalescer<u64, u64>> = Arc::new(Coalescer::new());
        let futs = (0..3).map(|_| {
            let coalescer = Arc::clone(&coalescer);
            async move {
                coalescer
                    .run(9, || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err(GatewayError::not_found("guild", 9))
                    })
                    .await
            }
        });
        for result in futures::future::join_all(futs).await {
            assert!(matches!(
                result,
                Err(GatewayError::NotFound { entity: "guild", id: 9 })
            ));
        }
    }

    #[tokio::test]
    async fn test_abandoned_flight_still_completes() {
        let coalescer: Coalescer<u64, u64> = Coalescer::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&finished);
        let waiter = coalescer.run(5, move || async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(5)
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(5), waiter).await;
        assert!(timed_out.is_err());
        assert_eq!(coalescer.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }
}

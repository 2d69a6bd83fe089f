//! Request de-duplication for the profile fetch
//!
//! Wraps the `async_singleflight` crate so that every consumer asking for the
//! permission list at the same moment (page guard, navigation filter, derived
//! checks) shares one outbound profile request instead of issuing one each.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Error type for SingleFlight operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SingleFlightError<E> {
    /// The leading request was dropped or panicked
    #[error("SingleFlight worker failed - leader dropped or panicked")]
    WorkerFailed,
    /// The underlying operation failed
    #[error("{0}")]
    Inner(E),
}

/// Runs at most one in-flight operation per key; concurrent callers wait
/// for and share its result.
#[derive(Clone)]
pub struct SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<K, V, E>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Execute `f` unless a call for `key` is already running, in which case
    /// wait for that call's result.
    pub async fn do_work<Fut>(&self, key: K, f: Fut) -> Result<V, SingleFlightError<E>>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
    {
        // Err(None) from the group means the leader was dropped
        self.group.work(&key, f).await.map_err(|opt_err| match opt_err {
            Some(inner) => SingleFlightError::Inner(inner),
            None => SingleFlightError::WorkerFailed,
        })
    }

    /// Like `do_work`, mapping a dropped leader to `E` via `error_factory`
    pub async fn do_work_with_fallback<Fut, Ef>(
        &self,
        key: K,
        f: Fut,
        error_factory: Ef,
    ) -> Result<V, E>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
        Ef: FnOnce() -> E,
    {
        self.do_work(key, f).await.map_err(|e| match e {
            SingleFlightError::WorkerFailed => error_factory(),
            SingleFlightError::Inner(err) => err,
        })
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{sleep, Duration};

    type ProfileFlight = SingleFlight<String, Vec<String>, String>;

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let sf = ProfileFlight::new();
        let requests = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let sf = sf.clone();
            let requests = requests.clone();
            handles.push(tokio::spawn(async move {
                sf.do_work("token-a".to_string(), async move {
                    sleep(Duration::from_millis(50)).await;
                    requests.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["list-users".to_string()])
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec!["list-users"]);
        }
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_tokens_fetch_separately() {
        let sf = ProfileFlight::new();
        let a = sf.do_work("a".to_string(), async { Ok(vec!["x".to_string()]) });
        let b = sf.do_work("b".to_string(), async { Ok(vec!["y".to_string()]) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), vec!["x"]);
        assert_eq!(b.unwrap(), vec!["y"]);
    }

    #[tokio::test]
    async fn test_error_is_shared_then_cleared() {
        let sf = ProfileFlight::new();

        let result = sf
            .do_work("t".to_string(), async { Err("503".to_string()) })
            .await;
        assert_eq!(result, Err(SingleFlightError::Inner("503".to_string())));

        let result = sf
            .do_work_with_fallback(
                "t".to_string(),
                async { Ok(vec!["list-orders".to_string()]) },
                || "dropped".to_string(),
            )
            .await;
        assert_eq!(result.unwrap(), vec!["list-orders"]);
    }
}

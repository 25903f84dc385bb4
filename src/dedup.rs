//! Dedup gate (spec §4.4): process-local single-flight for identical
//! concurrent calls.
//!
//! Grounded on the teacher's use of `dashmap` for process-wide concurrent
//! maps. The in-flight map holds a [`Shared`] future per `call_key`; the
//! first caller to insert becomes the leader and drives the underlying
//! call, everyone else just awaits the same future. The entry is removed
//! a short grace delay after completion so a burst of near-simultaneous
//! callers doesn't re-execute needlessly, while a caller arriving later
//! triggers a fresh call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::error::FloridifyError;

type SharedResult = Result<Value, Arc<FloridifyError>>;
type SharedCall = Shared<BoxFuture<'static, SharedResult>>;

pub struct DedupGate {
    inflight: Arc<DashMap<String, SharedCall>>,
    grace_delay: Duration,
}

impl DedupGate {
    pub fn new(grace_delay: Duration) -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            grace_delay,
        }
    }

    /// Run `f()` deduplicated by `call_key`. Concurrent callers with the
    /// same key observe exactly one execution (P5); distinct keys proceed
    /// independently.
    pub async fn call<F, Fut>(&self, call_key: &str, f: F) -> crate::error::Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<Value>> + Send + 'static,
    {
        let mut is_leader = false;
        let shared: SharedCall = match self.inflight.entry(call_key.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                is_leader = true;
                let fut = f();
                let boxed: BoxFuture<'static, SharedResult> =
                    Box::pin(async move { fut.await.map_err(Arc::new) });
                let shared = boxed.shared();
                e.insert(shared.clone());
                shared
            }
        };

        if is_leader {
            let inflight = self.inflight.clone();
            let key = call_key.to_string();
            let grace = self.grace_delay;
            let cleanup_wait = shared.clone();
            tokio::spawn(async move {
                cleanup_wait.await;
                tokio::time::sleep(grace).await;
                inflight.remove(&key);
            });
        }

        shared.await.map_err(|e| clone_error(&e))
    }

    /// Number of calls currently in flight, for observability/tests.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

fn clone_error(e: &FloridifyError) -> FloridifyError {
    // FloridifyError isn't Clone (it wraps non-Clone std::io::Error), so
    // waiters that lost the race get an equivalent error carrying the same
    // message rather than the original value.
    match e {
        FloridifyError::Io(io) => FloridifyError::persistence(format!("io error: {io}")),
        other => FloridifyError::persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_calls_with_same_key_execute_once() {
        let gate = Arc::new(DedupGate::new(Duration::from_millis(50)));
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                gate.call("same-key", move || {
                    let executions = executions.clone();
                    async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(json!(42))
                    }
                })
                .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), json!(42));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_both_execute() {
        let gate = DedupGate::new(Duration::from_millis(10));
        let a = gate.call("a", || async { Ok(json!(1)) });
        let b = gate.call("b", || async { Ok(json!(2)) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), json!(1));
        assert_eq!(b.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn failure_is_shared_by_all_waiters() {
        let gate = Arc::new(DedupGate::new(Duration::from_millis(10)));
        let a = gate.call("k", || async { Err(FloridifyError::provider("boom")) });
        let b = gate.call("k", || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(json!(0))
        });
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_err());
        assert!(b.is_err());
    }

    #[tokio::test]
    async fn entry_is_removed_after_grace_delay() {
        let gate = DedupGate::new(Duration::from_millis(20));
        gate.call("k", || async { Ok(json!(1)) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(gate.inflight_count(), 0);
    }
}

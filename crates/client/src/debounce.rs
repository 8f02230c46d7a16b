//! Debounced, cancellable query resolution.
//!
//! ```text
//! Idle --input--> Pending(q) --wait--> resolve(q) --ok--> Resolved(q, results)
//!                     ^                     |
//!                     +------input----------+--err--> Idle
//! ```
//!
//! Every [`SearchPipeline::input`] bumps a generation counter, aborts the
//! pending timer task and starts a new one. A task only publishes its result
//! if its generation is still current when the resolver returns, so the last
//! query issued wins regardless of completion order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ClientError;

/// Turns a settled query into results.
#[async_trait]
pub trait Resolver<T>: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<T, ClientError>;
}

/// Observable pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState<T> {
    /// Nothing pending, nothing to show.
    Idle,
    /// Waiting for input to settle or for the resolver.
    Pending { query: String },
    /// Results for the latest query.
    Resolved { query: String, results: T },
}

impl<T> SearchState<T> {
    /// Results, if resolved.
    #[must_use]
    pub const fn results(&self) -> Option<&T> {
        match self {
            Self::Resolved { results, .. } => Some(results),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

struct Shared<T> {
    delay: Duration,
    resolver: Arc<dyn Resolver<T>>,
    generation: AtomicU64,
    state: watch::Sender<SearchState<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
    last: Mutex<Option<(String, T)>>,
}

impl<T> Shared<T> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn last_for(&self, query: &str) -> Option<T>
    where
        T: Clone,
    {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(q, _)| q == query)
            .map(|(_, results)| results.clone())
    }

    /// Publish only if no newer input arrived meanwhile.
    fn publish(&self, generation: u64, state: SearchState<T>) {
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            *current = state;
            true
        });
    }
}

/// A debounced query pipeline over a [`Resolver`].
///
/// Cheap to clone; clones drive the same pipeline. Requires a tokio runtime.
pub struct SearchPipeline<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SearchPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> SearchPipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle pipeline that waits `delay` after the last input.
    pub fn new(delay: Duration, resolver: Arc<dyn Resolver<T>>) -> Self {
        let (state, _) = watch::channel(SearchState::Idle);
        Self {
            shared: Arc::new(Shared {
                delay,
                resolver,
                generation: AtomicU64::new(0),
                state,
                task: Mutex::new(None),
                last: Mutex::new(None),
            }),
        }
    }

    /// Feed a new query, restarting the wait window.
    pub fn input(&self, query: impl Into<String>) {
        let query: String = query.into();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.shared.state.send_replace(SearchState::Pending {
            query: query.clone(),
        });

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(shared.delay).await;
            if !shared.is_current(generation) {
                return;
            }

            // Distinct until changed: re-apply instead of re-dispatching
            let key = query.trim().to_string();
            if let Some(results) = shared.last_for(&key) {
                shared.publish(generation, SearchState::Resolved { query, results });
                return;
            }

            match shared.resolver.resolve(&key).await {
                Ok(results) => {
                    if !shared.is_current(generation) {
                        tracing::debug!(query = %key, "Discarding stale results");
                        return;
                    }
                    *shared.last.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some((key, results.clone()));
                    shared.publish(generation, SearchState::Resolved { query, results });
                }
                Err(e) => {
                    tracing::warn!(query = %key, error = %e, "Search failed");
                    shared.publish(generation, SearchState::Idle);
                }
            }
        });

        self.replace_task(Some(task));
    }

    /// Cancel anything pending and go back to `Idle`.
    ///
    /// Also forgets the last results, so the next query is always fetched.
    pub fn clear(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_task(None);
        *self.shared.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.state.send_replace(SearchState::Idle);
    }

    /// Wait until the latest query has resolved or failed.
    ///
    /// Returns immediately if nothing is pending.
    pub async fn settled(&self) -> SearchState<T> {
        let mut changes = self.subscribe();
        match changes.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SearchState<T> {
        self.shared.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchState<T>> {
        self.shared.state.subscribe()
    }

    fn replace_task(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.shared.task.lock().unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Echoes the query after `latency`, recording every call.
    struct Echo {
        latency: Duration,
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Echo {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Resolver<Vec<String>> for Echo {
        async fn resolve(&self, query: &str) -> Result<Vec<String>, ClientError> {
            self.calls.lock().unwrap().push(query.to_string());
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(ClientError::RateLimited);
            }
            Ok(vec![format!("result for {query}")])
        }
    }

    const DELAY: Duration = Duration::from_millis(400);

    #[tokio::test(start_paused = true)]
    async fn test_rapid_inputs_resolve_only_the_last() {
        let echo = Echo::new(Duration::from_millis(10));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        pipeline.input("ab");
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.input("abc");
        assert!(pipeline.state().is_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(echo.calls(), vec!["abc"]);
        assert_eq!(
            pipeline.state(),
            SearchState::Resolved {
                query: "abc".to_string(),
                results: vec!["result for abc".to_string()],
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_is_discarded_when_superseded() {
        let echo = Echo::new(Duration::from_millis(300));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        pipeline.input("first");
        // Debounce elapsed; "first" is now in flight
        tokio::time::sleep(Duration::from_millis(450)).await;
        pipeline.input("second");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(echo.calls(), vec!["first", "second"]);
        assert_eq!(
            pipeline.state().results(),
            Some(&vec!["result for second".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_query_is_not_dispatched_twice() {
        let echo = Echo::new(Duration::from_millis(10));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        pipeline.input("main st");
        tokio::time::sleep(Duration::from_secs(1)).await;
        pipeline.input("main st ");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(echo.calls(), vec!["main st"]);
        assert!(pipeline.state().results().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_work() {
        let echo = Echo::new(Duration::from_millis(10));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        pipeline.input("abc");
        pipeline.clear();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(echo.calls().is_empty());
        assert_eq!(pipeline.state(), SearchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_query_after_clear_is_fetched_again() {
        let echo = Echo::new(Duration::from_millis(10));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        pipeline.input("ana");
        pipeline.settled().await;
        pipeline.clear();
        pipeline.input("ana");
        pipeline.settled().await;

        assert_eq!(echo.calls(), vec!["ana", "ana"]);
        assert!(pipeline.state().results().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_waits_out_the_debounce() {
        let echo = Echo::new(Duration::from_millis(10));
        let pipeline = SearchPipeline::new(DELAY, echo.clone());

        assert_eq!(pipeline.settled().await, SearchState::Idle);

        pipeline.input("ana");
        let state = pipeline.settled().await;
        assert_eq!(
            state,
            SearchState::Resolved {
                query: "ana".to_string(),
                results: vec!["result for ana".to_string()],
            }
        );
        assert_eq!(echo.calls(), vec!["ana"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_error_returns_to_idle() {
        let echo = Arc::new(Echo {
            latency: Duration::from_millis(10),
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let pipeline = SearchPipeline::new(DELAY, echo.clone());
        let mut changes = pipeline.subscribe();

        pipeline.input("abc");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(echo.calls(), vec!["abc"]);
        assert_eq!(pipeline.state(), SearchState::Idle);
        assert!(changes.has_changed().unwrap());
    }
}

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use dux_core::RequestId;

use crate::error::FetchError;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Fetcher<K, V> = Arc<dyn Fn(K) -> BoxFuture<Result<V, FetchError>> + Send + Sync>;

/// Status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    Pending,
    Fulfilled,
    Rejected,
}

/// What a consumer sees for one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState<V> {
    pub status: QueryStatus,
    pub data: Option<V>,
    pub error: Option<String>,
    /// First request in flight, no data yet.
    pub is_loading: bool,
    /// Any request in flight, including refetches over cached data.
    pub is_fetching: bool,
    pub request_id: Option<RequestId>,
    pub started_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    /// Last time a consumer subscribed to or released this entry.
    pub last_accessed_at: DateTime<Utc>,
}

impl<V> QueryState<V> {
    fn pending(request_id: RequestId) -> Self {
        let mut state = Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            is_loading: false,
            is_fetching: false,
            request_id: None,
            started_at: None,
            fulfilled_at: None,
            last_accessed_at: Utc::now(),
        };
        state.start(request_id);
        state
    }

    fn start(&mut self, request_id: RequestId) {
        self.status = QueryStatus::Pending;
        self.is_fetching = true;
        self.is_loading = self.data.is_none();
        self.request_id = Some(request_id);
        self.started_at = Some(Utc::now());
    }

    fn fulfill(&mut self, data: V) {
        self.status = QueryStatus::Fulfilled;
        self.data = Some(data);
        self.error = None;
        self.is_fetching = false;
        self.is_loading = false;
        self.fulfilled_at = Some(Utc::now());
    }

    fn reject(&mut self, error: &FetchError) {
        self.status = QueryStatus::Rejected;
        self.error = Some(error.to_string());
        self.is_fetching = false;
        self.is_loading = false;
    }

    fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Fulfilled
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Rejected
    }

    /// Convert the data while keeping the request bookkeeping.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> QueryState<U> {
        QueryState {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            request_id: self.request_id,
            started_at: self.started_at,
            fulfilled_at: self.fulfilled_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

struct CacheEntry<V> {
    state: Arc<watch::Sender<QueryState<V>>>,
    subscribers: usize,
    idle_since: Option<Instant>,
}

struct Inner<K, V> {
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    fetcher: Fetcher<K, V>,
    keep_unused_for: Duration,
}

/// Request-keyed cache for one named endpoint.
///
/// At most one request per key is in flight: consumers of a pending key
/// attach to the running request, consumers of a fulfilled key get the
/// cached data without touching the network. Entries nobody subscribes to
/// are dropped by [`QueryCache::evict_expired`] once they have been idle
/// for `keep_unused_for`.
pub struct QueryCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: &'static str, keep_unused_for: Duration, fetch: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let fetcher: Fetcher<K, V> =
            Arc::new(move |args: K| -> BoxFuture<Result<V, FetchError>> { Box::pin(fetch(args)) });

        Self {
            inner: Arc::new(Inner {
                name,
                entries: DashMap::new(),
                fetcher,
                keep_unused_for,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Subscribe to the entry for `args`, issuing a request if the entry is
    /// missing or its last request failed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn use_query(&self, args: K) -> QuerySubscription<K, V> {
        let (state, request) = match self.inner.entries.entry(args.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.subscribers += 1;
                entry.idle_since = None;

                let rejected = entry.state.borrow().is_error();
                let request = if rejected {
                    tracing::debug!(
                        "{}({:?}) previously failed, requesting again",
                        self.name(),
                        args
                    );
                    let request_id = RequestId::new();
                    entry.state.send_modify(|s| {
                        s.touch();
                        s.start(request_id);
                    });
                    Some(request_id)
                } else {
                    tracing::debug!("{}({:?}) served from cache", self.name(), args);
                    touch_quietly(&entry.state);
                    None
                };
                (entry.state.clone(), request)
            }
            Entry::Vacant(vacant) => {
                tracing::debug!("{}({:?}) not cached, requesting", self.name(), args);
                let request_id = RequestId::new();
                let (sender, _) = watch::channel(QueryState::pending(request_id));
                let state = Arc::new(sender);
                vacant.insert(CacheEntry {
                    state: state.clone(),
                    subscribers: 1,
                    idle_since: None,
                });
                (state, Some(request_id))
            }
        };

        if let Some(request_id) = request {
            self.spawn_fetch(args.clone(), request_id, state.clone());
        }

        QuerySubscription {
            cache: self.clone(),
            receiver: state.subscribe(),
            state,
            args,
        }
    }

    fn spawn_fetch(
        &self,
        args: K,
        request_id: RequestId,
        state: Arc<watch::Sender<QueryState<V>>>,
    ) {
        let name = self.inner.name;
        let request = (self.inner.fetcher)(args.clone());

        tokio::spawn(async move {
            let result = request.await;
            if let Err(e) = &result {
                tracing::warn!("{}({:?}) failed: {}", name, args, e);
            }

            state.send_if_modified(move |s| {
                if s.request_id != Some(request_id) {
                    tracing::debug!("{}({:?}) dropping superseded {}", name, args, request_id);
                    return false;
                }
                match result {
                    Ok(data) => s.fulfill(data),
                    Err(e) => s.reject(&e),
                }
                true
            });
        });
    }

    fn release(&self, args: &K, state: &Arc<watch::Sender<QueryState<V>>>) {
        if let Some(mut entry) = self.inner.entries.get_mut(args) {
            // The entry may have been evicted and recreated since.
            if !Arc::ptr_eq(&entry.state, state) {
                return;
            }
            entry.subscribers = entry.subscribers.saturating_sub(1);
            touch_quietly(&entry.state);
            if entry.subscribers == 0 {
                entry.idle_since = Some(Instant::now());
            }
        }
    }

    /// Remove entries that have had no subscribers for `keep_unused_for`.
    /// Returns the number of evicted entries.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let keep = self.inner.keep_unused_for;
        let name = self.inner.name;
        let mut evicted = 0;

        self.inner.entries.retain(|args, entry| {
            let expired = entry.subscribers == 0
                && entry
                    .idle_since
                    .is_some_and(|since| now.duration_since(since) >= keep);
            if expired {
                tracing::debug!("{}({:?}) evicted after {:?} unused", name, args, keep);
                evicted += 1;
            }
            !expired
        });

        evicted
    }

    /// Run [`QueryCache::evict_expired`] every `interval` until the task is
    /// aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                cache.evict_expired();
            }
        })
    }

    pub fn contains(&self, args: &K) -> bool {
        self.inner.entries.contains_key(args)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Current state of the entry for `args`, without subscribing.
    pub fn peek(&self, args: &K) -> Option<QueryState<V>> {
        self.inner
            .entries
            .get(args)
            .map(|entry| entry.state.borrow().clone())
    }

    pub fn subscriber_count(&self, args: &K) -> usize {
        self.inner
            .entries
            .get(args)
            .map(|entry| entry.subscribers)
            .unwrap_or(0)
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Serialize + Send + Sync + 'static,
    V: Clone + Serialize + Send + Sync + 'static,
{
    /// Cache key as shown in snapshots, e.g. `getTodoById(3)`.
    /// Argument-less queries render as `getTodos(undefined)`.
    pub fn cache_key(&self, args: &K) -> String {
        let args = match serde_json::to_value(args) {
            Ok(serde_json::Value::Null) | Err(_) => "undefined".to_string(),
            Ok(value) => value.to_string(),
        };
        format!("{}({})", self.inner.name, args)
    }

    /// Add every entry of this cache to `queries` under its cache key.
    pub fn snapshot_into(&self, queries: &mut BTreeMap<String, QueryState<serde_json::Value>>) {
        for entry in self.inner.entries.iter() {
            let state = entry
                .state
                .borrow()
                .clone()
                .map(|data| serde_json::to_value(data).unwrap_or_default());
            queries.insert(self.cache_key(entry.key()), state);
        }
    }
}

/// Record an access without waking subscribers.
fn touch_quietly<V>(state: &watch::Sender<QueryState<V>>) {
    state.send_if_modified(|s| {
        s.touch();
        false
    });
}

/// A live consumer of one cache entry. Dropping it releases the entry.
pub struct QuerySubscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: QueryCache<K, V>,
    state: Arc<watch::Sender<QueryState<V>>>,
    receiver: watch::Receiver<QueryState<V>>,
    args: K,
}

impl<K, V> QuerySubscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn args(&self) -> &K {
        &self.args
    }

    pub fn current(&self) -> QueryState<V> {
        self.receiver.borrow().clone()
    }

    /// Wait until no request is in flight for this entry.
    pub async fn settled(&mut self) -> QueryState<V> {
        if let Ok(state) = self.receiver.wait_for(|s| !s.is_fetching).await {
            return state.clone();
        }
        self.current()
    }

    /// Wait for the next change of this entry.
    pub async fn changed(&mut self) -> Option<QueryState<V>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Issue a new request for this entry, keeping any cached data visible
    /// until it resolves. Attaches to the running request instead if one is
    /// already in flight.
    pub fn refetch(&self) {
        let request_id = RequestId::new();
        let started = self.state.send_if_modified(|s| {
            if s.is_fetching {
                return false;
            }
            s.start(request_id);
            true
        });

        if !started {
            tracing::debug!(
                "{}({:?}) refetch joins the request in flight",
                self.cache.name(),
                self.args
            );
            return;
        }

        tracing::debug!("{}({:?}) refetch", self.cache.name(), self.args);
        self.cache
            .spawn_fetch(self.args.clone(), request_id, self.state.clone());
    }
}

impl<K, V> Drop for QuerySubscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.release(&self.args, &self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use tokio::time::advance;

    const KEEP: Duration = Duration::from_secs(60);

    /// Fetcher whose requests block on a semaphore until the test releases
    /// them.
    struct Upstream {
        calls: AtomicUsize,
        gate: Semaphore,
        fail: std::sync::atomic::AtomicBool,
    }

    impl Upstream {
        fn open() -> Arc<Self> {
            Self::with_permits(Semaphore::MAX_PERMITS)
        }

        fn gated() -> Arc<Self> {
            Self::with_permits(0)
        }

        fn with_permits(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(permits),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn cache(self: &Arc<Self>) -> QueryCache<u32, String> {
            let upstream = self.clone();
            QueryCache::new("getThing", KEEP, move |id: u32| {
                let upstream = upstream.clone();
                async move {
                    let call = upstream.calls.fetch_add(1, Ordering::SeqCst) + 1;
                    upstream.gate.acquire().await.unwrap().forget();
                    if upstream.fail.load(Ordering::SeqCst) {
                        return Err(FetchError::Status {
                            url: format!("/things/{id}"),
                            status: 500,
                        });
                    }
                    Ok(format!("thing-{id}#{call}"))
                }
            })
        }
    }

    async fn wait_for_calls(upstream: &Upstream, n: usize) {
        while upstream.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_first_query_is_loading() {
        let upstream = Upstream::gated();
        let cache = upstream.cache();

        let mut sub = cache.use_query(1);
        let state = sub.current();
        assert_eq!(state.status, QueryStatus::Pending);
        assert!(state.is_loading);
        assert!(state.is_fetching);
        assert!(state.data.is_none());

        upstream.release(1);
        let state = sub.settled().await;
        assert!(state.is_success());
        assert_eq!(state.data.as_deref(), Some("thing-1#1"));
        assert!(!state.is_loading);
        assert!(state.fulfilled_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_request() {
        let upstream = Upstream::gated();
        let cache = upstream.cache();

        let mut first = cache.use_query(7);
        let mut second = cache.use_query(7);
        wait_for_calls(&upstream, 1).await;
        assert_eq!(cache.subscriber_count(&7), 2);

        upstream.release(1);
        let a = first.settled().await;
        let b = second.settled().await;

        assert_eq!(upstream.calls(), 1);
        assert_eq!(a.data, b.data);
        assert_eq!(a.request_id, b.request_id);
    }

    #[tokio::test]
    async fn test_fulfilled_entry_served_from_cache() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(1);
        sub.settled().await;
        drop(sub);

        let sub = cache.use_query(1);
        let state = sub.current();
        assert!(state.is_success());
        assert!(!state.is_fetching);
        assert_eq!(state.data.as_deref(), Some("thing-1#1"));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_args_are_independent_entries() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut subs: Vec<_> = (1..=10).map(|id| cache.use_query(id)).collect();
        for sub in &mut subs {
            sub.settled().await;
        }

        assert_eq!(cache.len(), 10);
        assert_eq!(upstream.calls(), 10);
        assert_eq!(
            cache.peek(&3).and_then(|s| s.data).map(|d| d.starts_with("thing-3#")),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_failure_rejects_without_retry() {
        let upstream = Upstream::open();
        upstream.set_failing(true);
        let cache = upstream.cache();

        let mut sub = cache.use_query(4);
        let state = sub.settled().await;
        assert!(state.is_error());
        assert!(state.data.is_none());
        assert!(state.error.as_deref().unwrap().contains("500"));

        tokio::task::yield_now().await;
        assert_eq!(upstream.calls(), 1);
        assert_eq!(sub.current().status, QueryStatus::Rejected);
    }

    #[tokio::test]
    async fn test_new_subscription_requeries_rejected_entry() {
        let upstream = Upstream::open();
        upstream.set_failing(true);
        let cache = upstream.cache();

        let mut first = cache.use_query(4);
        first.settled().await;

        upstream.set_failing(false);
        let mut second = cache.use_query(4);
        let state = second.settled().await;

        assert_eq!(upstream.calls(), 2);
        assert!(state.is_success());
        assert!(first.current().is_success());
    }

    #[tokio::test]
    async fn test_refetch_keeps_stale_data() {
        let upstream = Upstream::gated();
        let cache = upstream.cache();

        let mut sub = cache.use_query(2);
        upstream.release(1);
        sub.settled().await;

        sub.refetch();
        let state = sub.current();
        assert!(state.is_fetching);
        assert!(!state.is_loading);
        assert_eq!(state.data.as_deref(), Some("thing-2#1"));

        upstream.release(1);
        let state = sub.settled().await;
        assert_eq!(state.data.as_deref(), Some("thing-2#2"));
    }

    #[tokio::test]
    async fn test_refetch_while_pending_joins_request() {
        let upstream = Upstream::gated();
        let cache = upstream.cache();

        let mut sub = cache.use_query(5);
        wait_for_calls(&upstream, 1).await;
        let request_id = sub.current().request_id;

        sub.refetch();
        tokio::task::yield_now().await;
        assert_eq!(upstream.calls(), 1);
        assert_eq!(sub.current().request_id, request_id);

        upstream.release(1);
        let state = sub.settled().await;
        assert_eq!(upstream.calls(), 1);
        assert_eq!(state.data.as_deref(), Some("thing-5#1"));
    }

    #[tokio::test]
    async fn test_refetch_after_requery_of_rejected_entry_fetches_once() {
        let upstream = Upstream::open();
        upstream.set_failing(true);
        let cache = upstream.cache();

        let mut first = cache.use_query(4);
        first.settled().await;
        drop(first);

        // Same sequence as the refetch route: subscribe, then refetch.
        let mut sub = cache.use_query(4);
        sub.refetch();
        let state = sub.settled().await;
        tokio::task::yield_now().await;

        assert!(state.is_error());
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_changed_reports_resolution() {
        let upstream = Upstream::gated();
        let cache = upstream.cache();

        let mut sub = cache.use_query(9);
        upstream.release(1);
        let state = sub.changed().await.unwrap();
        assert!(state.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_idle_period() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut one = cache.use_query(1);
        let mut two = cache.use_query(2);
        one.settled().await;
        two.settled().await;

        drop(one);
        advance(KEEP - Duration::from_secs(1)).await;
        assert_eq!(cache.evict_expired(), 0);

        advance(Duration::from_secs(1)).await;
        assert_eq!(cache.evict_expired(), 1);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(two.current().is_success());

        // A later identical query fetches again.
        let mut again = cache.use_query(1);
        again.settled().await;
        assert_eq!(upstream.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_subscriber_prevents_eviction() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(1);
        sub.settled().await;

        advance(KEEP * 10).await;
        assert_eq!(cache.evict_expired(), 0);
        assert!(cache.contains(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribing_resets_idle_clock() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(1);
        sub.settled().await;
        drop(sub);

        advance(KEEP / 2).await;
        drop(cache.use_query(1));
        advance(KEEP / 2).await;

        assert_eq!(cache.evict_expired(), 0);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(1);
        sub.settled().await;
        drop(sub);

        let sweeper = cache.spawn_sweeper(Duration::from_secs(10));
        tokio::time::sleep(KEEP + Duration::from_secs(15)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_snapshot_uses_cache_keys() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(3);
        sub.settled().await;

        let mut queries = BTreeMap::new();
        cache.snapshot_into(&mut queries);
        let state = &queries["getThing(3)"];
        assert_eq!(state.data, Some(serde_json::json!("thing-3#1")));
        assert_eq!(state.status, QueryStatus::Fulfilled);

        let json = serde_json::to_value(state).unwrap();
        assert!(json["lastAccessedAt"].is_string());
    }

    #[test]
    fn test_unit_args_render_as_undefined() {
        let cache: QueryCache<(), String> = QueryCache::new("getAll", KEEP, |()| async {
            Ok::<_, FetchError>("all".to_string())
        });
        assert_eq!(cache.cache_key(&()), "getAll(undefined)");
    }

    #[tokio::test]
    async fn test_access_updates_last_accessed_at() {
        let upstream = Upstream::open();
        let cache = upstream.cache();

        let mut sub = cache.use_query(6);
        let first = sub.settled().await.last_accessed_at;
        drop(sub);
        let released = cache.peek(&6).unwrap().last_accessed_at;
        assert!(released >= first);

        let mut again = cache.use_query(6);
        assert!(again.current().last_accessed_at >= released);

        // Recording the access does not count as a change.
        let pending = tokio::time::timeout(Duration::from_millis(10), again.changed());
        assert!(pending.await.is_err());
        assert_eq!(upstream.calls(), 1);
    }
}

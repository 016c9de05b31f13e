//! crates/saarthi_core/src/query/cache.rs
//!
//! The query cache: one entry per `QueryKey`, at most one request in flight per
//! entry, per-key interval pollers, invalidation and mutations.
//!
//! All shared state sits behind one `std::sync::Mutex` that is never held
//! across an `.await`. Requests run as spawned tasks so that a subscriber going
//! away never cancels a fetch other subscribers are waiting on.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::options::{CacheConfig, QueryOptions, QueryState, QueryStatus};
use crate::ports::{PortError, PortResult};

//=========================================================================================
// Internal Types
//=========================================================================================

type AnyData = Arc<dyn Any + Send + Sync>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, PortResult<AnyData>> + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, ()>>;

/// What gets broadcast to subscribers after every change to an entry.
#[derive(Clone)]
struct Snapshot {
    data: Option<AnyData>,
    status: QueryStatus,
    error: Option<PortError>,
    is_fetching: bool,
    fetched_at: Option<DateTime<Utc>>,
    failure_count: u32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            is_fetching: false,
            fetched_at: None,
            failure_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SubscriberPolicy {
    enabled: bool,
    refetch_interval: Option<Duration>,
    in_background: bool,
}

struct Poller {
    period: Duration,
    background: bool,
    token: CancellationToken,
}

struct QueryEntry {
    data: Option<AnyData>,
    status: QueryStatus,
    error: Option<PortError>,
    fetched_at: Option<Instant>,
    fetched_at_utc: Option<DateTime<Utc>>,
    last_started: Option<Instant>,
    invalidated: bool,
    failure_count: u32,
    in_flight: Option<InFlight>,
    fetch_seq: u64,
    fetcher: Option<Fetcher>,
    subscribers: HashMap<u64, SubscriberPolicy>,
    poller: Option<Poller>,
    idle_since: Option<Instant>,
    notify: watch::Sender<Snapshot>,
}

impl QueryEntry {
    fn new() -> Self {
        let (notify, _) = watch::channel(Snapshot::default());
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            fetched_at: None,
            fetched_at_utc: None,
            last_started: None,
            invalidated: false,
            failure_count: 0,
            in_flight: None,
            fetch_seq: 0,
            fetcher: None,
            subscribers: HashMap::new(),
            poller: None,
            idle_since: None,
            notify,
        }
    }

    /// Absent, invalidated, errored, or older than `stale_time`.
    fn needs_fetch(&self, stale_time: Duration) -> bool {
        if self.invalidated || self.status == QueryStatus::Error {
            return true;
        }
        match (self.data.as_ref(), self.fetched_at) {
            (Some(_), Some(at)) => at.elapsed() >= stale_time,
            _ => true,
        }
    }

    fn has_active_subscriber(&self) -> bool {
        self.subscribers.values().any(|s| s.enabled)
    }

    fn publish(&self) {
        self.notify.send_replace(Snapshot {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.in_flight.is_some(),
            fetched_at: self.fetched_at_utc,
            failure_count: self.failure_count,
        });
    }
}

/// Outcome of a poller deadline.
enum PollStep {
    Wait(InFlight),
    NotDue,
    Gone,
}

//=========================================================================================
// The Cache
//=========================================================================================

struct CacheInner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, QueryEntry>>,
    next_subscriber: AtomicU64,
    focused: watch::Sender<bool>,
}

/// An owned query store. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let (focused, _) = watch::channel(true);
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                focused,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Registers interest in `key`.
    ///
    /// Fetches when the entry is absent, invalidated, errored or older than the
    /// stale time, attaching to a request already in flight instead of issuing a
    /// second one. Starts (or retunes) the key's poller when the options ask for
    /// an interval. Must be called from within a Tokio runtime.
    pub fn subscribe<T, F, Fut>(&self, key: QueryKey, fetcher: F, options: QueryOptions) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PortResult<T>> + Send + 'static,
    {
        self.gc();

        let fetcher: Fetcher = Arc::new(move || {
            let request = fetcher();
            async move { request.await.map(|value| Arc::new(value) as AnyData) }.boxed()
        });
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        let rx = {
            let mut entries = self.inner.lock();
            let entry = entries.entry(key.clone()).or_insert_with(QueryEntry::new);
            entry.fetcher = Some(fetcher);
            entry.idle_since = None;
            entry.subscribers.insert(
                id,
                SubscriberPolicy {
                    enabled: options.enabled,
                    refetch_interval: options.refetch_interval.filter(|i| !i.is_zero()),
                    in_background: options.refetch_in_background,
                },
            );

            if options.enabled && entry.needs_fetch(options.stale_time) {
                start_fetch(&self.inner, &key, entry);
            } else if options.enabled {
                debug!(key = %key, "serving fresh cached data");
            }
            reschedule(&self.inner, &key, entry);
            entry.notify.subscribe()
        };

        Subscription {
            cache: self.inner.clone(),
            key,
            id,
            enabled: options.enabled,
            rx,
            _marker: PhantomData,
        }
    }

    /// Marks `key` stale. Starts exactly one fetch when an enabled subscriber
    /// is active and nothing is in flight; returns whether it did.
    ///
    /// A request already in flight is left alone and its result is treated as
    /// authoritative when it lands.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut entries = self.inner.lock();
        match entries.get_mut(key) {
            Some(entry) => invalidate_entry(&self.inner, key, entry),
            None => false,
        }
    }

    /// Invalidates every key that starts with `prefix`. Returns the number of
    /// fetches started.
    pub fn invalidate_matching(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.lock();
        let mut started = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            if invalidate_entry(&self.inner, key, entry) {
                started += 1;
            }
        }
        started
    }

    /// Runs a one-shot write under the request timeout. On success each key in
    /// `invalidates` is invalidated.
    pub async fn mutate<R, Fut>(&self, request: Fut, invalidates: &[QueryKey]) -> PortResult<R>
    where
        Fut: Future<Output = PortResult<R>>,
    {
        let result = match tokio::time::timeout(self.inner.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout),
        };

        match &result {
            Ok(_) => {
                for key in invalidates {
                    self.invalidate(key);
                }
            }
            Err(e) => warn!(error = %e, "mutation failed"),
        }
        result
    }

    /// Tells the cache whether the host view has focus. Pollers of keys with no
    /// background subscriber pause while unfocused.
    pub fn set_focused(&self, focused: bool) {
        self.inner.focused.send_replace(focused);
    }

    /// Drops entries with no subscribers whose retention window has elapsed and
    /// that have nothing in flight. Returns how many were dropped.
    pub fn gc(&self) -> usize {
        let retention = self.inner.config.retention;
        let mut entries = self.inner.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.subscribers.is_empty()
                && entry.in_flight.is_none()
                && entry
                    .idle_since
                    .map_or(false, |since| since.elapsed() >= retention);
            if expired {
                debug!(key = %key, "dropping unused query entry");
            }
            !expired
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, QueryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the result of fetch number `seq`. A key never has two fetches
    /// in flight, so results land in the order their fetches started.
    fn complete(&self, key: &QueryKey, seq: u64, result: PortResult<AnyData>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.in_flight = None;

        match result {
            Ok(data) => {
                entry.data = Some(data);
                entry.status = QueryStatus::Success;
                entry.error = None;
                entry.fetched_at = Some(Instant::now());
                entry.fetched_at_utc = Some(Utc::now());
                entry.invalidated = false;
                entry.failure_count = 0;
                debug!(key = %key, seq, "fetch succeeded");
            }
            Err(e) => {
                entry.status = QueryStatus::Error;
                entry.failure_count += 1;
                if e.is_retryable() {
                    warn!(key = %key, seq, error = %e, failures = entry.failure_count, "fetch failed, keeping last data");
                } else {
                    info!(key = %key, seq, error = %e, "fetch rejected");
                }
                entry.error = Some(e);
            }
        }
        entry.publish();
    }

    fn unsubscribe(self: &Arc<Self>, key: &QueryKey, id: u64) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.subscribers.remove(&id);
            if entry.subscribers.is_empty() {
                entry.idle_since = Some(Instant::now());
            }
            reschedule(self, key, entry);
        }
    }

    /// What the poller of `key` should do once its deadline has passed.
    fn poll_due(self: &Arc<Self>, key: &QueryKey, period: Duration) -> PollStep {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return PollStep::Gone;
        };
        if let Some(in_flight) = &entry.in_flight {
            return PollStep::Wait(in_flight.clone());
        }
        let due = entry
            .last_started
            .map_or(true, |started| started.elapsed() >= period);
        if !due {
            return PollStep::NotDue;
        }
        match start_fetch(self, key, entry) {
            Some(in_flight) => PollStep::Wait(in_flight),
            None => PollStep::Gone,
        }
    }

    fn next_deadline(&self, key: &QueryKey, period: Duration) -> Option<Instant> {
        let entries = self.lock();
        let entry = entries.get(key)?;
        Some(
            entry
                .last_started
                .map_or_else(|| Instant::now() + period, |started| started + period),
        )
    }
}

//=========================================================================================
// Fetching and Scheduling
//=========================================================================================

/// Starts a fetch for `key`, or returns the one already in flight.
/// `None` only when no fetcher has been registered.
fn start_fetch(inner: &Arc<CacheInner>, key: &QueryKey, entry: &mut QueryEntry) -> Option<InFlight> {
    if let Some(in_flight) = &entry.in_flight {
        return Some(in_flight.clone());
    }
    let fetcher = entry.fetcher.clone()?;

    entry.fetch_seq += 1;
    let seq = entry.fetch_seq;
    entry.last_started = Some(Instant::now());
    if entry.data.is_none() {
        entry.status = QueryStatus::Loading;
    }

    let weak = Arc::downgrade(inner);
    let timeout = inner.config.request_timeout;
    let task_key = key.clone();
    let task = async move {
        let result = match tokio::time::timeout(timeout, fetcher()).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout),
        };
        if let Some(inner) = weak.upgrade() {
            inner.complete(&task_key, seq, result);
        }
    }
    .boxed()
    .shared();

    entry.in_flight = Some(task.clone());
    entry.publish();
    debug!(key = %key, seq, "fetch started");
    tokio::spawn(task.clone());
    Some(task)
}

fn invalidate_entry(inner: &Arc<CacheInner>, key: &QueryKey, entry: &mut QueryEntry) -> bool {
    entry.invalidated = true;
    if !entry.has_active_subscriber() {
        debug!(key = %key, "invalidated without subscribers");
        return false;
    }
    if entry.in_flight.is_some() {
        debug!(key = %key, "invalidated while in flight, awaiting pending result");
        return false;
    }
    start_fetch(inner, key, entry).is_some()
}

/// Brings the key's poller in line with its enabled subscribers: the smallest
/// declared interval wins, and the poller runs in the background if any of those
/// subscribers asked for it.
fn reschedule(inner: &Arc<CacheInner>, key: &QueryKey, entry: &mut QueryEntry) {
    let polling: Vec<&SubscriberPolicy> = entry
        .subscribers
        .values()
        .filter(|s| s.enabled && s.refetch_interval.is_some())
        .collect();
    let period = polling.iter().filter_map(|s| s.refetch_interval).min();
    let background = polling.iter().any(|s| s.in_background);

    if let (Some(current), Some(period)) = (&entry.poller, period) {
        if current.period == period && current.background == background {
            return;
        }
    }
    if let Some(old) = entry.poller.take() {
        old.token.cancel();
        debug!(key = %key, "poller stopped");
    }
    let Some(period) = period else {
        return;
    };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(key = %key, "no runtime available, polling not started");
        return;
    };

    let token = CancellationToken::new();
    runtime.spawn(poll_loop(
        Arc::downgrade(inner),
        key.clone(),
        period,
        background,
        token.clone(),
    ));
    debug!(key = %key, period_ms = period.as_millis() as u64, background, "poller started");
    entry.poller = Some(Poller {
        period,
        background,
        token,
    });
}

/// Issues a fetch `period` after the previous one started, for as long as the
/// token lives. A fetch started by anything else pushes the deadline back.
async fn poll_loop(
    inner: Weak<CacheInner>,
    key: QueryKey,
    period: Duration,
    background: bool,
    token: CancellationToken,
) {
    loop {
        let (deadline, mut focus) = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let Some(deadline) = inner.next_deadline(&key, period) else {
                return;
            };
            (deadline, inner.focused.subscribe())
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        if !background {
            while !*focus.borrow_and_update() {
                tokio::select! {
                    _ = token.cancelled() => return,
                    changed = focus.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        let step = match inner.upgrade() {
            Some(inner) => inner.poll_due(&key, period),
            None => return,
        };
        match step {
            PollStep::Wait(in_flight) => {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = in_flight => {}
                }
            }
            PollStep::NotDue => {}
            PollStep::Gone => return,
        }
    }
}

//=========================================================================================
// Subscriptions
//=========================================================================================

/// A live interest in one key. Dropping it unregisters the subscriber; the
/// last drop stops the key's poller and starts its retention window.
pub struct Subscription<T> {
    cache: Arc<CacheInner>,
    key: QueryKey,
    id: u64,
    enabled: bool,
    rx: watch::Receiver<Snapshot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The current state of the entry. A disabled subscription always reports
    /// `Idle`, though it still sees data other subscribers loaded.
    pub fn state(&self) -> QueryState<T> {
        let snapshot = self.rx.borrow().clone();
        self.project(snapshot)
    }

    /// Waits for the next change to the entry. `None` once the entry is gone.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.state())
    }

    /// Waits until no fetch is in flight for the key.
    pub async fn settled(&mut self) -> QueryState<T> {
        if self.enabled {
            let _ = self.rx.wait_for(|snapshot| !snapshot.is_fetching).await;
        }
        self.state()
    }

    /// Fetches now, or attaches to the fetch already in flight, and returns
    /// the state once it lands. Disabled subscriptions do not fetch.
    pub async fn refetch(&self) -> QueryState<T> {
        if self.enabled {
            let in_flight = {
                let mut entries = self.cache.lock();
                entries
                    .get_mut(&self.key)
                    .and_then(|entry| start_fetch(&self.cache, &self.key, entry))
            };
            if let Some(in_flight) = in_flight {
                in_flight.await;
            }
        }
        self.state()
    }

    fn project(&self, snapshot: Snapshot) -> QueryState<T> {
        let data = snapshot.data.and_then(|data| match data.downcast::<T>() {
            Ok(data) => Some(data),
            Err(_) => {
                warn!(key = %self.key, "cached data has a different type than requested");
                None
            }
        });
        QueryState {
            data,
            status: if self.enabled {
                snapshot.status
            } else {
                QueryStatus::Idle
            },
            error: snapshot.error,
            is_fetching: snapshot.is_fetching,
            fetched_at: snapshot.fetched_at,
            failure_count: snapshot.failure_count,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.id);
    }
}

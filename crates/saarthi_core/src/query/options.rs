//! Subscription options, cache configuration and the state a subscriber observes.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::ports::PortError;

/// Lifecycle of a cached query as seen by one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Nothing requested yet, or the subscription is disabled.
    Idle,
    /// First fetch in progress, no data yet.
    Loading,
    Success,
    /// The last fetch failed. Earlier data, if any, is still available.
    Error,
}

/// Per-subscription behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub enabled: bool,
    pub refetch_interval: Option<Duration>,
    pub refetch_in_background: bool,
    pub stale_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
            refetch_in_background: false,
            stale_time: Duration::ZERO,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Poll the key every `interval` while this subscription is alive.
    /// A zero interval means no polling.
    pub fn refetch_every(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    /// Keep polling while the host is not focused.
    pub fn in_background(mut self, background: bool) -> Self {
        self.refetch_in_background = background;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

/// Store-wide settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on any single fetch or mutation.
    pub request_timeout: Duration,
    /// How long an entry without subscribers is kept before `gc` drops it.
    pub retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            retention: Duration::from_secs(300),
        }
    }
}

/// A typed view of one cache entry.
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub error: Option<PortError>,
    pub is_fetching: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Consecutive failed fetches since the last success.
    pub failure_count: u32,
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            fetched_at: self.fetched_at,
            failure_count: self.failure_count,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("data", &self.data)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("is_fetching", &self.is_fetching)
            .field("fetched_at", &self.fetched_at)
            .field("failure_count", &self.failure_count)
            .finish()
    }
}

//! The polling data-cache layer.

pub mod cache;
pub mod key;
pub mod options;

pub use cache::{QueryCache, Subscription};
pub use key::{keys, QueryKey};
pub use options::{CacheConfig, QueryOptions, QueryState, QueryStatus};

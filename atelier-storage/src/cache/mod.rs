//! Cache layer for read-mostly aggregates.
//!
//! [`TtlCache`] memoizes the results of expensive aggregate reads (the full
//! item list, most-used rankings) under caller-chosen string keys. It is an
//! explicitly constructed value shared through `Arc`, never a global.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(TtlCache::new());
//! let names = cache
//!     .get_or_fetch("all_tags", Duration::from_secs(300), || fetch_names(&store))
//!     .await?;
//!
//! // Reads can also report whether they hit
//! let read = cache.read("all_tags", ttl, || fetch_names(&store)).await?;
//! if read.was_cache_miss() {
//!     tracing::debug!("refetched all_tags");
//! }
//! ```

pub mod clock;
pub mod freshness;
pub mod stats;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use freshness::{CacheRead, EntryState};
pub use stats::CacheStats;
pub use ttl::TtlCache;

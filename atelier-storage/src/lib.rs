//! ATELIER Storage - Data Access, Cache and Relationship Sync
//!
//! Defines the data-access abstraction the relationship layer runs on, an
//! in-memory implementation of it, the TTL cache for aggregate reads, and
//! the sync and ranking operations themselves. The PostgreSQL
//! implementation lives in atelier-pg.

pub mod cache;
pub mod data_access;
pub mod mock;
pub mod ranking;
pub mod relationship;

pub use cache::{CacheRead, CacheStats, Clock, EntryState, ManualClock, SystemClock, TtlCache};
pub use data_access::DataAccess;
pub use mock::{MockStore, StoreCall, StoreOp, TableSchema};
pub use ranking::{rank_by_frequency, tally};
pub use relationship::{ItemOutcome, RelationshipSync};

//! ATELIER Core - Relationship Types
//!
//! Identifiers, item and association records, the backend-neutral query
//! vocabulary, relationship configuration and the error taxonomy. All other
//! crates depend on this one. Nothing here performs IO.

mod config;
mod entities;
mod error;
mod filter;
mod identity;
mod naming;
mod query;
mod relationship;

pub use config::*;
pub use entities::*;
pub use error::*;
pub use filter::*;
pub use identity::*;
pub use naming::*;
pub use query::*;
pub use relationship::*;

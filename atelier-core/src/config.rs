//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of a cached aggregate.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of entries returned by a most-used ranking.
pub const DEFAULT_MOST_USED_LIMIT: usize = 5;

/// Default upper bound on item name length, in characters.
pub const DEFAULT_MAX_ITEM_NAME_LEN: usize = 50;

/// Application-level settings for the relationship layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtelierConfig {
    /// How long cached aggregates stay fresh
    pub cache_ttl: Duration,
    /// Limit used when a caller does not supply one
    pub most_used_limit: usize,
    /// Longest accepted item name after trimming
    pub max_item_name_len: usize,
}

impl Default for AtelierConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            most_used_limit: DEFAULT_MOST_USED_LIMIT,
            max_item_name_len: DEFAULT_MAX_ITEM_NAME_LEN,
        }
    }
}

impl AtelierConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ATELIER_CACHE_TTL_SECS`: Cache lifetime in seconds (default: 300)
    /// - `ATELIER_MOST_USED_LIMIT`: Default ranking size (default: 5)
    /// - `ATELIER_MAX_ITEM_NAME_LEN`: Maximum item name length (default: 50)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_ttl: std::env::var("ATELIER_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            most_used_limit: std::env::var("ATELIER_MOST_USED_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.most_used_limit),
            max_item_name_len: std::env::var("ATELIER_MAX_ITEM_NAME_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_item_name_len),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cache_ttl is positive
    /// - most_used_limit > 0
    /// - max_item_name_len > 0
    pub fn validate(&self) -> AtelierResult<()> {
        if self.cache_ttl.is_zero() {
            return Err(AtelierError::Config(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{:?}", self.cache_ttl),
                reason: "cache_ttl must be positive".to_string(),
            }));
        }

        if self.most_used_limit == 0 {
            return Err(AtelierError::Config(ConfigError::InvalidValue {
                field: "most_used_limit".to_string(),
                value: self.most_used_limit.to_string(),
                reason: "most_used_limit must be greater than 0".to_string(),
            }));
        }

        if self.max_item_name_len == 0 {
            return Err(AtelierError::Config(ConfigError::InvalidValue {
                field: "max_item_name_len".to_string(),
                value: self.max_item_name_len.to_string(),
                reason: "max_item_name_len must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

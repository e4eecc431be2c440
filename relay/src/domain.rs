use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Cache namespace of a query or mutation. Two operations with the same id share cached entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Configuration(
                "operation id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, content-addressed key of a cached result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an adapter keeps under a key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: Value, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    /// Without a policy every hit is stale. With one, the entry is fresh while
    /// `now < cached_at + stale_after`.
    pub fn is_stale(&self, stale_after: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(stale_after) = stale_after else {
            return true;
        };

        let deadline = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|window| self.cached_at.checked_add_signed(window));

        match deadline {
            Some(deadline) => deadline <= now,
            // Beyond what chrono can represent: never goes stale
            None => false,
        }
    }
}

/// A hit served by a data source.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedResult {
    pub result: Value,
    pub stale: bool,
}

impl CachedResult {
    pub fn fresh(result: Value) -> Self {
        Self {
            result,
            stale: false,
        }
    }

    pub fn stale(result: Value) -> Self {
        Self {
            result,
            stale: true,
        }
    }
}

/// Settings a [`crate::ports::StoreFactory`] builds adapter instances from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    pub max_entries: Option<u64>,
    pub max_age: Option<Duration>,
}

impl AdapterConfig {
    pub fn new(max_entries: Option<u64>, max_age: Option<Duration>) -> Self {
        Self {
            max_entries,
            max_age,
        }
    }

    /// Build from the environment-level configuration, parsing `max_age`.
    pub fn from_config(config: &shared::config::Config) -> Result<Self> {
        let max_age = config
            .max_age
            .as_deref()
            .map(shared::parse_time)
            .transpose()?;
        Ok(Self::new(config.max_entries, max_age))
    }
}

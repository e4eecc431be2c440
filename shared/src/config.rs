use tracing::warn;

/// Backing store selected for the default cache adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Persistent(String), // data dir
    Void,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: CacheBackend,
    pub cache_enabled: bool,
    pub stale_after: Option<String>,
    pub max_entries: Option<u64>,
    pub max_age: Option<String>,
}

impl Config {
    const DEFAULT_DATA_DIR: &'static str = "./data/relay-cache";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("RELAY_DATA_DIR").unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string());

        let backend = match lookup("RELAY_CACHE_BACKEND").as_deref().map(str::trim) {
            None | Some("memory") => CacheBackend::Memory,
            Some("sled") | Some("persistent") => CacheBackend::Persistent(data_dir),
            Some("void") => CacheBackend::Void,
            Some(other) => {
                warn!("Unknown RELAY_CACHE_BACKEND '{}', falling back to in-memory cache", other);
                CacheBackend::Memory
            }
        };

        let cache_enabled = match lookup("RELAY_CACHE_ENABLED") {
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .unwrap_or_else(|_| {
                    warn!("RELAY_CACHE_ENABLED='{}' is not a boolean, caching stays enabled", raw);
                    true
                }),
            None => true,
        };

        let max_entries = lookup("RELAY_CACHE_MAX_ENTRIES").and_then(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| warn!("Ignoring invalid RELAY_CACHE_MAX_ENTRIES='{}'", raw))
                .ok()
        });

        Self {
            backend,
            cache_enabled,
            stale_after: lookup("RELAY_CACHE_STALE_AFTER").filter(|s| !s.trim().is_empty()),
            max_entries,
            max_age: lookup("RELAY_CACHE_MAX_AGE").filter(|s| !s.trim().is_empty()),
        }
    }
}

impl CacheBackend {
    pub fn is_persistent(&self) -> bool {
        matches!(self, CacheBackend::Persistent(_))
    }

    pub fn data_dir(&self) -> Option<&str> {
        match self {
            CacheBackend::Persistent(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Persistent(_) => "sled",
            CacheBackend::Void => "void",
        }
    }
}

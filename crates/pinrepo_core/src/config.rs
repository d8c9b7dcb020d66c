//! Tunables for the pin service and its connection pool.

use serde::{Deserialize, Serialize};

/// Batch size used by status scans unless configured otherwise.
pub const DEFAULT_STREAM_BATCH_SIZE: usize = 100;

/// Pin service settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinServiceConfig {
    /// Rows fetched per scan batch. `0` means the default.
    pub stream_batch_size: usize,
}

impl Default for PinServiceConfig {
    fn default() -> Self {
        Self {
            stream_batch_size: DEFAULT_STREAM_BATCH_SIZE,
        }
    }
}

impl PinServiceConfig {
    /// Returns a copy with out-of-range values replaced by defaults.
    pub fn normalized(self) -> Self {
        Self {
            stream_batch_size: if self.stream_batch_size == 0 {
                DEFAULT_STREAM_BATCH_SIZE
            } else {
                self.stream_batch_size
            },
        }
    }
}

/// Connections kept by a file-backed pool unless configured otherwise.
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// Checkout wait before a pooled call fails unless configured otherwise.
pub const DEFAULT_POOL_TIMEOUT_MS: u64 = 5_000;

/// Connection pool settings for `open_pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum open connections. `0` means the default.
    pub max_size: u32,
    /// Checkout timeout in milliseconds. `0` means the default.
    pub connection_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            connection_timeout_ms: DEFAULT_POOL_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    /// Returns a copy with zero values replaced by defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            max_size: if self.max_size == 0 {
                defaults.max_size
            } else {
                self.max_size
            },
            connection_timeout_ms: if self.connection_timeout_ms == 0 {
                defaults.connection_timeout_ms
            } else {
                self.connection_timeout_ms
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PinServiceConfig, PoolConfig, DEFAULT_POOL_SIZE, DEFAULT_STREAM_BATCH_SIZE};

    #[test]
    fn missing_fields_use_defaults() {
        let config: PinServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.stream_batch_size, DEFAULT_STREAM_BATCH_SIZE);
    }

    #[test]
    fn zero_batch_size_normalizes_to_default() {
        let config = PinServiceConfig {
            stream_batch_size: 0,
        }
        .normalized();
        assert_eq!(config.stream_batch_size, DEFAULT_STREAM_BATCH_SIZE);
    }

    #[test]
    fn pool_zero_values_normalize_to_defaults() {
        let config = PoolConfig {
            max_size: 0,
            connection_timeout_ms: 250,
        }
        .normalized();
        assert_eq!(config.max_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.connection_timeout_ms, 250);
    }
}

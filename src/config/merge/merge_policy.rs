//! Merge rules: defaults first, every later source overrides key by key.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("client.url", crate::config::DEFAULT_URL)?
        .set_default("client.cache_policy", "cache-first")?
        .set_default("client.dedup", true)?
        .set_default("transport.connect_timeout_ms", 10_000_u64)?
        .set_default("transport.request_timeout_ms", 30_000_u64)?
        .set_default("transport.no_proxy", false)?
        .set_default("batch.enabled", false)?
        .set_default("batch.max_operation_count", 10_u64)?
        .set_default("batch.window_ms", 10_u64)?
        .set_default("cache.enabled", true)
}

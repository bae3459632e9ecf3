//! Configuration module for the vitrine server.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, pool size, acquire timeout)
//! - Response cache settings (TTL, capacity, sweep interval)
//! - Startup data seeding

mod app;
mod validation;

pub use app::{AppConfig, CacheConfig, DatabaseConfig, SeedConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL, DEFAULT_DATABASE_URL,
    DEFAULT_POOL_SIZE, DEFAULT_SWEEP_INTERVAL,
};

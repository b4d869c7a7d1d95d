use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Injectable wall clock (§9 "Builders vs configs"). Production uses
/// [`SystemClock`]; tests substitute a fixed or stepped clock for
/// determinism.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// The engine's four configuration knobs (§9). Everything else is
/// determined by the data, not a tunable.
#[derive(Clone)]
pub struct EngineConfig {
	pub lease_ttl_seconds: u64,
	pub max_conflict_retries: u32,
	pub clock: Arc<dyn Clock>,
}

impl EngineConfig {
	pub fn lease_ttl(&self) -> Duration {
		Duration::from_secs(self.lease_ttl_seconds)
	}
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self { lease_ttl_seconds: 90, max_conflict_retries: 1, clock: Arc::new(SystemClock) }
	}
}

impl std::fmt::Debug for EngineConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EngineConfig")
			.field("lease_ttl_seconds", &self.lease_ttl_seconds)
			.field("max_conflict_retries", &self.max_conflict_retries)
			.finish()
	}
}

/// Layered environment configuration for `turn-service` (defaults →
/// environment → explicit overrides), following the pools/config
/// convention of the reference backend (SPEC_FULL §2.1). Plain data, no
/// global singleton.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoreConfig {
	pub database_url: String,
	#[serde(default = "default_min_connections")]
	pub min_connections: u32,
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
	#[serde(default = "default_acquire_timeout_secs")]
	pub acquire_timeout_secs: u64,
}

fn default_min_connections() -> u32 {
	1
}

fn default_max_connections() -> u32 {
	10
}

fn default_acquire_timeout_secs() -> u64 {
	10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	Missing(String),
	#[error("invalid value for environment variable {0}")]
	Invalid(String),
}

impl StoreConfig {
	/// Layer environment variables under the `TURN_` prefix on top of the
	/// field defaults above. `TURN_DATABASE_URL` is the only one without a
	/// default.
	pub fn from_env() -> Result<Self, ConfigError> {
		let database_url = std::env::var("TURN_DATABASE_URL")
			.map_err(|_| ConfigError::Missing("TURN_DATABASE_URL".to_string()))?;
		Ok(Self {
			database_url,
			min_connections: env_or_default("TURN_MIN_CONNECTIONS", default_min_connections())?,
			max_connections: env_or_default("TURN_MAX_CONNECTIONS", default_max_connections())?,
			acquire_timeout_secs: env_or_default(
				"TURN_ACQUIRE_TIMEOUT_SECS",
				default_acquire_timeout_secs(),
			)?,
		})
	}

	pub fn acquire_timeout(&self) -> Duration {
		Duration::from_secs(self.acquire_timeout_secs)
	}
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
	match std::env::var(key) {
		Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key.to_string())),
		Err(_) => Ok(default),
	}
}

// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{env, net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail};
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use parcel_orders::{
	CacheConfig, StoreTimeouts,
	cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS},
	store::{DEFAULT_LOAD_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS},
};
use serde::{Deserialize, Serialize};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "gateway";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Configuration sources
/// Prefix of every configuration environment variable (e.g. `PARCEL_DATABASE_URL`)
pub const ENV_PREFIX: &str = "PARCEL";

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "PARCEL_CONFIG_FILE";

// Server configuration constants
/// Default HTTP server bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";

/// Default grace period for in-flight HTTP requests on shutdown (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default maximum HTTP request body size in bytes
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

// Store configuration constants
/// Default size of the PostgreSQL connection pool
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default number of recent orders loaded into the cache at startup
pub const DEFAULT_CACHE_RESTORE_LIMIT: usize = 10_000;

// Ingestion configuration constants
/// Default capacity of the ingestion queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_024;

/// Default delay before an unacknowledged message is delivered again (milliseconds)
pub const DEFAULT_REDELIVERY_DELAY_MS: u64 = 1_000;

/// Where orders are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
	/// PostgreSQL at `database_url` (required)
	Postgres,
	/// Process memory; orders are lost on restart. Development only.
	Memory,
}

/// Gateway service configuration
///
/// Keys are flat so each maps onto one `PARCEL_*` environment variable,
/// e.g. `cache_ttl_secs` is set with `PARCEL_CACHE_TTL_SECS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// HTTP server bind address
	pub bind_addr: String,
	pub shutdown_grace_secs: u64,
	pub max_body_bytes: usize,
	pub store_backend: StoreBackend,
	/// PostgreSQL connection URL, required by the `postgres` backend
	pub database_url: Option<String>,
	pub db_max_connections: u32,
	pub cache_capacity: u64,
	pub cache_ttl_secs: u64,
	pub cache_restore_limit: usize,
	pub queue_capacity: usize,
	pub redelivery_delay_ms: u64,
	pub store_read_timeout_ms: u64,
	pub store_write_timeout_ms: u64,
	pub store_load_timeout_ms: u64,
}

impl GatewayConfig {
	/// Load configuration from defaults, an optional file and the environment
	///
	/// Later sources override earlier ones. The file is named by
	/// `PARCEL_CONFIG_FILE`; `.env` is loaded first if present.
	pub fn load() -> Result<Self> {
		dotenv::dotenv().ok();

		let mut builder = Self::defaults()?;
		if let Ok(path) = env::var(CONFIG_FILE_ENV) {
			builder = builder.add_source(File::with_name(&path));
		}
		builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

		let config = builder
			.build()
			.context("Failed to read gateway configuration")?
			.try_deserialize::<Self>()
			.context("Invalid gateway configuration")?;

		config.bind_addr()?;
		config.validate_store()?;
		Ok(config)
	}

	/// The `postgres` backend cannot run without a database URL
	pub fn validate_store(&self) -> Result<()> {
		match (self.store_backend, self.database_url.as_deref()) {
			(StoreBackend::Postgres, None | Some("")) => bail!(
				"PARCEL_DATABASE_URL is required (set PARCEL_STORE_BACKEND=memory to run without a database)"
			),
			_ => Ok(()),
		}
	}

	/// Configuration builder seeded with every default
	pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
		Config::builder()
			.set_default("bind_addr", DEFAULT_BIND_ADDR)?
			.set_default("shutdown_grace_secs", DEFAULT_SHUTDOWN_GRACE_SECS)?
			.set_default("store_backend", "postgres")?
			.set_default("max_body_bytes", DEFAULT_MAX_BODY_BYTES as u64)?
			.set_default("db_max_connections", u64::from(DEFAULT_DB_MAX_CONNECTIONS))?
			.set_default("cache_capacity", DEFAULT_CACHE_CAPACITY)?
			.set_default("cache_ttl_secs", DEFAULT_CACHE_TTL_SECS)?
			.set_default("cache_restore_limit", DEFAULT_CACHE_RESTORE_LIMIT as u64)?
			.set_default("queue_capacity", DEFAULT_QUEUE_CAPACITY as u64)?
			.set_default("redelivery_delay_ms", DEFAULT_REDELIVERY_DELAY_MS)?
			.set_default("store_read_timeout_ms", DEFAULT_READ_TIMEOUT_MS)?
			.set_default("store_write_timeout_ms", DEFAULT_WRITE_TIMEOUT_MS)?
			.set_default("store_load_timeout_ms", DEFAULT_LOAD_TIMEOUT_MS)
	}

	pub fn bind_addr(&self) -> Result<SocketAddr> {
		self.bind_addr
			.parse()
			.with_context(|| format!("Invalid bind address: {}", self.bind_addr))
	}

	pub fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.shutdown_grace_secs)
	}

	pub fn redelivery_delay(&self) -> Duration {
		Duration::from_millis(self.redelivery_delay_ms)
	}

	pub fn cache_config(&self) -> CacheConfig {
		CacheConfig {
			capacity: self.cache_capacity,
			ttl: Duration::from_secs(self.cache_ttl_secs),
		}
	}

	pub fn store_timeouts(&self) -> StoreTimeouts {
		StoreTimeouts {
			read: Duration::from_millis(self.store_read_timeout_ms),
			write: Duration::from_millis(self.store_write_timeout_ms),
			load: Duration::from_millis(self.store_load_timeout_ms),
		}
	}
}

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

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result, bail};
use parcel_orders::{
	Ingestor, LruOrderCache, MemoryOrderStore, MessageProducer, MessageQueue, OrderService,
	OrderStore, PostgresOrderStore,
};
use tracing::{info, warn};

use crate::{
	config::{GatewayConfig, StoreBackend},
	routes::configure_routes,
};

/// Order Service as wired in the gateway
pub type GatewayOrderService = OrderService<Arc<dyn OrderStore>, LruOrderCache>;

/// Shared state handed to every HTTP worker
#[derive(Clone)]
pub struct GatewayState {
	pub service: Arc<GatewayOrderService>,
	pub producer: MessageProducer,
}

/// Gateway server
///
/// Owns the running ingestion loop and the state the HTTP surface serves
/// from. Startup order: store, schema, cache, warm-up, ingestion, HTTP.
pub struct GatewayServer {
	config: GatewayConfig,
	state: GatewayState,
	ingestor: Ingestor,
}

impl GatewayServer {
	/// Build every collaborator and start ingestion
	///
	/// Any failure here, including the cache warm-up, aborts startup.
	pub async fn bootstrap(config: GatewayConfig) -> Result<Self> {
		let store = Self::open_store(&config).await?;

		let cache = LruOrderCache::new(&config.cache_config());
		let service = Arc::new(OrderService::new(store, cache, config.store_timeouts()));

		let loaded = service
			.init_cache(config.cache_restore_limit)
			.await
			.context("Failed to warm order cache")?;
		info!(target: "server", loaded, "Order cache restored");

		let (producer, source) =
			MessageQueue::new(config.queue_capacity, config.redelivery_delay()).split();
		let ingestor = Ingestor::start(source, service.clone());

		Ok(Self {
			config,
			state: GatewayState { service, producer },
			ingestor,
		})
	}

	async fn open_store(config: &GatewayConfig) -> Result<Arc<dyn OrderStore>> {
		config.validate_store()?;

		let url = match (config.store_backend, config.database_url.as_deref()) {
			(StoreBackend::Memory, _) => {
				warn!(
					target: "server",
					"Memory store selected, orders are lost on restart"
				);
				return Ok(Arc::new(MemoryOrderStore::new()));
			}
			(StoreBackend::Postgres, Some(url)) => url,
			(StoreBackend::Postgres, None) => bail!("PARCEL_DATABASE_URL is required"),
		};

		let store = PostgresOrderStore::connect(url, config.db_max_connections)
			.await
			.context("Failed to connect to order store")?;
		store
			.ensure_schema()
			.await
			.context("Failed to prepare order store schema")?;

		Ok(Arc::new(store))
	}

	/// Serve HTTP until a termination signal, then stop ingestion
	///
	/// actix handles SIGINT/SIGTERM itself and gives in-flight requests the
	/// configured grace period before the server future resolves.
	pub async fn serve(self) -> Result<()> {
		let addr = self.config.bind_addr()?;
		let max_body_bytes = self.config.max_body_bytes;
		let state = web::Data::new(self.state);

		let server = HttpServer::new(move || {
			App::new()
				.app_data(state.clone())
				.app_data(web::PayloadConfig::new(max_body_bytes))
				.configure(configure_routes)
		})
		.shutdown_timeout(self.config.shutdown_grace().as_secs())
		.bind(addr)
		.with_context(|| format!("Failed to bind {}", addr))?
		.run();

		info!(target: "server", "Parcel gateway listening on {}", addr);
		server.await.context("HTTP server failed")?;

		info!(target: "server", "HTTP server stopped, stopping ingestion");
		let stats = self
			.ingestor
			.shutdown()
			.await
			.context("Ingestion task failed")?;
		info!(
			target: "server",
			received = stats.received,
			ingested = stats.ingested,
			dropped_malformed = stats.dropped_malformed,
			rejected = stats.rejected,
			deferred = stats.deferred,
			"Gateway stopped"
		);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn load_config(store_backend: &str) -> GatewayConfig {
		GatewayConfig::defaults()
			.unwrap()
			.set_override("store_backend", store_backend)
			.unwrap()
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap()
	}

	#[actix_rt::test]
	async fn test_bootstrap_without_database_url_fails() {
		let result = GatewayServer::bootstrap(load_config("postgres")).await;

		let err = result.err().unwrap();
		assert!(format!("{:#}", err).contains("PARCEL_DATABASE_URL"));
	}

	#[actix_rt::test]
	async fn test_bootstrap_with_memory_store() {
		let server = GatewayServer::bootstrap(load_config("memory")).await.unwrap();

		assert!(!server.ingestor.is_finished());
		let stats = server.ingestor.shutdown().await.unwrap();
		assert_eq!(stats.received, 0);
	}
}

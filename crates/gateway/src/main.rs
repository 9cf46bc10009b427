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

//! Parcel Gateway Service
//!
//! This service runs the order ingestion pipeline and serves order lookups
//! over HTTP.
//!
//! - Restores the most recent orders into the cache at startup
//! - Consumes order payloads from the ingestion queue, persisting each one
//!   before acknowledging it
//! - Answers `GET /order/{order_uid}` from the cache, falling back to the store
//! - Accepts raw order payloads on `POST /api/v1/orders`

mod config;
mod handlers;
mod logging;
mod routes;
mod server;

use anyhow::{Context, Result};
use tracing::info;

use crate::{config::GatewayConfig, logging::init_logging};
use server::GatewayServer;

#[actix_rt::main]
async fn main() -> Result<()> {
	// Initialize logging first
	init_logging()?;

	let config = GatewayConfig::load()?;
	info!(target: "server", "Starting Parcel gateway on {}", config.bind_addr);

	let server = GatewayServer::bootstrap(config)
		.await
		.context("Failed to start gateway")?;

	info!(target: "server", "Gateway server initialized");

	server.serve().await
}

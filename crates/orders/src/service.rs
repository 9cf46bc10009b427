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

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
	cache::OrderCache,
	store::{OrderStore, StoreError, StoreTimeouts},
	types::Order,
	validation::{OrderValidator, ValidationError},
};

/// Errors returned by `OrderService::ingest`
#[derive(Debug, Error)]
pub enum ServiceError {
	#[error("Order rejected: {0}")]
	Validation(#[from] ValidationError),
	#[error("Order not persisted: {0}")]
	Store(#[from] StoreError),
}

impl ServiceError {
	/// Whether redelivering the same message could succeed
	///
	/// Validation is deterministic, so a rejected order is rejected again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ServiceError::Store(_))
	}
}

/// Order Service - the write-through ingest path and cache-aside read path
///
/// Ingest journey:
/// `Received -> Validated -> Persisted -> Cached`, or
/// `Received -> Rejected` (validation), or
/// `Received -> Validated -> PersistFailed` (left for redelivery).
///
/// The cache only ever holds copies that were committed to the store, so a
/// cache hit is never ahead of durable state.
pub struct OrderService<S, C> {
	validator: OrderValidator,
	store: S,
	cache: C,
	timeouts: StoreTimeouts,
}

impl<S, C> OrderService<S, C>
where
	S: OrderStore,
	C: OrderCache,
{
	pub fn new(store: S, cache: C, timeouts: StoreTimeouts) -> Self {
		Self {
			validator: OrderValidator::new(),
			store,
			cache,
			timeouts,
		}
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn cache(&self) -> &C {
		&self.cache
	}

	/// Validate, persist and cache one order
	///
	/// A rejected order touches neither the store nor the cache. A store
	/// failure leaves the cache untouched.
	pub async fn ingest(&self, order: Order) -> Result<(), ServiceError> {
		if let Err(e) = self.validator.validate(&order) {
			warn!(
				target: "order_service",
				order_uid = %order.order_uid,
				error = %e,
				"Order rejected"
			);
			return Err(e.into());
		}

		if let Err(e) = self.store.upsert_order(&order, self.timeouts.write).await {
			error!(
				target: "order_service",
				order_uid = %order.order_uid,
				error = %e,
				"Failed to persist order"
			);
			return Err(e.into());
		}

		info!(
			target: "order_service",
			order_uid = %order.order_uid,
			items = order.items.len(),
			"Order ingested"
		);
		self.cache.set(Arc::new(order));
		Ok(())
	}

	/// Look up an order, cache first
	///
	/// A miss falls through to the store; a found order is cached before it
	/// is returned. An unknown id is `Ok(None)`.
	pub async fn get(&self, order_uid: &str) -> Result<Option<Arc<Order>>, StoreError> {
		if let Some(order) = self.cache.get(order_uid) {
			debug!(target: "order_service", order_uid, "Cache hit");
			return Ok(Some(order));
		}

		debug!(target: "order_service", order_uid, "Cache miss");
		match self.store.get_by_id(order_uid, self.timeouts.read).await? {
			Some(order) => {
				let order = Arc::new(order);
				self.cache.set(order.clone());
				Ok(Some(order))
			}
			None => Ok(None),
		}
	}

	/// Warm the cache with the most recent orders
	///
	/// Returns the number of orders loaded. A failure is returned unchanged
	/// so startup can abort.
	pub async fn init_cache(&self, limit: usize) -> Result<usize, StoreError> {
		let orders = self.store.load_recent(limit, self.timeouts.load).await?;
		let loaded = orders.len();
		self.cache.bulk_set(orders);

		info!(target: "order_service", loaded, limit, "Cache warmed from store");
		Ok(loaded)
	}
}

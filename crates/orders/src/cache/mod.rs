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

mod lru;

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::types::Order;
pub use lru::LruOrderCache;

/// Default maximum number of cached orders
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-live of a cached order in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;

/// Cache sizing, fixed for the lifetime of a cache instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
	/// Maximum number of entries
	pub capacity: u64,
	/// Age after insertion at which an entry stops being served
	pub ttl: Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_CACHE_CAPACITY,
			ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
		}
	}
}

/// Order Cache trait - the fast path in front of the Order Store
///
/// The cache maps `order_uid` to the last successfully persisted copy of an
/// order. It is bounded and time-limited: entries disappear either through
/// capacity pressure (least recently used first) or once they are older than
/// the configured TTL.
///
/// Key semantic constraints:
/// - `get` on an expired entry reports a miss
/// - `set` replaces any existing entry and restarts its TTL clock
/// - Implementations synchronize internally; callers never lock
///
/// The trait exists so that the service can be exercised against test
/// doubles as well as the production LRU cache.
pub trait OrderCache: Send + Sync {
	/// Look up an order, refreshing its recency on a hit
	fn get(&self, order_uid: &str) -> Option<Arc<Order>>;

	/// Insert or replace the entry for `order.order_uid`
	fn set(&self, order: Arc<Order>);

	/// Insert many orders in sequence
	///
	/// Used for the one-time warm start; no atomicity across the batch.
	fn bulk_set(&self, orders: Vec<Order>) {
		for order in orders {
			self.set(Arc::new(order));
		}
	}
}

impl<T: OrderCache + ?Sized> OrderCache for Arc<T> {
	fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
		(**self).get(order_uid)
	}

	fn set(&self, order: Arc<Order>) {
		(**self).set(order)
	}

	fn bulk_set(&self, orders: Vec<Order>) {
		(**self).bulk_set(orders)
	}
}

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

use moka::{policy::EvictionPolicy, sync::Cache};
use tracing::debug;

use super::{CacheConfig, OrderCache};
use crate::types::Order;

/// Bounded LRU + TTL order cache
///
/// This implementation uses `moka::sync::Cache` to provide:
/// - **Bounded memory**: order ids are never reused, so an unbounded map
///   would grow forever; `max_capacity` caps the entry count
/// - **LRU eviction**: the least recently read or written entry goes first
/// - **Native TTL**: entries expire a fixed time after insertion
/// - **Internal synchronization**: safe to share between the ingestion
///   task and concurrent HTTP handlers
///
/// moka applies recency updates and evictions in batched maintenance passes.
/// Expired entries are never returned, but the entry count may briefly exceed
/// the capacity until the next pass; `run_pending_tasks` forces one.
#[derive(Clone)]
pub struct LruOrderCache {
	cache: Cache<String, Arc<Order>>,
}

impl LruOrderCache {
	pub fn new(config: &CacheConfig) -> Self {
		let cache = Cache::builder()
			.max_capacity(config.capacity)
			.time_to_live(config.ttl)
			.eviction_policy(EvictionPolicy::lru())
			.build();

		debug!(
			target: "cache",
			capacity = config.capacity,
			ttl_secs = config.ttl.as_secs(),
			"Order cache created"
		);

		Self { cache }
	}

	/// Approximate number of live entries
	pub fn entry_count(&self) -> u64 {
		self.cache.entry_count()
	}

	/// Apply pending recency updates, evictions and expirations now
	pub fn run_pending_tasks(&self) {
		self.cache.run_pending_tasks();
	}
}

impl OrderCache for LruOrderCache {
	fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
		self.cache.get(order_uid)
	}

	fn set(&self, order: Arc<Order>) {
		self.cache.insert(order.order_uid.clone(), order);
	}
}

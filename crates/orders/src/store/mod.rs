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

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Order;
pub use memory::MemoryOrderStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOrderStore;

/// Default deadline for point reads (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 3_000;

/// Default deadline for transactional upserts (milliseconds)
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Default deadline for the startup bulk load (milliseconds)
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

/// Stages of the transactional upsert, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertStep {
	Begin,
	Header,
	Delivery,
	Payment,
	DeleteItems,
	InsertItems,
	Commit,
}

impl fmt::Display for UpsertStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			UpsertStep::Begin => "begin",
			UpsertStep::Header => "order header",
			UpsertStep::Delivery => "delivery",
			UpsertStep::Payment => "payment",
			UpsertStep::DeleteItems => "item delete",
			UpsertStep::InsertItems => "item insert",
			UpsertStep::Commit => "commit",
		};
		f.write_str(name)
	}
}

/// Error types for Order Store operations
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("{operation} did not complete within {deadline:?}")]
	DeadlineExceeded {
		operation: &'static str,
		deadline: Duration,
	},
	#[error("Failed to write order ({step}): {message}")]
	WriteFailed { step: UpsertStep, message: String },
	#[error("Failed to read orders: {0}")]
	ReadFailed(String),
	#[error("Stored order is corrupted: {0}")]
	Corrupted(String),
	#[error("Order store unavailable: {0}")]
	Unavailable(String),
}

impl StoreError {
	pub fn is_deadline_exceeded(&self) -> bool {
		matches!(self, StoreError::DeadlineExceeded { .. })
	}
}

/// Per-operation deadlines applied by the Order Service
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreTimeouts {
	pub read: Duration,
	pub write: Duration,
	pub load: Duration,
}

impl Default for StoreTimeouts {
	fn default() -> Self {
		Self {
			read: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
			write: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
			load: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
		}
	}
}

/// Order Store trait - durable home of every accepted order
///
/// One order is stored as a multi-relation unit: an order header row that
/// also carries the full serialized order, a delivery row, a payment row and
/// one row per item. The serialized copy is the read source of truth; the
/// relational rows exist for queryability.
///
/// Key semantic constraints:
/// - `upsert_order` is atomic: all rows land or none do
/// - Items are replaced wholesale on every upsert, never patched
/// - A missing order is `Ok(None)`, not an error
/// - Every call is bounded by the given deadline and fails with
///   `StoreError::DeadlineExceeded` once it elapses
///
/// Concurrent upserts of the same order race at the store level; the last
/// commit wins.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Insert or fully replace an order in one transaction
	async fn upsert_order(&self, order: &Order, deadline: Duration) -> Result<(), StoreError>;

	/// Fetch one order by identifier
	async fn get_by_id(
		&self,
		order_uid: &str,
		deadline: Duration,
	) -> Result<Option<Order>, StoreError>;

	/// Load at most `limit` orders, most recently created first
	async fn load_recent(&self, limit: usize, deadline: Duration)
	-> Result<Vec<Order>, StoreError>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
	async fn upsert_order(&self, order: &Order, deadline: Duration) -> Result<(), StoreError> {
		(**self).upsert_order(order, deadline).await
	}

	async fn get_by_id(
		&self,
		order_uid: &str,
		deadline: Duration,
	) -> Result<Option<Order>, StoreError> {
		(**self).get_by_id(order_uid, deadline).await
	}

	async fn load_recent(
		&self,
		limit: usize,
		deadline: Duration,
	) -> Result<Vec<Order>, StoreError> {
		(**self).load_recent(limit, deadline).await
	}
}

/// Run a store operation under a deadline
///
/// Dropping a sqlx transaction on expiry queues its rollback, so a timed-out
/// upsert still ends in a rollback on the server side.
pub(crate) async fn with_deadline<T, F>(
	operation: &'static str,
	deadline: Duration,
	fut: F,
) -> Result<T, StoreError>
where
	F: Future<Output = Result<T, StoreError>>,
{
	match tokio::time::timeout(deadline, fut).await {
		Ok(result) => result,
		Err(_) => Err(StoreError::DeadlineExceeded {
			operation,
			deadline,
		}),
	}
}

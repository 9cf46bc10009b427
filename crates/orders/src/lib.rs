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

//! Parcel Orders
//!
//! This crate provides the ingestion-and-lookup core of the Parcel order
//! service. Orders arrive as JSON messages from an at-least-once stream, are
//! validated, persisted atomically across several relations, and served back
//! through a bounded in-memory cache.
//!
//! Architecture:
//! - Stateless validator guarding everything that reaches the store
//! - Order Store port with in-memory and PostgreSQL backends
//! - LRU + TTL order cache (cache-aside reads, write-through ingestion)
//! - Single-consumer ingestion loop with ack-on-success semantics
//! - In-process message queue with redelivery of unacknowledged messages

pub mod cache;
pub mod ingest;
pub mod service;
pub mod store;
pub mod types;
pub mod validation;

pub use cache::{CacheConfig, LruOrderCache, OrderCache};
pub use ingest::{
	IngestLoop, IngestStats, Ingestor, Message, MessageProducer, MessageQueue, MessageSource,
	QueueError, QueueSource, SourceError,
};
pub use service::{OrderService, ServiceError};
#[cfg(feature = "postgres")]
pub use store::PostgresOrderStore;
pub use store::{MemoryOrderStore, OrderStore, StoreError, StoreTimeouts, UpsertStep};
pub use types::*;
pub use validation::{OrderValidator, ValidationError};

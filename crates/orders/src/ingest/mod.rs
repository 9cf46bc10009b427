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

//! Message ingestion
//!
//! The ingestion loop is the single consumer of an at-least-once message
//! stream. It takes one message at a time, decodes it into an `Order` and
//! hands it to the Order Service. A message is acknowledged once it has been
//! fully handled, which for a decodable, valid order means persisted.
//!
//! Acknowledgement rules:
//! - Malformed payload: dropped and acknowledged
//! - Order fails validation: dropped and acknowledged
//! - Store failure: left unacknowledged so the source redelivers it
//! - Success: acknowledged

mod queue;

use std::{panic, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
	sync::watch,
	task::{JoinError, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::{cache::OrderCache, service::OrderService, store::OrderStore, types::Order};
pub use queue::{MessageProducer, MessageQueue, QueueError, QueueSource};

/// Pause after a failed receive before asking the source again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// One message delivered by a `MessageSource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	/// Position in the stream; stable across redeliveries
	pub offset: u64,
	/// Raw JSON order payload
	pub payload: Vec<u8>,
	/// Delivery attempt, starting at 1
	pub attempt: u32,
}

/// Errors reported by a `MessageSource`
#[derive(Debug, Error)]
pub enum SourceError {
	/// The stream has ended; no further messages will arrive
	#[error("Message source closed")]
	Closed,
	#[error("Failed to receive message: {0}")]
	Receive(String),
	#[error("Failed to acknowledge message: {0}")]
	Acknowledge(String),
}

/// Message Source trait - at-least-once delivery of order payloads
///
/// `receive` suspends until a message is available. A message that is
/// received but never acknowledged is delivered again later.
#[async_trait]
pub trait MessageSource: Send {
	/// Wait for the next message
	async fn receive(&mut self) -> Result<Message, SourceError>;

	/// Mark a message as fully handled
	async fn acknowledge(&mut self, message: &Message) -> Result<(), SourceError>;
}

/// Counters accumulated by one run of the ingestion loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
	/// Messages taken from the source (redeliveries included)
	pub received: u64,
	/// Orders persisted and cached
	pub ingested: u64,
	/// Payloads that were not a decodable order
	pub dropped_malformed: u64,
	/// Orders that failed validation
	pub rejected: u64,
	/// Messages left unacknowledged after a store failure
	pub deferred: u64,
	pub ack_failures: u64,
}

/// Ingestion Loop - drives one `MessageSource` into the Order Service
pub struct IngestLoop<M, S, C> {
	source: M,
	service: Arc<OrderService<S, C>>,
	stats: IngestStats,
}

impl<M, S, C> IngestLoop<M, S, C>
where
	M: MessageSource,
	S: OrderStore,
	C: OrderCache,
{
	pub fn new(source: M, service: Arc<OrderService<S, C>>) -> Self {
		Self {
			source,
			service,
			stats: IngestStats::default(),
		}
	}

	/// Run until the source closes or `shutdown` flips to `true`
	///
	/// The shutdown signal is only observed between messages: once a message
	/// has been received it is processed to completion.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> IngestStats {
		info!(target: "ingest", "Ingestion loop started");

		loop {
			if *shutdown.borrow() {
				break;
			}

			let received = tokio::select! {
				biased;
				_ = shutdown.changed() => break,
				received = self.source.receive() => received,
			};

			match received {
				Ok(message) => self.process(message).await,
				Err(SourceError::Closed) => {
					info!(target: "ingest", "Message source closed");
					break;
				}
				Err(e) => {
					warn!(target: "ingest", error = %e, "Failed to receive message");
					tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
				}
			}
		}

		info!(
			target: "ingest",
			received = self.stats.received,
			ingested = self.stats.ingested,
			dropped_malformed = self.stats.dropped_malformed,
			rejected = self.stats.rejected,
			deferred = self.stats.deferred,
			"Ingestion loop stopped"
		);
		self.stats
	}

	async fn process(&mut self, message: Message) {
		self.stats.received += 1;
		debug!(
			target: "ingest",
			offset = message.offset,
			attempt = message.attempt,
			bytes = message.payload.len(),
			"Message received"
		);

		let order = match Order::from_raw_json(&message.payload) {
			Ok(order) => order,
			Err(e) => {
				warn!(
					target: "ingest",
					offset = message.offset,
					error = %e,
					"Dropping malformed message"
				);
				self.stats.dropped_malformed += 1;
				self.acknowledge(&message).await;
				return;
			}
		};

		match self.service.ingest(order).await {
			Ok(()) => {
				self.stats.ingested += 1;
				self.acknowledge(&message).await;
			}
			Err(e) if e.is_retryable() => {
				warn!(
					target: "ingest",
					offset = message.offset,
					attempt = message.attempt,
					error = %e,
					"Message left for redelivery"
				);
				self.stats.deferred += 1;
			}
			Err(e) => {
				warn!(
					target: "ingest",
					offset = message.offset,
					error = %e,
					"Dropping invalid order"
				);
				self.stats.rejected += 1;
				self.acknowledge(&message).await;
			}
		}
	}

	async fn acknowledge(&mut self, message: &Message) {
		if let Err(e) = self.source.acknowledge(message).await {
			error!(
				target: "ingest",
				offset = message.offset,
				error = %e,
				"Failed to acknowledge message"
			);
			self.stats.ack_failures += 1;
		}
	}
}

/// Ingestor - runs an `IngestLoop` on a tokio task
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub struct Ingestor {
	task: JoinHandle<IngestStats>,
	shutdown: watch::Sender<bool>,
}

impl Ingestor {
	/// Spawn the ingestion loop for `source`
	pub fn start<M, S, C>(source: M, service: Arc<OrderService<S, C>>) -> Self
	where
		M: MessageSource + 'static,
		S: OrderStore + 'static,
		C: OrderCache + 'static,
	{
		let (shutdown, shutdown_rx) = watch::channel(false);
		let ingest_loop = IngestLoop::new(source, service);
		let task = tokio::spawn(ingest_loop.run(shutdown_rx));

		Self { task, shutdown }
	}

	/// Whether the loop has already returned (for example, source closed)
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Signal the loop to stop and wait for it
	///
	/// A message in flight when the signal arrives is processed first. A
	/// panic inside the loop is resumed on the caller.
	pub async fn shutdown(self) -> Result<IngestStats, JoinError> {
		// The loop may already be gone, in which case nobody is listening.
		let _ = self.shutdown.send(true);

		match self.task.await {
			Ok(stats) => Ok(stats),
			Err(e) if e.is_panic() => {
				error!(target: "ingest", "Ingestion task panicked");
				panic::resume_unwind(e.into_panic())
			}
			Err(e) => {
				error!(target: "ingest", error = %e, "Ingestion task failed");
				Err(e)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		collections::VecDeque,
		sync::{Arc, Mutex},
	};

	use super::*;
	use crate::{
		cache::{CacheConfig, LruOrderCache},
		store::{MemoryOrderStore, StoreTimeouts, UpsertStep},
		types::Item,
	};

	/// Source that replays a fixed script, then reports `Closed`
	struct ScriptedSource {
		script: VecDeque<Result<Message, SourceError>>,
		acked: Arc<Mutex<Vec<u64>>>,
	}

	#[async_trait]
	impl MessageSource for ScriptedSource {
		async fn receive(&mut self) -> Result<Message, SourceError> {
			self.script.pop_front().unwrap_or(Err(SourceError::Closed))
		}

		async fn acknowledge(&mut self, message: &Message) -> Result<(), SourceError> {
			self.acked.lock().unwrap().push(message.offset);
			Ok(())
		}
	}

	type TestService = OrderService<Arc<MemoryOrderStore>, LruOrderCache>;

	fn create_service() -> (Arc<TestService>, Arc<MemoryOrderStore>) {
		let store = Arc::new(MemoryOrderStore::new());
		let cache = LruOrderCache::new(&CacheConfig::default());
		let service = OrderService::new(store.clone(), cache, StoreTimeouts::default());
		(Arc::new(service), store)
	}

	fn order_message(offset: u64, order_uid: &str) -> Message {
		let order = Order {
			order_uid: order_uid.to_string(),
			track_number: "WBILMTESTTRACK".to_string(),
			items: vec![Item {
				chrt_id: 9934930,
				..Default::default()
			}],
			..Default::default()
		};
		Message {
			offset,
			payload: order.to_raw_json().unwrap(),
			attempt: 1,
		}
	}

	fn raw_message(offset: u64, payload: &[u8]) -> Message {
		Message {
			offset,
			payload: payload.to_vec(),
			attempt: 1,
		}
	}

	async fn run_script(
		script: Vec<Result<Message, SourceError>>,
		service: Arc<TestService>,
	) -> (IngestStats, Vec<u64>) {
		let acked = Arc::new(Mutex::new(Vec::new()));
		let source = ScriptedSource {
			script: script.into(),
			acked: acked.clone(),
		};
		let (_shutdown, shutdown_rx) = watch::channel(false);

		let stats = IngestLoop::new(source, service).run(shutdown_rx).await;
		let acked = acked.lock().unwrap().clone();
		(stats, acked)
	}

	#[tokio::test]
	async fn test_valid_message_is_ingested_and_acknowledged() {
		let (service, store) = create_service();

		let (stats, acked) = run_script(vec![Ok(order_message(0, "order_1"))], service).await;

		assert_eq!(stats.received, 1);
		assert_eq!(stats.ingested, 1);
		assert_eq!(acked, vec![0]);
		assert_eq!(store.order_count(), 1);
	}

	#[tokio::test]
	async fn test_malformed_payload_is_acknowledged_without_ingest() {
		let (service, store) = create_service();

		let (stats, acked) =
			run_script(vec![Ok(raw_message(0, b"{not json"))], service).await;

		assert_eq!(stats.dropped_malformed, 1);
		assert_eq!(stats.ingested, 0);
		assert_eq!(acked, vec![0]);
		assert_eq!(store.upserts(), 0);
	}

	#[tokio::test]
	async fn test_invalid_order_is_acknowledged_and_dropped() {
		let (service, store) = create_service();
		let payload = br#"{"order_uid":"order_1","track_number":"T","items":[]}"#;

		let (stats, acked) = run_script(vec![Ok(raw_message(3, payload))], service).await;

		assert_eq!(stats.rejected, 1);
		assert_eq!(acked, vec![3]);
		assert_eq!(store.upserts(), 0);
	}

	#[tokio::test]
	async fn test_store_failure_is_not_acknowledged() {
		let (service, store) = create_service();
		store.fail_at(UpsertStep::InsertItems);

		let (stats, acked) = run_script(
			vec![Ok(order_message(0, "order_1")), Ok(order_message(1, "order_2"))],
			service,
		)
		.await;

		assert_eq!(stats.deferred, 1);
		assert_eq!(stats.ingested, 1);
		assert_eq!(acked, vec![1]);
		assert_eq!(store.order_count(), 1);
	}

	#[tokio::test]
	async fn test_receive_error_does_not_stop_loop() {
		let (service, _store) = create_service();

		let (stats, acked) = run_script(
			vec![
				Err(SourceError::Receive("broker hiccup".to_string())),
				Ok(order_message(0, "order_1")),
			],
			service,
		)
		.await;

		assert_eq!(stats.ingested, 1);
		assert_eq!(acked, vec![0]);
	}

	#[tokio::test]
	async fn test_shutdown_stops_idle_loop() {
		let (service, _store) = create_service();
		let (producer, source) = MessageQueue::new(8, Duration::from_secs(1)).split();

		let ingestor = Ingestor::start(source, service);
		assert!(!ingestor.is_finished());

		let stats = tokio::time::timeout(Duration::from_secs(2), ingestor.shutdown())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stats, IngestStats::default());
		drop(producer);
	}

	#[tokio::test]
	async fn test_loop_finishes_when_source_closes() {
		let (service, store) = create_service();
		let (producer, source) = MessageQueue::new(8, Duration::from_secs(1)).split();

		let ingestor = Ingestor::start(source, service);
		producer
			.try_publish(order_message(0, "order_1").payload)
			.unwrap();
		drop(producer);

		tokio::time::timeout(Duration::from_secs(2), async {
			while !ingestor.is_finished() {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await
		.unwrap();

		let stats = tokio::time::timeout(Duration::from_secs(2), ingestor.shutdown())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stats.ingested, 1);
		assert_eq!(store.order_count(), 1);
	}

	/// Source whose first receive panics
	struct PanickingSource;

	#[async_trait]
	impl MessageSource for PanickingSource {
		async fn receive(&mut self) -> Result<Message, SourceError> {
			panic!("source exploded");
		}

		async fn acknowledge(&mut self, _message: &Message) -> Result<(), SourceError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_shutdown_resumes_loop_panic() {
		let (service, _store) = create_service();
		let ingestor = Ingestor::start(PanickingSource, service);

		let err = tokio::spawn(ingestor.shutdown()).await.unwrap_err();
		assert!(err.is_panic());
	}
}

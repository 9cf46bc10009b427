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

use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use tokio::{
	sync::{
		Semaphore, TryAcquireError,
		mpsc::{self, error::TrySendError},
	},
	time::{Instant, sleep_until},
};
use tracing::debug;

use super::{Message, MessageSource, SourceError};

/// In-process message queue with at-least-once delivery
///
/// The queue sits between whatever publishes raw order payloads (the HTTP
/// publish endpoint, tests) and the single ingestion loop.
///
/// Properties:
/// - Multiple producers, single consumer
/// - Bounded capacity; publishing fails fast when full. A message counts
///   against the capacity from publish until it is acknowledged, so messages
///   waiting for redelivery keep the queue full
/// - Offsets assigned in publish order, starting at 0
/// - A received message that is not acknowledged before the next `receive`
///   is redelivered once the redelivery delay has passed
///
/// Redelivery is driven by the consumer: nothing is timed out while the
/// consumer is still working on a message.
pub struct MessageQueue {
	sender: mpsc::Sender<Message>,
	receiver: mpsc::Receiver<Message>,
	/// One permit per message that may still be outstanding
	slots: Arc<Semaphore>,
	redelivery_delay: Duration,
}

impl MessageQueue {
	/// Create a queue holding at most `capacity` unacknowledged messages
	pub fn new(capacity: usize, redelivery_delay: Duration) -> Self {
		let capacity = capacity.max(1);
		let (sender, receiver) = mpsc::channel(capacity);
		Self {
			sender,
			receiver,
			slots: Arc::new(Semaphore::new(capacity)),
			redelivery_delay,
		}
	}

	/// Split the queue into its producer and consumer ends
	///
	/// The producer can be cloned freely. Once every producer is dropped the
	/// source reports `Closed` after its pending redeliveries are served.
	pub fn split(self) -> (MessageProducer, QueueSource) {
		(
			MessageProducer {
				sender: self.sender,
				slots: self.slots.clone(),
				next_offset: Arc::new(AtomicU64::new(0)),
			},
			QueueSource {
				receiver: self.receiver,
				slots: self.slots,
				redelivery_delay: self.redelivery_delay,
				in_flight: None,
				redeliveries: VecDeque::new(),
				closed: false,
			},
		)
	}
}

/// Producer end of the queue
#[derive(Clone)]
pub struct MessageProducer {
	sender: mpsc::Sender<Message>,
	slots: Arc<Semaphore>,
	next_offset: Arc<AtomicU64>,
}

impl MessageProducer {
	/// Publish a payload without waiting
	///
	/// Returns the assigned offset. An offset is only consumed when the
	/// message is actually enqueued.
	pub fn try_publish(&self, payload: Vec<u8>) -> Result<u64, QueueError> {
		if self.sender.is_closed() {
			return Err(QueueError::Closed);
		}

		let slot = self.slots.try_acquire().map_err(|e| match e {
			TryAcquireError::NoPermits => QueueError::Full,
			TryAcquireError::Closed => QueueError::Closed,
		})?;
		let permit = self.sender.try_reserve().map_err(|e| match e {
			TrySendError::Full(()) => QueueError::Full,
			TrySendError::Closed(()) => QueueError::Closed,
		})?;
		// Released by the consumer on acknowledge
		slot.forget();

		let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
		permit.send(Message {
			offset,
			payload,
			attempt: 1,
		});
		Ok(offset)
	}

	/// Publish a payload, waiting for capacity
	pub async fn publish(&self, payload: Vec<u8>) -> Result<u64, QueueError> {
		let slot = self
			.slots
			.acquire()
			.await
			.map_err(|_| QueueError::Closed)?;
		let permit = self
			.sender
			.reserve()
			.await
			.map_err(|_| QueueError::Closed)?;
		slot.forget();

		let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
		permit.send(Message {
			offset,
			payload,
			attempt: 1,
		});
		Ok(offset)
	}

	/// Whether the consumer end has been dropped
	pub fn is_closed(&self) -> bool {
		self.sender.is_closed()
	}
}

struct Redelivery {
	ready_at: Instant,
	message: Message,
}

/// Consumer end of the queue, used as the ingestion loop's `MessageSource`
///
/// Should NOT be shared: only one ingestion loop consumes.
pub struct QueueSource {
	receiver: mpsc::Receiver<Message>,
	slots: Arc<Semaphore>,
	redelivery_delay: Duration,
	/// Last message handed out and not yet acknowledged
	in_flight: Option<Message>,
	redeliveries: VecDeque<Redelivery>,
	/// All producers are gone
	closed: bool,
}

impl QueueSource {
	/// Number of messages waiting to be delivered again
	pub fn pending_redeliveries(&self) -> usize {
		self.redeliveries.len()
	}

	fn hand_out(&mut self, message: Message) -> Message {
		self.in_flight = Some(message.clone());
		message
	}
}

#[async_trait]
impl MessageSource for QueueSource {
	async fn receive(&mut self) -> Result<Message, SourceError> {
		if let Some(mut message) = self.in_flight.take() {
			message.attempt += 1;
			debug!(
				target: "queue",
				offset = message.offset,
				attempt = message.attempt,
				"Scheduling redelivery of unacknowledged message"
			);
			self.redeliveries.push_back(Redelivery {
				ready_at: Instant::now() + self.redelivery_delay,
				message,
			});
		}

		loop {
			let next_redelivery = self.redeliveries.front().map(|r| r.ready_at);

			if next_redelivery.is_some_and(|ready_at| ready_at <= Instant::now()) {
				if let Some(redelivery) = self.redeliveries.pop_front() {
					return Ok(self.hand_out(redelivery.message));
				}
			}

			if self.closed && next_redelivery.is_none() {
				return Err(SourceError::Closed);
			}

			let received = tokio::select! {
				received = self.receiver.recv(), if !self.closed => received,
				_ = sleep_until(next_redelivery.unwrap_or_else(Instant::now)), if next_redelivery.is_some() => continue,
			};

			match received {
				Some(message) => return Ok(self.hand_out(message)),
				None => self.closed = true,
			}
		}
	}

	async fn acknowledge(&mut self, message: &Message) -> Result<(), SourceError> {
		match &self.in_flight {
			Some(in_flight) if in_flight.offset == message.offset => {
				self.in_flight = None;
				self.slots.add_permits(1);
				Ok(())
			}
			_ => Err(SourceError::Acknowledge(format!(
				"offset {} is not in flight",
				message.offset
			))),
		}
	}
}

impl Drop for QueueSource {
	fn drop(&mut self) {
		// Wake producers waiting in `publish`
		self.slots.close();
	}
}

/// Errors that can occur when publishing to the queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("Queue is full")]
	Full,
	#[error("Queue closed")]
	Closed,
}

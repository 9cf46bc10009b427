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
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{OrderStore, StoreError, UpsertStep, with_deadline};
use crate::types::{Delivery, Item, Order, Payment};

/// Order header row: the ordering column plus the serialized order
#[derive(Debug, Clone)]
struct OrderRow {
	date_created: DateTime<Utc>,
	raw_json: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ItemRow {
	order_uid: String,
	item: Item,
}

/// The four relations of the persisted layout
#[derive(Debug, Default)]
struct Tables {
	orders: HashMap<String, OrderRow>,
	deliveries: HashMap<String, Delivery>,
	payments: HashMap<String, Payment>,
	items: Vec<ItemRow>,
}

/// Writes staged by one upsert, published together at commit
struct WriteSet {
	order_uid: String,
	header: Option<OrderRow>,
	delivery: Option<Delivery>,
	payment: Option<Payment>,
	replace_items: Option<Vec<Item>>,
}

impl WriteSet {
	fn begin(order_uid: &str) -> Self {
		Self {
			order_uid: order_uid.to_string(),
			header: None,
			delivery: None,
			payment: None,
			replace_items: None,
		}
	}
}

/// In-memory implementation of the Order Store
///
/// Models the relational layout (orders, deliveries, payments, items) with
/// the same transactional discipline as the PostgreSQL backend: every upsert
/// stages its writes and publishes them under a single lock at commit, so a
/// failure at any step leaves the previous state untouched.
///
/// Characteristics:
/// - No durability; state lives as long as the process
/// - Items stored as a flat relation so wholesale replacement is observable
/// - Test hooks: one-shot failure injection, artificial latency, access
///   counters and row inspection
///
/// Suitable for development, tests and running the service without a
/// database.
pub struct MemoryOrderStore {
	tables: Mutex<Tables>,
	/// One-shot failure injected at the named upsert step
	fail_at: Mutex<Option<UpsertStep>>,
	/// Delay applied before every operation
	latency: Mutex<Duration>,
	upserts: AtomicUsize,
	reads: AtomicUsize,
}

impl MemoryOrderStore {
	pub fn new() -> Self {
		Self {
			tables: Mutex::new(Tables::default()),
			fail_at: Mutex::new(None),
			latency: Mutex::new(Duration::ZERO),
			upserts: AtomicUsize::new(0),
			reads: AtomicUsize::new(0),
		}
	}

	/// Make the next upsert fail when it reaches `step`
	pub fn fail_at(&self, step: UpsertStep) {
		*self.fail_at.lock().unwrap() = Some(step);
	}

	/// Delay every subsequent operation by `latency`
	pub fn set_latency(&self, latency: Duration) {
		*self.latency.lock().unwrap() = latency;
	}

	/// Number of upsert attempts seen (including failed ones)
	pub fn upserts(&self) -> usize {
		self.upserts.load(Ordering::SeqCst)
	}

	/// Number of point reads served
	pub fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}

	pub fn order_count(&self) -> usize {
		self.tables.lock().unwrap().orders.len()
	}

	/// Number of rows in the items relation belonging to `order_uid`
	pub fn item_rows(&self, order_uid: &str) -> usize {
		self.tables
			.lock()
			.unwrap()
			.items
			.iter()
			.filter(|row| row.order_uid == order_uid)
			.count()
	}

	/// Contents of the items relation for `order_uid`, in insertion order
	pub fn stored_items(&self, order_uid: &str) -> Vec<Item> {
		self.tables
			.lock()
			.unwrap()
			.items
			.iter()
			.filter(|row| row.order_uid == order_uid)
			.map(|row| row.item.clone())
			.collect()
	}

	pub fn has_delivery(&self, order_uid: &str) -> bool {
		self.tables.lock().unwrap().deliveries.contains_key(order_uid)
	}

	pub fn has_payment(&self, order_uid: &str) -> bool {
		self.tables.lock().unwrap().payments.contains_key(order_uid)
	}

	async fn simulate_latency(&self) {
		let latency = *self.latency.lock().unwrap();
		if !latency.is_zero() {
			tokio::time::sleep(latency).await;
		}
	}

	fn check_step(&self, step: UpsertStep) -> Result<(), StoreError> {
		let mut fail_at = self.fail_at.lock().unwrap();
		if *fail_at == Some(step) {
			*fail_at = None;
			return Err(StoreError::WriteFailed {
				step,
				message: "injected failure".to_string(),
			});
		}
		Ok(())
	}

	fn stage(&self, order: &Order) -> Result<WriteSet, StoreError> {
		let raw_json = order.to_raw_json().map_err(|e| StoreError::WriteFailed {
			step: UpsertStep::Header,
			message: e.to_string(),
		})?;

		self.check_step(UpsertStep::Begin)?;
		let mut tx = WriteSet::begin(&order.order_uid);

		tx.header = Some(OrderRow {
			date_created: order.date_created,
			raw_json,
		});
		self.check_step(UpsertStep::Header)?;

		tx.delivery = Some(order.delivery.clone());
		self.check_step(UpsertStep::Delivery)?;

		tx.payment = Some(order.payment.clone());
		self.check_step(UpsertStep::Payment)?;

		tx.replace_items = Some(Vec::new());
		self.check_step(UpsertStep::DeleteItems)?;

		tx.replace_items = Some(order.items.clone());
		self.check_step(UpsertStep::InsertItems)?;

		self.check_step(UpsertStep::Commit)?;
		Ok(tx)
	}

	fn commit(&self, tx: WriteSet) {
		let mut tables = self.tables.lock().unwrap();

		if let Some(header) = tx.header {
			tables.orders.insert(tx.order_uid.clone(), header);
		}
		if let Some(delivery) = tx.delivery {
			tables.deliveries.insert(tx.order_uid.clone(), delivery);
		}
		if let Some(payment) = tx.payment {
			tables.payments.insert(tx.order_uid.clone(), payment);
		}
		if let Some(items) = tx.replace_items {
			tables.items.retain(|row| row.order_uid != tx.order_uid);
			tables
				.items
				.extend(items.into_iter().map(|item| ItemRow {
					order_uid: tx.order_uid.clone(),
					item,
				}));
		}
	}

	fn decode(order_uid: &str, row: &OrderRow) -> Result<Order, StoreError> {
		Order::from_raw_json(&row.raw_json)
			.map_err(|e| StoreError::Corrupted(format!("{}: {}", order_uid, e)))
	}
}

impl Default for MemoryOrderStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
	async fn upsert_order(&self, order: &Order, deadline: Duration) -> Result<(), StoreError> {
		with_deadline("upsert order", deadline, async {
			self.simulate_latency().await;
			self.upserts.fetch_add(1, Ordering::SeqCst);

			// Nothing is visible until commit; an early return is the rollback.
			let tx = self.stage(order)?;
			self.commit(tx);
			Ok(())
		})
		.await
	}

	async fn get_by_id(
		&self,
		order_uid: &str,
		deadline: Duration,
	) -> Result<Option<Order>, StoreError> {
		with_deadline("get order", deadline, async {
			self.simulate_latency().await;
			self.reads.fetch_add(1, Ordering::SeqCst);

			let tables = self.tables.lock().unwrap();
			tables
				.orders
				.get(order_uid)
				.map(|row| Self::decode(order_uid, row))
				.transpose()
		})
		.await
	}

	async fn load_recent(
		&self,
		limit: usize,
		deadline: Duration,
	) -> Result<Vec<Order>, StoreError> {
		with_deadline("load orders", deadline, async {
			self.simulate_latency().await;

			let tables = self.tables.lock().unwrap();
			let mut rows: Vec<_> = tables.orders.iter().collect();
			rows.sort_by(|(a_uid, a), (b_uid, b)| {
				b.date_created
					.cmp(&a.date_created)
					.then_with(|| a_uid.cmp(b_uid))
			});

			rows.into_iter()
				.take(limit)
				.map(|(uid, row)| Self::decode(uid, row))
				.collect()
		})
		.await
	}
}

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

//! PostgreSQL Order Store backed by sqlx.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag.
//!
//! # Schema
//!
//! - `orders`: header columns plus `raw_json JSONB`, the serialized order
//!   that reads are answered from
//! - `deliveries`, `payments`: one row per order, keyed by `order_uid`
//! - `items`: one row per item, replaced wholesale on every upsert

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
	PgPool, Postgres, Transaction,
	postgres::PgPoolOptions,
	types::Json,
};
use tracing::info;

use super::{OrderStore, StoreError, UpsertStep, with_deadline};
use crate::types::Order;

const SCHEMA: &[&str] = &[
	"CREATE TABLE IF NOT EXISTS orders (
		order_uid TEXT PRIMARY KEY,
		track_number TEXT NOT NULL,
		entry TEXT NOT NULL DEFAULT '',
		locale TEXT NOT NULL DEFAULT '',
		internal_signature TEXT NOT NULL DEFAULT '',
		customer_id TEXT NOT NULL DEFAULT '',
		delivery_service TEXT NOT NULL DEFAULT '',
		shardkey TEXT NOT NULL DEFAULT '',
		sm_id BIGINT NOT NULL DEFAULT 0,
		date_created TIMESTAMPTZ NOT NULL,
		oof_shard TEXT NOT NULL DEFAULT '',
		raw_json JSONB NOT NULL
	)",
	"CREATE INDEX IF NOT EXISTS idx_orders_date_created ON orders (date_created DESC)",
	"CREATE TABLE IF NOT EXISTS deliveries (
		order_uid TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
		name TEXT NOT NULL DEFAULT '',
		phone TEXT NOT NULL DEFAULT '',
		zip TEXT NOT NULL DEFAULT '',
		city TEXT NOT NULL DEFAULT '',
		address TEXT NOT NULL DEFAULT '',
		region TEXT NOT NULL DEFAULT '',
		email TEXT NOT NULL DEFAULT ''
	)",
	"CREATE TABLE IF NOT EXISTS payments (
		order_uid TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
		transaction TEXT NOT NULL DEFAULT '',
		request_id TEXT NOT NULL DEFAULT '',
		currency TEXT NOT NULL DEFAULT '',
		provider TEXT NOT NULL DEFAULT '',
		amount BIGINT NOT NULL DEFAULT 0,
		payment_dt BIGINT NOT NULL DEFAULT 0,
		bank TEXT NOT NULL DEFAULT '',
		delivery_cost BIGINT NOT NULL DEFAULT 0,
		goods_total BIGINT NOT NULL DEFAULT 0,
		custom_fee BIGINT NOT NULL DEFAULT 0
	)",
	"CREATE TABLE IF NOT EXISTS items (
		id BIGSERIAL PRIMARY KEY,
		order_uid TEXT NOT NULL REFERENCES orders (order_uid) ON DELETE CASCADE,
		chrt_id BIGINT NOT NULL DEFAULT 0,
		track_number TEXT NOT NULL DEFAULT '',
		price BIGINT NOT NULL DEFAULT 0,
		rid TEXT NOT NULL DEFAULT '',
		name TEXT NOT NULL DEFAULT '',
		sale BIGINT NOT NULL DEFAULT 0,
		size TEXT NOT NULL DEFAULT '',
		total_price BIGINT NOT NULL DEFAULT 0,
		nm_id BIGINT NOT NULL DEFAULT 0,
		brand TEXT NOT NULL DEFAULT '',
		status BIGINT NOT NULL DEFAULT 0
	)",
	"CREATE INDEX IF NOT EXISTS idx_items_order_uid ON items (order_uid)",
];

const UPSERT_ORDER: &str = "
INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature, customer_id,
                    delivery_service, shardkey, sm_id, date_created, oof_shard, raw_json)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (order_uid) DO UPDATE SET
  track_number = EXCLUDED.track_number,
  entry = EXCLUDED.entry,
  locale = EXCLUDED.locale,
  internal_signature = EXCLUDED.internal_signature,
  customer_id = EXCLUDED.customer_id,
  delivery_service = EXCLUDED.delivery_service,
  shardkey = EXCLUDED.shardkey,
  sm_id = EXCLUDED.sm_id,
  date_created = EXCLUDED.date_created,
  oof_shard = EXCLUDED.oof_shard,
  raw_json = EXCLUDED.raw_json";

const UPSERT_DELIVERY: &str = "
INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (order_uid) DO UPDATE SET
  name = EXCLUDED.name, phone = EXCLUDED.phone, zip = EXCLUDED.zip, city = EXCLUDED.city,
  address = EXCLUDED.address, region = EXCLUDED.region, email = EXCLUDED.email";

const UPSERT_PAYMENT: &str = "
INSERT INTO payments (order_uid, transaction, request_id, currency, provider,
                      amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
ON CONFLICT (order_uid) DO UPDATE SET
  transaction = EXCLUDED.transaction, request_id = EXCLUDED.request_id,
  currency = EXCLUDED.currency, provider = EXCLUDED.provider, amount = EXCLUDED.amount,
  payment_dt = EXCLUDED.payment_dt, bank = EXCLUDED.bank,
  delivery_cost = EXCLUDED.delivery_cost, goods_total = EXCLUDED.goods_total,
  custom_fee = EXCLUDED.custom_fee";

const INSERT_ITEM: &str = "
INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

/// Order Store backed by PostgreSQL
///
/// Each upsert runs in its own transaction; concurrent upserts of different
/// orders only contend on row locks. Dropping an unfinished transaction (for
/// example when its deadline expires) rolls it back.
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
	pool: PgPool,
}

impl PostgresOrderStore {
	/// Create a store over an existing connection pool
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Connect a new pool and verify the database is reachable
	pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(url)
			.await
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;

		info!(target: "store", max_connections, "Connected to PostgreSQL");
		Ok(Self::new(pool))
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Create the order relations and indexes (idempotent)
	///
	/// Safe to call on every startup.
	pub async fn ensure_schema(&self) -> Result<(), StoreError> {
		for statement in SCHEMA {
			sqlx::query(statement)
				.execute(&self.pool)
				.await
				.map_err(|e| StoreError::Unavailable(format!("Failed to apply schema: {}", e)))?;
		}
		Ok(())
	}

	async fn write_order(&self, order: &Order) -> Result<(), StoreError> {
		let mut tx = self
			.pool
			.begin()
			.await
			.map_err(|e| write_failed(UpsertStep::Begin, e))?;

		Self::upsert_header(&mut tx, order).await?;
		Self::upsert_delivery(&mut tx, order).await?;
		Self::upsert_payment(&mut tx, order).await?;
		Self::replace_items(&mut tx, order).await?;

		// An early return drops `tx`, which rolls it back.
		tx.commit()
			.await
			.map_err(|e| write_failed(UpsertStep::Commit, e))
	}

	async fn upsert_header(
		tx: &mut Transaction<'_, Postgres>,
		order: &Order,
	) -> Result<(), StoreError> {
		sqlx::query(UPSERT_ORDER)
			.bind(&order.order_uid)
			.bind(&order.track_number)
			.bind(&order.entry)
			.bind(&order.locale)
			.bind(&order.internal_signature)
			.bind(&order.customer_id)
			.bind(&order.delivery_service)
			.bind(&order.shard_key)
			.bind(order.sm_id)
			.bind(order.date_created)
			.bind(&order.oof_shard)
			.bind(Json(order))
			.execute(&mut **tx)
			.await
			.map_err(|e| write_failed(UpsertStep::Header, e))?;
		Ok(())
	}

	async fn upsert_delivery(
		tx: &mut Transaction<'_, Postgres>,
		order: &Order,
	) -> Result<(), StoreError> {
		let delivery = &order.delivery;
		sqlx::query(UPSERT_DELIVERY)
			.bind(&order.order_uid)
			.bind(&delivery.name)
			.bind(&delivery.phone)
			.bind(&delivery.zip)
			.bind(&delivery.city)
			.bind(&delivery.address)
			.bind(&delivery.region)
			.bind(&delivery.email)
			.execute(&mut **tx)
			.await
			.map_err(|e| write_failed(UpsertStep::Delivery, e))?;
		Ok(())
	}

	async fn upsert_payment(
		tx: &mut Transaction<'_, Postgres>,
		order: &Order,
	) -> Result<(), StoreError> {
		let payment = &order.payment;
		sqlx::query(UPSERT_PAYMENT)
			.bind(&order.order_uid)
			.bind(&payment.transaction)
			.bind(&payment.request_id)
			.bind(&payment.currency)
			.bind(&payment.provider)
			.bind(payment.amount)
			.bind(payment.payment_dt)
			.bind(&payment.bank)
			.bind(payment.delivery_cost)
			.bind(payment.goods_total)
			.bind(payment.custom_fee)
			.execute(&mut **tx)
			.await
			.map_err(|e| write_failed(UpsertStep::Payment, e))?;
		Ok(())
	}

	async fn replace_items(
		tx: &mut Transaction<'_, Postgres>,
		order: &Order,
	) -> Result<(), StoreError> {
		sqlx::query("DELETE FROM items WHERE order_uid = $1")
			.bind(&order.order_uid)
			.execute(&mut **tx)
			.await
			.map_err(|e| write_failed(UpsertStep::DeleteItems, e))?;

		for item in &order.items {
			sqlx::query(INSERT_ITEM)
				.bind(&order.order_uid)
				.bind(item.chrt_id)
				.bind(&item.track_number)
				.bind(item.price)
				.bind(&item.rid)
				.bind(&item.name)
				.bind(item.sale)
				.bind(&item.size)
				.bind(item.total_price)
				.bind(item.nm_id)
				.bind(&item.brand)
				.bind(item.status)
				.execute(&mut **tx)
				.await
				.map_err(|e| write_failed(UpsertStep::InsertItems, e))?;
		}
		Ok(())
	}
}

fn write_failed(step: UpsertStep, error: sqlx::Error) -> StoreError {
	StoreError::WriteFailed {
		step,
		message: error.to_string(),
	}
}

fn read_failed(error: sqlx::Error) -> StoreError {
	match error {
		sqlx::Error::ColumnDecode { source, .. } => StoreError::Corrupted(source.to_string()),
		sqlx::Error::Decode(source) => StoreError::Corrupted(source.to_string()),
		other => StoreError::ReadFailed(other.to_string()),
	}
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
	async fn upsert_order(&self, order: &Order, deadline: Duration) -> Result<(), StoreError> {
		with_deadline("upsert order", deadline, self.write_order(order)).await
	}

	async fn get_by_id(
		&self,
		order_uid: &str,
		deadline: Duration,
	) -> Result<Option<Order>, StoreError> {
		with_deadline("get order", deadline, async {
			let raw: Option<Json<Order>> =
				sqlx::query_scalar("SELECT raw_json FROM orders WHERE order_uid = $1")
					.bind(order_uid)
					.fetch_optional(&self.pool)
					.await
					.map_err(read_failed)?;

			Ok(raw.map(|Json(order)| order))
		})
		.await
	}

	async fn load_recent(
		&self,
		limit: usize,
		deadline: Duration,
	) -> Result<Vec<Order>, StoreError> {
		with_deadline("load orders", deadline, async {
			let limit = i64::try_from(limit).unwrap_or(i64::MAX);
			let rows: Vec<Json<Order>> = sqlx::query_scalar(
				"SELECT raw_json FROM orders ORDER BY date_created DESC, order_uid LIMIT $1",
			)
			.bind(limit)
			.fetch_all(&self.pool)
			.await
			.map_err(read_failed)?;

			Ok(rows.into_iter().map(|Json(order)| order).collect())
		})
		.await
	}
}

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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order record as delivered by the upstream stream
///
/// One message carries one full order; every ingestion replaces the stored
/// copy entirely. Missing fields decode to their zero value so that the
/// validator, not the decoder, decides whether a record is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
	/// Globally unique order identifier (cache key and primary key)
	pub order_uid: String,
	pub track_number: String,
	/// Entry channel
	pub entry: String,
	pub delivery: Delivery,
	pub payment: Payment,
	pub items: Vec<Item>,
	/// Empty when the producer did not set a locale
	pub locale: String,
	pub internal_signature: String,
	pub customer_id: String,
	pub delivery_service: String,
	#[serde(rename = "shardkey")]
	pub shard_key: String,
	/// Numeric routing id
	pub sm_id: i64,
	pub date_created: DateTime<Utc>,
	pub oof_shard: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
	pub name: String,
	pub phone: String,
	pub zip: String,
	pub city: String,
	pub address: String,
	pub region: String,
	pub email: String,
}

/// Payment attached to an order
///
/// Monetary values are integral minor units and signed on purpose: a negative
/// amount decodes fine and is rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
	pub transaction: String,
	pub request_id: String,
	pub currency: String,
	pub provider: String,
	pub amount: i64,
	/// Unix timestamp (seconds)
	pub payment_dt: i64,
	pub bank: String,
	pub delivery_cost: i64,
	pub goods_total: i64,
	pub custom_fee: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
	pub chrt_id: i64,
	pub track_number: String,
	pub price: i64,
	pub rid: String,
	pub name: String,
	/// Sale percent
	pub sale: i64,
	pub size: String,
	pub total_price: i64,
	pub nm_id: i64,
	pub brand: String,
	pub status: i64,
}

impl Order {
	/// Canonical serialized copy stored alongside the relational rows
	pub fn to_raw_json(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(self)
	}

	/// Rebuild an order from its stored serialized copy
	pub fn from_raw_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
		serde_json::from_slice(raw)
	}
}

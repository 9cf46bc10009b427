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

use std::{sync::Arc, time::Duration};

use parcel_orders::{
	CacheConfig, Ingestor, Item, LruOrderCache, MemoryOrderStore, MessageQueue, Order,
	OrderCache, OrderService, OrderStore, Payment, QueueError, StoreTimeouts, UpsertStep,
};

type MemoryService = OrderService<Arc<MemoryOrderStore>, LruOrderCache>;

const SAMPLE_ORDER: &str = r#"{
  "order_uid": "b563feb7b2b84b6test",
  "track_number": "WBILMTESTTRACK",
  "entry": "WBIL",
  "delivery": {
    "name": "Test Testov",
    "phone": "+9720000000",
    "zip": "2639809",
    "city": "Kiryat Mozkin",
    "address": "Ploshad Mira 15",
    "region": "Kraiot",
    "email": "test@gmail.com"
  },
  "payment": {
    "transaction": "b563feb7b2b84b6test",
    "request_id": "",
    "currency": "USD",
    "provider": "wbpay",
    "amount": 1817,
    "payment_dt": 1637907727,
    "bank": "alpha",
    "delivery_cost": 1500,
    "goods_total": 317,
    "custom_fee": 0
  },
  "items": [
    {
      "chrt_id": 9934930,
      "track_number": "WBILMTESTTRACK",
      "price": 453,
      "rid": "ab4219087a764ae0btest",
      "name": "Mascaras",
      "sale": 30,
      "size": "0",
      "total_price": 317,
      "nm_id": 2389212,
      "brand": "Vivienne Sabo",
      "status": 202
    }
  ],
  "locale": "en",
  "internal_signature": "",
  "customer_id": "test",
  "delivery_service": "meest",
  "shardkey": "9",
  "sm_id": 99,
  "date_created": "2021-11-26T06:22:19Z",
  "oof_shard": "1"
}"#;

fn create_service() -> (Arc<MemoryService>, Arc<MemoryOrderStore>) {
	let store = Arc::new(MemoryOrderStore::new());
	let cache = LruOrderCache::new(&CacheConfig::default());
	let service = OrderService::new(store.clone(), cache, StoreTimeouts::default());
	(Arc::new(service), store)
}

fn create_a1_order() -> Order {
	Order {
		order_uid: "A1".to_string(),
		track_number: "T1".to_string(),
		items: vec![Item {
			name: "x".to_string(),
			price: 100,
			total_price: 100,
			..Default::default()
		}],
		payment: Payment {
			amount: 100,
			goods_total: 100,
			delivery_cost: 0,
			..Default::default()
		},
		..Default::default()
	}
}

/// Poll until `condition` holds, failing the test after two seconds
async fn wait_for(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(2), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("condition not reached in time");
}

#[tokio::test]
async fn test_ingest_and_get_a1() {
	let (service, _store) = create_service();

	service.ingest(create_a1_order()).await.unwrap();

	let order = service.get("A1").await.unwrap().unwrap();
	assert_eq!(order.order_uid, "A1");
	assert_eq!(order.items.len(), 1);
	assert_eq!(order.items[0].name, "x");
}

#[tokio::test]
async fn test_get_unknown_order() {
	let (service, _store) = create_service();

	assert!(service.get("never-seen").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_replacement_keeps_previous_version() {
	let (service, store) = create_service();
	let original = create_a1_order();
	service.ingest(original.clone()).await.unwrap();

	let mut replacement = original.clone();
	replacement.track_number = "T2".to_string();
	replacement.items.push(Item {
		name: "y".to_string(),
		..Default::default()
	});

	// Fails after the delivery row, before the items are replaced
	store.fail_at(UpsertStep::DeleteItems);
	assert!(service.ingest(replacement).await.is_err());

	let stored = store
		.get_by_id("A1", Duration::from_secs(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored, original);
	assert_eq!(store.item_rows("A1"), 1);
	assert_eq!(*service.get("A1").await.unwrap().unwrap(), original);
}

#[tokio::test]
async fn test_queue_to_cache_pipeline() {
	let (service, store) = create_service();
	let (producer, source) = MessageQueue::new(16, Duration::from_millis(20)).split();
	let ingestor = Ingestor::start(source, service.clone());

	producer
		.try_publish(SAMPLE_ORDER.as_bytes().to_vec())
		.unwrap();
	wait_for(|| store.order_count() == 1).await;

	let order = service.get("b563feb7b2b84b6test").await.unwrap().unwrap();
	assert_eq!(order.delivery.city, "Kiryat Mozkin");
	assert_eq!(order.shard_key, "9");
	assert_eq!(order.items[0].brand, "Vivienne Sabo");
	assert_eq!(store.reads(), 0);

	let stats = ingestor.shutdown().await.unwrap();
	assert_eq!(stats.ingested, 1);
}

#[tokio::test]
async fn test_invalid_json_is_acknowledged_without_ingest() {
	let (service, store) = create_service();
	let (producer, source) = MessageQueue::new(16, Duration::from_millis(20)).split();
	let ingestor = Ingestor::start(source, service);

	producer.try_publish(b"not json at all".to_vec()).unwrap();
	producer
		.try_publish(SAMPLE_ORDER.as_bytes().to_vec())
		.unwrap();
	drop(producer);

	wait_for(|| ingestor.is_finished()).await;
	let stats = ingestor.shutdown().await.unwrap();

	// Acknowledged messages are never redelivered, so each counts once
	assert_eq!(stats.received, 2);
	assert_eq!(stats.dropped_malformed, 1);
	assert_eq!(stats.ingested, 1);
	assert_eq!(store.upserts(), 1);
}

#[tokio::test]
async fn test_invalid_order_is_not_redelivered() {
	let (service, store) = create_service();
	let (producer, source) = MessageQueue::new(16, Duration::from_millis(20)).split();
	let ingestor = Ingestor::start(source, service);

	let mut order = create_a1_order();
	order.items.clear();
	producer.try_publish(order.to_raw_json().unwrap()).unwrap();
	drop(producer);

	wait_for(|| ingestor.is_finished()).await;
	let stats = ingestor.shutdown().await.unwrap();

	assert_eq!(stats.received, 1);
	assert_eq!(stats.rejected, 1);
	assert_eq!(store.upserts(), 0);
}

#[tokio::test]
async fn test_store_failure_is_redelivered_and_succeeds() {
	let (service, store) = create_service();
	let (producer, source) = MessageQueue::new(16, Duration::from_millis(20)).split();
	let ingestor = Ingestor::start(source, service.clone());

	store.fail_at(UpsertStep::Payment);
	producer
		.try_publish(create_a1_order().to_raw_json().unwrap())
		.unwrap();
	drop(producer);

	wait_for(|| ingestor.is_finished()).await;
	let stats = ingestor.shutdown().await.unwrap();

	assert_eq!(stats.received, 2);
	assert_eq!(stats.deferred, 1);
	assert_eq!(stats.ingested, 1);
	assert_eq!(store.upserts(), 2);
	assert!(service.cache().get("A1").is_some());
}

#[tokio::test]
async fn test_store_outage_backs_up_into_publisher() {
	let store = Arc::new(MemoryOrderStore::new());
	let timeouts = StoreTimeouts {
		write: Duration::from_millis(20),
		..Default::default()
	};
	let service = Arc::new(OrderService::new(
		store.clone(),
		LruOrderCache::new(&CacheConfig::default()),
		timeouts,
	));
	store.set_latency(Duration::from_millis(200));

	let (producer, source) = MessageQueue::new(2, Duration::from_millis(10)).split();
	let ingestor = Ingestor::start(source, service);

	for order_uid in ["A1", "A2"] {
		let mut order = create_a1_order();
		order.order_uid = order_uid.to_string();
		producer.try_publish(order.to_raw_json().unwrap()).unwrap();
	}

	// Both messages keep failing and stay unacknowledged
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(matches!(
		producer.try_publish(create_a1_order().to_raw_json().unwrap()),
		Err(QueueError::Full)
	));

	store.set_latency(Duration::ZERO);
	wait_for(|| store.order_count() == 2).await;
	wait_for(|| {
		producer
			.try_publish(create_a1_order().to_raw_json().unwrap())
			.is_ok()
	})
	.await;

	let stats = ingestor.shutdown().await.unwrap();
	assert!(stats.deferred >= 2);
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_message() {
	let (service, store) = create_service();
	store.set_latency(Duration::from_millis(100));
	let (producer, source) = MessageQueue::new(16, Duration::from_millis(20)).split();
	let ingestor = Ingestor::start(source, service);

	producer
		.try_publish(create_a1_order().to_raw_json().unwrap())
		.unwrap();

	// Let the loop pick the message up; the store is still sleeping on it
	tokio::time::sleep(Duration::from_millis(30)).await;
	let stats = ingestor.shutdown().await.unwrap();

	assert_eq!(stats.ingested, 1);
	assert_eq!(store.order_count(), 1);

	// The consumer end went away with the loop
	assert!(matches!(
		producer.try_publish(create_a1_order().to_raw_json().unwrap()),
		Err(QueueError::Closed)
	));
}

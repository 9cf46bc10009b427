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

use actix_web::{HttpResponse, Responder, http::StatusCode, web};
use parcel_orders::{QueueError, StoreError};
use thiserror::Error;
use tracing::{debug, error};

use crate::server::GatewayState;

/// Error types for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("order not found")]
	NotFound,
	#[error("Order store error: {0}")]
	Store(#[from] StoreError),
	#[error("Ingestion queue unavailable: {0}")]
	Queue(#[from] QueueError),
	#[error("request body is empty")]
	EmptyBody,
}

impl actix_web::ResponseError for GatewayError {
	fn status_code(&self) -> StatusCode {
		match self {
			GatewayError::NotFound => StatusCode::NOT_FOUND,
			GatewayError::Store(e) if e.is_deadline_exceeded() => StatusCode::GATEWAY_TIMEOUT,
			GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
			GatewayError::EmptyBody => StatusCode::BAD_REQUEST,
		}
	}

	fn error_response(&self) -> HttpResponse {
		HttpResponse::build(self.status_code()).json(serde_json::json!({
			"error": self.to_string()
		}))
	}
}

/// Health check endpoint
pub async fn health() -> impl Responder {
	HttpResponse::Ok().json(serde_json::json!({
		"status": "ok",
		"service": "parcel-gateway"
	}))
}

/// Handle order lookup
///
/// Served from the cache when possible, otherwise from the store.
pub async fn get_order(
	state: web::Data<GatewayState>,
	path: web::Path<String>,
) -> Result<HttpResponse, GatewayError> {
	let order_uid = path.into_inner();

	match state.service.get(&order_uid).await {
		Ok(Some(order)) => Ok(HttpResponse::Ok().json(order.as_ref())),
		Ok(None) => {
			debug!(target: "http", order_uid = %order_uid, "Order not found");
			Err(GatewayError::NotFound)
		}
		Err(e) => {
			error!(target: "http", order_uid = %order_uid, error = %e, "Order lookup failed");
			Err(e.into())
		}
	}
}

/// Handle order publication
///
/// The raw body is queued as-is for the ingestion loop; decoding and
/// validation happen there. Responds with the assigned stream offset.
pub async fn publish_order(
	state: web::Data<GatewayState>,
	body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
	if body.is_empty() {
		return Err(GatewayError::EmptyBody);
	}

	let offset = state.producer.try_publish(body.to_vec())?;
	debug!(target: "http", offset, bytes = body.len(), "Order payload queued");

	Ok(HttpResponse::Accepted().json(serde_json::json!({ "offset": offset })))
}

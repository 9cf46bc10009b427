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

use ::validator::ValidateEmail;
use thiserror::Error;

use crate::types::Order;

/// Locales accepted on inbound orders (an empty locale is also accepted)
pub const SUPPORTED_LOCALES: &[&str] = &["ru", "en"];

/// Error types for order validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	#[error("{0} is required")]
	MissingField(&'static str),
	#[error("items must not be empty")]
	NoItems,
	#[error("{field} must be >= 0 (got {value})")]
	NegativeAmount { field: &'static str, value: i64 },
	#[error("invalid delivery.email: {0}")]
	InvalidEmail(String),
	#[error("unsupported locale: {0}")]
	UnsupportedLocale(String),
}

/// Order validator
///
/// Decides whether an inbound order is well-formed enough to persist. The
/// validator holds no state: any instance is interchangeable and calls never
/// influence each other. Cheap structural checks run before semantic ones and
/// the first violation is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderValidator;

impl OrderValidator {
	pub fn new() -> Self {
		Self
	}

	pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
		if order.order_uid.is_empty() {
			return Err(ValidationError::MissingField("order_uid"));
		}

		if order.track_number.is_empty() {
			return Err(ValidationError::MissingField("track_number"));
		}

		if order.items.is_empty() {
			return Err(ValidationError::NoItems);
		}

		let amounts = [
			("payment.amount", order.payment.amount),
			("payment.goods_total", order.payment.goods_total),
			("payment.delivery_cost", order.payment.delivery_cost),
		];
		if let Some((field, value)) = amounts.into_iter().find(|(_, value)| *value < 0) {
			return Err(ValidationError::NegativeAmount { field, value });
		}

		let email = &order.delivery.email;
		if !email.is_empty() && !addr_spec(email).validate_email() {
			return Err(ValidationError::InvalidEmail(email.clone()));
		}

		if !order.locale.is_empty() && !SUPPORTED_LOCALES.contains(&order.locale.as_str()) {
			return Err(ValidationError::UnsupportedLocale(order.locale.clone()));
		}

		Ok(())
	}
}

/// Address part of a mailbox, accepting the `Display Name <local@domain>` form
fn addr_spec(mailbox: &str) -> &str {
	let mailbox = mailbox.trim();
	match (mailbox.rfind('<'), mailbox.strip_suffix('>')) {
		(Some(open), Some(rest)) => rest[open + 1..].trim(),
		_ => mailbox,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Item, Payment};

	fn valid_order() -> Order {
		let mut order = Order {
			order_uid: "order_1".to_string(),
			track_number: "TRACK_1".to_string(),
			locale: "en".to_string(),
			items: vec![Item {
				name: "x".to_string(),
				price: 100,
				total_price: 100,
				..Default::default()
			}],
			payment: Payment {
				amount: 100,
				goods_total: 100,
				..Default::default()
			},
			..Default::default()
		};
		order.delivery.email = "buyer@example.com".to_string();
		order
	}

	#[test]
	fn test_valid_order_passes() {
		assert_eq!(OrderValidator::new().validate(&valid_order()), Ok(()));
	}

	#[test]
	fn test_missing_identity_fields() {
		let validator = OrderValidator::new();

		let mut order = valid_order();
		order.order_uid.clear();
		assert_eq!(
			validator.validate(&order),
			Err(ValidationError::MissingField("order_uid"))
		);

		let mut order = valid_order();
		order.track_number.clear();
		assert_eq!(
			validator.validate(&order),
			Err(ValidationError::MissingField("track_number"))
		);
	}

	#[test]
	fn test_empty_items_rejected() {
		let mut order = valid_order();
		order.items.clear();

		let err = OrderValidator::new().validate(&order).unwrap_err();
		assert_eq!(err, ValidationError::NoItems);
		assert_eq!(err.to_string(), "items must not be empty");
	}

	#[test]
	fn test_negative_amounts_name_the_field() {
		let validator = OrderValidator::new();

		let mut order = valid_order();
		order.payment.delivery_cost = -1;
		assert_eq!(
			validator.validate(&order),
			Err(ValidationError::NegativeAmount {
				field: "payment.delivery_cost",
				value: -1
			})
		);

		// amount is checked before goods_total
		order.payment.amount = -5;
		order.payment.goods_total = -7;
		let err = validator.validate(&order).unwrap_err();
		assert!(err.to_string().starts_with("payment.amount"));
	}

	#[test]
	fn test_email_checked_only_when_present() {
		let validator = OrderValidator::new();

		let mut order = valid_order();
		order.delivery.email.clear();
		assert!(validator.validate(&order).is_ok());

		order.delivery.email = "not-an-email".to_string();
		assert!(matches!(
			validator.validate(&order),
			Err(ValidationError::InvalidEmail(_))
		));
	}

	#[test]
	fn test_email_with_display_name() {
		let validator = OrderValidator::new();
		let mut order = valid_order();

		for accepted in ["Buyer <buyer@example.com>", "<buyer@example.com>"] {
			order.delivery.email = accepted.to_string();
			assert!(validator.validate(&order).is_ok(), "{accepted}");
		}

		for rejected in ["Buyer <not-an-email>", "Buyer <>", "Buyer <buyer@example.com"] {
			order.delivery.email = rejected.to_string();
			assert!(
				matches!(
					validator.validate(&order),
					Err(ValidationError::InvalidEmail(_))
				),
				"{rejected}"
			);
		}
	}

	#[test]
	fn test_locale_restricted_when_present() {
		let validator = OrderValidator::new();

		let mut order = valid_order();
		order.locale = "ru".to_string();
		assert!(validator.validate(&order).is_ok());

		order.locale.clear();
		assert!(validator.validate(&order).is_ok());

		order.locale = "de".to_string();
		assert_eq!(
			validator.validate(&order),
			Err(ValidationError::UnsupportedLocale("de".to_string()))
		);
	}

	#[test]
	fn test_structural_checks_run_first() {
		let mut order = valid_order();
		order.items.clear();
		order.locale = "de".to_string();
		order.delivery.email = "broken".to_string();

		assert_eq!(
			OrderValidator::new().validate(&order),
			Err(ValidationError::NoItems)
		);
	}
}

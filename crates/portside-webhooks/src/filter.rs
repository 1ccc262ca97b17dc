//! Structured subscription filters.
//!
//! Each field is fully optional: an unset field places no constraint on that
//! dimension. A configured field requires the corresponding key to be present
//! in the event data and to satisfy the constraint; events that do not carry
//! the key fail the filter.
//!
//! Recognized event-data keys: `order_status`, `payment_type`, `order_value`,
//! `shipping_country`, `product_category`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Optional per-subscription event filters, evaluated by a pure predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SubscriptionFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_statuses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_categories: Option<Vec<String>>,
}

impl SubscriptionFilters {
    /// Whether any constraint is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_statuses.is_none()
            && self.payment_types.is_none()
            && self.min_order_value.is_none()
            && self.countries.is_none()
            && self.product_categories.is_none()
    }

    /// Evaluate the filter against an event's data object.
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        if let Some(ref statuses) = self.order_statuses {
            if !member_of(data, "order_status", statuses) {
                return false;
            }
        }
        if let Some(ref types) = self.payment_types {
            if !member_of(data, "payment_type", types) {
                return false;
            }
        }
        if let Some(min) = self.min_order_value {
            match data.get("order_value").and_then(Value::as_f64) {
                Some(v) if v >= min => {}
                _ => return false,
            }
        }
        if let Some(ref countries) = self.countries {
            if !member_of(data, "shipping_country", countries) {
                return false;
            }
        }
        if let Some(ref categories) = self.product_categories {
            if !member_of(data, "product_category", categories) {
                return false;
            }
        }
        true
    }
}

fn member_of(data: &Value, key: &str, allowed: &[String]) -> bool {
    data.get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| allowed.iter().any(|a| a == v))
}

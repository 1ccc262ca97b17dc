//! Closed business-event taxonomy for the Portside marketplace.
//!
//! Every event that can cross the webhook boundary is named here. The wire
//! strings (`order.created`, `payment.refunded`, ...) are part of the external
//! contract: subscribers register against them and receive them verbatim in
//! the delivery envelope, so additions are append-only and renames are
//! breaking changes.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};

/// Error returned when an event-type string is not part of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

/// Coarse grouping of event types by business domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Order,
    Payment,
    Shipping,
    Product,
    User,
    Account,
    Document,
    Compliance,
    System,
    /// Internal webhook machinery (verification probes).
    Webhook,
}

/// A business event type that can be delivered over a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    OrderCreated,
    OrderUpdated,
    OrderCancelled,
    OrderCompleted,
    OrderDisputed,
    PaymentPending,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    PaymentAdvancePaid,
    PaymentShipmentPaid,
    PaymentDeliveryPaid,
    ShippingReadyToShip,
    ShippingShipped,
    ShippingInTransit,
    ShippingDelivered,
    ShippingDelayed,
    ShippingReturned,
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    ProductLowStock,
    ProductOutOfStock,
    UserVerified,
    UserSuspended,
    AccountKycApproved,
    AccountKycRejected,
    DocumentUploaded,
    DocumentVerified,
    DocumentRejected,
    ComplianceCheckRequired,
    ComplianceCheckPassed,
    ComplianceCheckFailed,
    SystemMaintenance,
    SystemAlert,
    /// Internal probe sent by the endpoint-verification flow.
    WebhookVerification,
}

/// All event types, in wire-string order. Used for validation and listings.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::OrderCreated,
    EventType::OrderUpdated,
    EventType::OrderCancelled,
    EventType::OrderCompleted,
    EventType::OrderDisputed,
    EventType::PaymentPending,
    EventType::PaymentCompleted,
    EventType::PaymentFailed,
    EventType::PaymentRefunded,
    EventType::PaymentAdvancePaid,
    EventType::PaymentShipmentPaid,
    EventType::PaymentDeliveryPaid,
    EventType::ShippingReadyToShip,
    EventType::ShippingShipped,
    EventType::ShippingInTransit,
    EventType::ShippingDelivered,
    EventType::ShippingDelayed,
    EventType::ShippingReturned,
    EventType::ProductCreated,
    EventType::ProductUpdated,
    EventType::ProductDeleted,
    EventType::ProductLowStock,
    EventType::ProductOutOfStock,
    EventType::UserVerified,
    EventType::UserSuspended,
    EventType::AccountKycApproved,
    EventType::AccountKycRejected,
    EventType::DocumentUploaded,
    EventType::DocumentVerified,
    EventType::DocumentRejected,
    EventType::ComplianceCheckRequired,
    EventType::ComplianceCheckPassed,
    EventType::ComplianceCheckFailed,
    EventType::SystemMaintenance,
    EventType::SystemAlert,
    EventType::WebhookVerification,
];

impl EventType {
    /// The exact wire string for this event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::OrderUpdated => "order.updated",
            Self::OrderCancelled => "order.cancelled",
            Self::OrderCompleted => "order.completed",
            Self::OrderDisputed => "order.disputed",
            Self::PaymentPending => "payment.pending",
            Self::PaymentCompleted => "payment.completed",
            Self::PaymentFailed => "payment.failed",
            Self::PaymentRefunded => "payment.refunded",
            Self::PaymentAdvancePaid => "payment.advance_paid",
            Self::PaymentShipmentPaid => "payment.shipment_paid",
            Self::PaymentDeliveryPaid => "payment.delivery_paid",
            Self::ShippingReadyToShip => "shipping.ready_to_ship",
            Self::ShippingShipped => "shipping.shipped",
            Self::ShippingInTransit => "shipping.in_transit",
            Self::ShippingDelivered => "shipping.delivered",
            Self::ShippingDelayed => "shipping.delayed",
            Self::ShippingReturned => "shipping.returned",
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::ProductDeleted => "product.deleted",
            Self::ProductLowStock => "product.low_stock",
            Self::ProductOutOfStock => "product.out_of_stock",
            Self::UserVerified => "user.verified",
            Self::UserSuspended => "user.suspended",
            Self::AccountKycApproved => "account.kyc_approved",
            Self::AccountKycRejected => "account.kyc_rejected",
            Self::DocumentUploaded => "document.uploaded",
            Self::DocumentVerified => "document.verified",
            Self::DocumentRejected => "document.rejected",
            Self::ComplianceCheckRequired => "compliance.check_required",
            Self::ComplianceCheckPassed => "compliance.check_passed",
            Self::ComplianceCheckFailed => "compliance.check_failed",
            Self::SystemMaintenance => "system.maintenance",
            Self::SystemAlert => "system.alert",
            Self::WebhookVerification => "webhook.verification",
        }
    }

    /// Parse a wire string into an event type.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventType`] for any string outside the taxonomy.
    pub fn parse(s: &str) -> Result<Self, UnknownEventType> {
        ALL_EVENT_TYPES
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }

    /// The business domain this event belongs to.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self.as_str().split('.').next() {
            Some("order") => EventCategory::Order,
            Some("payment") => EventCategory::Payment,
            Some("shipping") => EventCategory::Shipping,
            Some("product") => EventCategory::Product,
            Some("user") => EventCategory::User,
            Some("account") => EventCategory::Account,
            Some("document") => EventCategory::Document,
            Some("compliance") => EventCategory::Compliance,
            Some("system") => EventCategory::System,
            _ => EventCategory::Webhook,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

//! Data model: subscriptions, delivery logs, and the wire envelope.

pub mod delivery;
pub mod envelope;
pub mod subscription;

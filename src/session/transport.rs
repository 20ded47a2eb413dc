//! Transport abstraction: the badge's wireless link.
//!
//! A link provides three primitives: connect (subscribing to
//! notifications), write, and disconnect. Inbound bytes and disconnect
//! events arrive asynchronously through the [`NotificationSink`] handed to
//! `connect`, from whatever thread or callback the link runs on.
//!
//! The session is generic over `Transport`, so a BLE stack, a serial
//! bridge or a simulated badge plug in without touching protocol logic.

use core::fmt;

use super::inbound::NotificationSink;

/// Byte-oriented, notification-driven link to one badge.
pub trait Transport {
    /// Error type for this transport.
    type Error: fmt::Debug + fmt::Display;

    /// Establish the link and start delivering notifications into `sink`.
    async fn connect(&mut self, sink: NotificationSink) -> Result<(), Self::Error>;

    /// Write one complete frame to the badge.
    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Tear the link down. Must be safe to call when already disconnected.
    async fn disconnect(&mut self) -> Result<(), Self::Error>;
}

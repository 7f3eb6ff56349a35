//! Notification streaming modules.
//!
//! - `event`: decoded change-notification records.
//! - `selection`: subscription selection and wire-format encoding.
//! - `transport`: server trust capability and the transport seam.
//! - `session`: protocol handshake and the stream read loop.
//! - `manager`: connection supervisor, listener registry, and reconnects.

/// Error taxonomy for the notification subsystem.
pub mod error;
/// Decoded change-notification records.
pub mod event;
/// Connection supervisor and listener dispatch.
pub mod manager;
/// Subscription selection and wire encoding.
pub mod selection;
/// Handshake and stream read loop.
pub mod session;
/// Trust capability and transport seam.
pub mod transport;

//! Client-side change-notification streaming for JStorage servers.
//!
//! The crate is organized by concern:
//! - `notify`: notification manager, wire protocol, event types, and the
//!   transport/trust seam.
//! - `retry`: reconnect backoff policy used by the stream supervisor.

/// Notification stream manager, protocol types, and transport seam.
pub mod notify;
/// Reconnect backoff policy.
pub mod retry;

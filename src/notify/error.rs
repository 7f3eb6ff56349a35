use thiserror::Error;

/// Errors produced while opening or authenticating a notification stream.
///
/// These never cross the public API boundary of
/// [`NotificationManager::start`](crate::notify::manager::NotificationManager::start);
/// they are logged and reported as a `false` return instead.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// No bearer token was configured before `start` was called.
    #[error("no login token configured")]
    MissingToken,

    /// Transport-level I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake error.
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The server's status line did not accept the subscription.
    #[error("server rejected subscription: {status}")]
    Rejected {
        /// Trimmed status line as received, or a description of the failure.
        status: String,
    },
}

//! Protocol handshake and stream read loop.
//!
//! Both functions are generic over the buffered byte stream so the manager
//! can run them over any [`NotificationTransport`](crate::notify::transport::NotificationTransport)
//! and tests can drive them over in-memory pipes.

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::notify::error::NotifyError;
use crate::notify::event::DataNotification;
use crate::notify::selection::Selection;

/// Authenticates and subscribes over a freshly opened stream.
///
/// Writes the token header, the space-prefixed subscription line, and the
/// empty header terminator, then reads exactly one status line. The line is
/// accepted only if it contains `200 OK`; anything else, including
/// end-of-stream, fails the handshake. On failure the caller drops the
/// stream, which releases the underlying socket.
pub async fn handshake<S>(
    stream: &mut S,
    token: &SecretString,
    selection: &Selection,
) -> Result<(), NotifyError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let header = format!(
        "Token: {}\n {}\n\n",
        token.expose_secret(),
        selection.to_wire()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.flush().await?;

    let mut status = String::new();
    let read = stream.read_line(&mut status).await?;
    if read == 0 {
        return Err(NotifyError::Rejected {
            status: "connection closed before status line".to_string(),
        });
    }
    if !status.contains("200 OK") {
        return Err(NotifyError::Rejected {
            status: status.trim().to_string(),
        });
    }
    Ok(())
}

/// Reads newline-terminated JSON objects until the stream ends.
///
/// Each decoded notification is handed to `on_event` in arrival order. A line
/// that fails to decode is skipped and the loop continues; one malformed line
/// must never kill an otherwise healthy stream. The loop ends only on
/// end-of-stream or a read error.
pub async fn read_events<S, F>(stream: &mut S, mut on_event: F)
where
    S: AsyncBufRead + Unpin,
    F: FnMut(DataNotification),
{
    let mut line = String::new();
    loop {
        line.clear();
        match stream.read_line(&mut line).await {
            Ok(0) => {
                debug!(event = "stream_closed_by_peer");
                return;
            }
            Ok(_) => match DataNotification::from_line(line.trim_end()) {
                Ok(notification) => on_event(notification),
                Err(error) => {
                    trace!(event = "notification_line_skipped", %error);
                }
            },
            Err(error) => {
                debug!(event = "stream_read_failed", %error);
                return;
            }
        }
    }
}

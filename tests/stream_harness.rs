//! End-to-end tests against a mock line-protocol server.
//!
//! The mock server speaks the real wire protocol over plain TCP; a test
//! transport stands in for the TLS transport and counts connection attempts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jstorage_notify::notify::error::NotifyError;
use jstorage_notify::notify::event::{DataNotification, NotificationKind};
use jstorage_notify::notify::manager::{NotificationManager, NotificationOptions};
use jstorage_notify::notify::selection::Selection;
use jstorage_notify::notify::transport::{NotificationTransport, ServerTrust, StreamIo};
use jstorage_notify::retry::ReconnectPolicy;
use secrecy::SecretString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const TEST_TOKEN: &str = "test-token";
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Plain-TCP stand-in for the TLS transport; counts connection attempts.
struct TcpTransport {
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationTransport for TcpTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _trust: ServerTrust,
    ) -> Result<Box<dyn StreamIo>, NotifyError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Box::new(stream))
    }
}

fn test_manager(
    policy: ReconnectPolicy,
) -> (
    NotificationManager,
    Arc<AtomicUsize>,
    mpsc::UnboundedReceiver<DataNotification>,
) {
    let connects = Arc::new(AtomicUsize::new(0));
    let manager = NotificationManager::with_transport(
        "127.0.0.1",
        Some(SecretString::new(TEST_TOKEN.to_string())),
        NotificationOptions {
            reconnect_policy: policy,
        },
        Arc::new(TcpTransport {
            connects: Arc::clone(&connects),
        }),
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    manager.add_listener(move |notification: &DataNotification| {
        let _ = event_tx.send(notification.clone());
    });

    (manager, connects, event_rx)
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: Some(3),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        jitter: Duration::ZERO,
    }
}

async fn bind_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server listener");
    let port = listener
        .local_addr()
        .expect("read mock server listener address")
        .port();
    (listener, port)
}

/// Reads client header lines up to and excluding the empty terminator line.
async fn read_header<S>(stream: &mut S) -> Vec<String>
where
    S: AsyncBufRead + Unpin,
{
    let mut header = Vec::new();
    loop {
        let mut line = String::new();
        let read = stream.read_line(&mut line).await.expect("read header line");
        if read == 0 || line == "\n" {
            return header;
        }
        header.push(line);
    }
}

async fn recv_event(rx: &mut mpsc::UnboundedReceiver<DataNotification>) -> DataNotification {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("listener channel closed")
}

#[tokio::test]
async fn start_streams_events_in_order_and_skips_malformed_lines() {
    let (listener, port) = bind_listener().await;
    let (header_tx, header_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut stream = BufStream::new(socket);
        let header = read_header(&mut stream).await;
        let _ = header_tx.send(header);

        stream
            .write_all(
                concat!(
                    "jstorage 200 OK\n",
                    "{\"content\":\"created\",\"timestamp\":1,\"database\":\"db\"}\n",
                    "this is not json\n",
                    "{\"content\":\"graduated\",\"timestamp\":2}\n",
                    "{\"content\":\"heartbeat\",\"timestamp\":3}\n",
                )
                .as_bytes(),
            )
            .await
            .expect("write stream");
        stream.flush().await.expect("flush stream");

        // Hold the connection open until the client tears it down.
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (manager, connects, mut events) = test_manager(fast_policy());
    let selection = Selection::new()
        .with_category("Heartbeat")
        .with_filter("MyDB", "users");

    assert!(manager.start(selection, port, false).await);

    let first = recv_event(&mut events).await;
    assert_eq!(first.kind, NotificationKind::Created);
    assert_eq!(first.timestamp, 1);
    assert_eq!(first.database.as_deref(), Some("db"));

    let second = recv_event(&mut events).await;
    assert_eq!(second.kind, NotificationKind::Heartbeat);
    assert_eq!(second.timestamp, 3);

    let header = timeout(RECV_TIMEOUT, header_rx)
        .await
        .expect("timed out waiting for header")
        .expect("header channel closed");
    assert_eq!(header[0], format!("Token: {TEST_TOKEN}\n"));
    assert_eq!(header[1], " heartbeat MyDB:users\n");
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    manager.stop().await;
    server.await.expect("mock server task should join");
}

#[tokio::test]
async fn start_returns_false_when_server_rejects_subscription() {
    let (listener, port) = bind_listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut stream = BufStream::new(socket);
        let _ = read_header(&mut stream).await;
        stream
            .write_all(b"jstorage 403 FORBIDDEN\n")
            .await
            .expect("write status");
        stream.flush().await.expect("flush status");
    });

    let (manager, connects, _events) = test_manager(fast_policy());
    assert!(!manager.start(Selection::new(), port, false).await);
    server.await.expect("mock server task should join");

    // A failed start is terminal for that attempt; no background retry.
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn peer_close_triggers_exactly_one_reconnect() {
    let (listener, port) = bind_listener().await;

    let server = tokio::spawn(async move {
        // First session: one event, then server-side close.
        {
            let (socket, _) = listener.accept().await.expect("accept first");
            let mut stream = BufStream::new(socket);
            let _ = read_header(&mut stream).await;
            stream
                .write_all(b"jstorage 200 OK\n{\"content\":\"created\",\"timestamp\":100}\n")
                .await
                .expect("write first session");
            stream.flush().await.expect("flush first session");
        }

        // Reconnected session: a fresh handshake, then another event.
        let (socket, _) = listener.accept().await.expect("accept second");
        let mut stream = BufStream::new(socket);
        let header = read_header(&mut stream).await;
        assert_eq!(header[0], format!("Token: {TEST_TOKEN}\n"));
        stream
            .write_all(b"jstorage 200 OK\n{\"content\":\"updated\",\"timestamp\":200}\n")
            .await
            .expect("write second session");
        stream.flush().await.expect("flush second session");

        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (manager, connects, mut events) = test_manager(fast_policy());
    assert!(manager.start(Selection::new().with_category("all"), port, false).await);

    let first = recv_event(&mut events).await;
    assert_eq!(first.timestamp, 100);

    let second = recv_event(&mut events).await;
    assert_eq!(second.kind, NotificationKind::Updated);
    assert_eq!(second.timestamp, 200);
    assert_eq!(connects.load(Ordering::SeqCst), 2);

    manager.stop().await;
    assert!(!manager.reconnect_enabled());
    server.await.expect("mock server task should join");

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_prevents_reconnect_after_peer_close() {
    let (listener, port) = bind_listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut stream = BufStream::new(socket);
        let _ = read_header(&mut stream).await;
        stream
            .write_all(b"jstorage 200 OK\n{\"content\":\"heartbeat\",\"timestamp\":1}\n")
            .await
            .expect("write stream");
        stream.flush().await.expect("flush stream");

        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (manager, connects, mut events) = test_manager(fast_policy());
    assert!(manager.start(Selection::new(), port, false).await);
    let _ = recv_event(&mut events).await;

    manager.stop().await;
    server.await.expect("mock server task should join");

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnect_gives_up_after_configured_ceiling() {
    let (listener, port) = bind_listener().await;

    let server = tokio::spawn(async move {
        // Serve one good session, then refuse every reconnect handshake.
        {
            let (socket, _) = listener.accept().await.expect("accept first");
            let mut stream = BufStream::new(socket);
            let _ = read_header(&mut stream).await;
            stream
                .write_all(b"jstorage 200 OK\n")
                .await
                .expect("write status");
            stream.flush().await.expect("flush status");
        }
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let mut stream = BufStream::new(socket);
            let _ = read_header(&mut stream).await;
            if stream.write_all(b"jstorage 403 FORBIDDEN\n").await.is_err() {
                return;
            }
            let _ = stream.flush().await;
        }
    });

    let policy = ReconnectPolicy {
        max_attempts: Some(2),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
        jitter: Duration::ZERO,
    };
    let (manager, connects, _events) = test_manager(policy);
    assert!(manager.start(Selection::new(), port, false).await);

    // First connect plus exactly two failed reconnect attempts.
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(connects.load(Ordering::SeqCst), 3);

    manager.stop().await;
    server.abort();
}

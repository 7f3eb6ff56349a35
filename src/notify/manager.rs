//! Connection supervisor and listener dispatch.
//!
//! [`NotificationManager`] is the single authority for opening, closing, and
//! re-opening the stream session. All session transitions go through one
//! `Mutex`-guarded slot, so at most one handshake is in flight at a time and
//! the background reader never races the caller on teardown.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use secrecy::SecretString;
use tokio::io::BufStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::notify::error::NotifyError;
use crate::notify::event::DataNotification;
use crate::notify::selection::Selection;
use crate::notify::session::{handshake, read_events};
use crate::notify::transport::{NotificationTransport, ServerTrust, StreamIo, TlsTransport};
use crate::retry::ReconnectPolicy;

/// Manager configuration beyond host and credentials.
#[derive(Clone, Debug, Default)]
pub struct NotificationOptions {
    /// Backoff policy for automatic reconnects.
    pub reconnect_policy: ReconnectPolicy,
}

/// Receives decoded notifications.
///
/// Invoked synchronously on the stream reader's task, in registration order.
pub trait NotificationListener: Send + Sync {
    /// Called once per decoded notification.
    fn on_notification(&self, notification: &DataNotification);
}

impl<F> NotificationListener for F
where
    F: Fn(&DataNotification) + Send + Sync,
{
    fn on_notification(&self, notification: &DataNotification) {
        self(notification)
    }
}

/// Parameters of the active connection attempt, reused verbatim on reconnect.
#[derive(Clone, Debug)]
struct SessionParams {
    selection: Selection,
    port: u16,
    trust: ServerTrust,
}

#[derive(Default)]
struct SessionSlot {
    reader: Option<JoinHandle<()>>,
    params: Option<SessionParams>,
}

struct ManagerInner {
    host: String,
    token: Option<SecretString>,
    transport: Arc<dyn NotificationTransport>,
    reconnect_policy: ReconnectPolicy,
    listeners: RwLock<Vec<Arc<dyn NotificationListener>>>,
    reconnect: AtomicBool,
    session: Mutex<SessionSlot>,
}

/// Supervises one logical notification stream session.
///
/// Cloning yields another handle to the same session and listener registry.
#[derive(Clone)]
pub struct NotificationManager {
    inner: Arc<ManagerInner>,
}

impl NotificationManager {
    /// Creates a manager using the production TLS transport.
    pub fn new(host: impl Into<String>, token: Option<SecretString>) -> Self {
        Self::with_options(host, token, NotificationOptions::default())
    }

    /// Creates a manager with explicit options.
    pub fn with_options(
        host: impl Into<String>,
        token: Option<SecretString>,
        options: NotificationOptions,
    ) -> Self {
        Self::with_transport(host, token, options, Arc::new(TlsTransport))
    }

    /// Creates a manager over an injected transport.
    pub fn with_transport(
        host: impl Into<String>,
        token: Option<SecretString>,
        options: NotificationOptions,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                host: host.into(),
                token,
                transport,
                reconnect_policy: options.reconnect_policy,
                listeners: RwLock::new(Vec::new()),
                reconnect: AtomicBool::new(true),
                session: Mutex::new(SessionSlot::default()),
            }),
        }
    }

    /// Starts receiving notifications for the given selection.
    ///
    /// Any previous session is torn down first. Returns `true` only after a
    /// successful handshake with the stream reader running; on any failure
    /// everything acquired so far is released and `false` is returned. No
    /// error crosses this boundary; details go to the log. Re-enables
    /// auto-reconnect.
    pub async fn start(
        &self,
        selection: Selection,
        port: u16,
        accept_invalid_certs: bool,
    ) -> bool {
        let trust = if accept_invalid_certs {
            ServerTrust::AcceptInvalidCerts
        } else {
            ServerTrust::SystemRoots
        };
        let params = SessionParams {
            selection,
            port,
            trust,
        };

        self.inner.reconnect.store(true, Ordering::SeqCst);
        let mut slot = self.inner.session.lock().await;
        teardown_slot(&mut slot);

        match self.inner.open_session(&params).await {
            Ok(reader) => {
                debug!(event = "notification_stream_connected", port);
                slot.reader = Some(reader);
                slot.params = Some(params);
                true
            }
            Err(error) => {
                warn!(event = "notification_connect_failed", port, %error);
                false
            }
        }
    }

    /// Disables auto-reconnect and closes the transport. Idempotent.
    ///
    /// This is the only way to make a lost stream stay down.
    pub async fn stop(&self) {
        self.inner.reconnect.store(false, Ordering::SeqCst);
        let mut slot = self.inner.session.lock().await;
        teardown_slot(&mut slot);
        debug!(event = "notification_stream_stopped");
    }

    /// Whether a terminated stream will attempt to reconnect.
    pub fn reconnect_enabled(&self) -> bool {
        self.inner.reconnect.load(Ordering::SeqCst)
    }

    /// Registers a listener. Dispatch follows registration order.
    pub fn add_listener(&self, listener: impl NotificationListener + 'static) {
        if let Ok(mut listeners) = self.inner.listeners.write() {
            listeners.push(Arc::new(listener));
        }
    }

    /// Removes all registered listeners.
    pub fn clear_listeners(&self) {
        if let Ok(mut listeners) = self.inner.listeners.write() {
            listeners.clear();
        }
    }

    /// Delivers one notification to every registered listener.
    pub fn dispatch(&self, notification: &DataNotification) {
        self.inner.fan_out(notification);
    }
}

impl ManagerInner {
    /// Connects, authenticates, and spawns the reader for one session.
    ///
    /// Called with the session slot locked; the missing-token check runs
    /// before any network I/O. Returns a boxed future: the reader task it
    /// spawns eventually re-enters this function through the reconnect
    /// worker, and that cycle must not flow through an opaque future type.
    fn open_session<'a>(
        self: &'a Arc<Self>,
        params: &'a SessionParams,
    ) -> Pin<Box<dyn Future<Output = Result<JoinHandle<()>, NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            let token = self.token.as_ref().ok_or(NotifyError::MissingToken)?;
            let io = self
                .transport
                .connect(&self.host, params.port, params.trust)
                .await?;
            let mut stream = BufStream::new(io);
            handshake(&mut stream, token, &params.selection).await?;
            let inner = Arc::clone(self);
            Ok(tokio::spawn(run_reader(inner, stream)))
        })
    }

    fn fan_out(&self, notification: &DataNotification) {
        let listeners = self
            .listeners
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        for listener in listeners {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| listener.on_notification(notification)));
            if outcome.is_err() {
                warn!(event = "notification_listener_panicked");
            }
        }
    }
}

fn teardown_slot(slot: &mut SessionSlot) {
    // Aborting the reader drops the buffered stream, which closes the
    // socket and is the only cancellation primitive for a blocked read.
    if let Some(reader) = slot.reader.take() {
        reader.abort();
    }
    slot.params = None;
}

/// Reader task: decodes and dispatches until the stream ends, then hands
/// control to the reconnect worker when reconnecting is still allowed.
///
/// Explicit teardown aborts this task, so the reconnect tail only runs after
/// a natural termination (peer close or read error).
async fn run_reader(inner: Arc<ManagerInner>, mut stream: BufStream<Box<dyn StreamIo>>) {
    read_events(&mut stream, |notification| inner.fan_out(&notification)).await;
    drop(stream);

    {
        let mut slot = inner.session.lock().await;
        slot.reader = None;
    }
    if inner.reconnect.load(Ordering::SeqCst) {
        tokio::spawn(run_reconnect(inner));
    } else {
        debug!(event = "notification_stream_ended", reconnect = false);
    }
}

/// Iterative reconnect worker, one per stream termination.
///
/// Each attempt re-runs the full session-open path under the session lock
/// with the original parameters; a fresh handshake every time, no session
/// resumption. Backs off between attempts and honors the configured ceiling.
async fn run_reconnect(inner: Arc<ManagerInner>) {
    let policy = inner.reconnect_policy.clone();
    let mut attempt: usize = 1;
    loop {
        if !inner.reconnect.load(Ordering::SeqCst) {
            debug!(event = "notification_reconnect_disabled");
            return;
        }

        {
            let mut slot = inner.session.lock().await;
            if slot.reader.is_some() {
                // A concurrent start already opened a new session.
                return;
            }
            let Some(params) = slot.params.clone() else {
                return;
            };
            match inner.open_session(&params).await {
                Ok(reader) => {
                    debug!(event = "notification_stream_reconnected", attempt);
                    slot.reader = Some(reader);
                    return;
                }
                Err(error) => {
                    warn!(event = "notification_reconnect_failed", attempt, %error);
                }
            }
        }

        if let Some(max_attempts) = policy.max_attempts {
            if attempt >= max_attempts {
                warn!(event = "notification_reconnect_gave_up", attempts = attempt);
                return;
            }
        }
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
        attempt += 1;
    }
}

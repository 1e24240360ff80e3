//! NetworkFeed: tag batches over a persistent message connection.
//!
//! One worker task per `start()` owns the whole connection lifecycle:
//! connect, read messages until the connection ends, report the transition,
//! sleep the fixed backoff, and connect again. Because the backoff is a plain
//! `sleep` inside that single loop there is never more than one pending
//! reconnect, however often the connection drops.
//!
//! Connection state is published on a typed broadcast channel
//! ([`NetworkFeed::subscribe_status`]), separate from the data callback.
//! Each worker publishes under a generation number; `stop()` retires the
//! generation and reports the disconnect itself, so a worker that has not yet
//! exited can never publish after a restarted feed's `Connected`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::config::NetworkFeedConfig;
use crate::error::{log_feed_error, FeedError};

use super::payload::parse_payload;
use super::{ConnectionStatus, DataCallback, DataFeed};

const STATUS_CHANNEL_CAPACITY: usize = 32;

/// Message received from a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Text(String),
    Binary(Vec<u8>),
    /// Peer closed the connection
    Close,
}

/// Stream of messages for one established connection.
pub type MessageStream = BoxStream<'static, Result<FeedMessage, FeedError>>;

/// Opens connections for a [`NetworkFeed`].
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<MessageStream, FeedError>>;
}

/// WebSocket client connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<MessageStream, FeedError>> {
        let url = url.to_string();
        async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| FeedError::ConnectFailed {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;

            let messages = socket.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(FeedMessage::Text(text))),
                    Ok(Message::Binary(bytes)) => Some(Ok(FeedMessage::Binary(bytes))),
                    Ok(Message::Close(_)) => Some(Ok(FeedMessage::Close)),
                    // Ping/pong are answered by the protocol layer
                    Ok(_) => None,
                    Err(err) => Some(Err(FeedError::Transport {
                        reason: err.to_string(),
                    })),
                }
            });
            Ok(messages.boxed())
        }
        .boxed()
    }
}

/// Which worker may publish status, and whether its connection is open.
#[derive(Debug, Default)]
struct Link {
    generation: u64,
    connected: bool,
}

/// State shared between the feed handle and its worker.
struct Shared {
    url: String,
    scale_factor: f64,
    reconnect_interval: Duration,
    connector: Arc<dyn Connector>,
    callback: RwLock<Option<DataCallback>>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    attempts: AtomicU64,
    link: Mutex<Link>,
}

impl Shared {
    /// Publish `status` if `generation` is still the live worker.
    fn publish(&self, generation: u64, status: ConnectionStatus) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if link.generation != generation {
            tracing::debug!("[NetworkFeed] Dropping {:?} from retired worker", status);
            return;
        }
        link.connected = status == ConnectionStatus::Connected;
        tracing::info!("[NetworkFeed] Status: {:?} ({})", status, self.url);
        let _ = self.status_tx.send(status);
    }

    fn current_generation(&self) -> u64 {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// Retire the live worker, reporting `Disconnected` if it was connected.
    fn retire_worker(&self) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.generation += 1;
        if link.connected {
            link.connected = false;
            tracing::info!("[NetworkFeed] Status: Disconnected ({})", self.url);
            let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_payload(text, self.scale_factor) {
            Ok(batch) => {
                tracing::trace!("[NetworkFeed] Batch of {} tags", batch.len());
                let callback = self
                    .callback
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(callback) = callback {
                    callback(batch);
                }
            }
            Err(err) => log_feed_error(&err, "NetworkFeed::handle_message"),
        }
    }

    fn handle_message(&self, message: FeedMessage) {
        match message {
            FeedMessage::Text(text) => self.handle_text(&text),
            FeedMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.handle_text(text),
                Err(err) => log_feed_error(
                    &FeedError::MalformedPayload {
                        reason: format!("binary message is not UTF-8: {}", err),
                    },
                    "NetworkFeed::handle_message",
                ),
            },
            FeedMessage::Close => {}
        }
    }
}

enum SessionEnd {
    Closed,
    Failed,
    Shutdown,
}

/// Reconnecting network feed.
pub struct NetworkFeed {
    shared: Arc<Shared>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl NetworkFeed {
    /// WebSocket feed for `config.url`.
    pub fn new(config: &NetworkFeedConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(config: &NetworkFeedConfig, connector: Arc<dyn Connector>) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                url: config.url.clone(),
                scale_factor: config.scale_factor,
                reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
                connector,
                callback: RwLock::new(None),
                status_tx,
                attempts: AtomicU64::new(0),
                link: Mutex::new(Link::default()),
            }),
            shutdown: None,
            task: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Connection attempts made since construction.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    async fn run(shared: Arc<Shared>, generation: u64, mut shutdown: watch::Receiver<bool>) {
        loop {
            let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                "[NetworkFeed] Connecting to {} (attempt {})",
                shared.url,
                attempt
            );

            let connected = tokio::select! {
                result = shared.connector.connect(&shared.url) => result,
                _ = shutdown.changed() => return,
            };

            let end = match connected {
                Ok(stream) => {
                    shared.publish(generation, ConnectionStatus::Connected);
                    Self::read_session(&shared, stream, &mut shutdown).await
                }
                Err(err) => {
                    log_feed_error(&err, "NetworkFeed::connect");
                    SessionEnd::Failed
                }
            };

            match end {
                // `stop()` already reported the disconnect
                SessionEnd::Shutdown => return,
                SessionEnd::Failed => {
                    shared.publish(generation, ConnectionStatus::Error);
                    shared.publish(generation, ConnectionStatus::Disconnected);
                }
                SessionEnd::Closed => shared.publish(generation, ConnectionStatus::Disconnected),
            }

            tracing::info!(
                "[NetworkFeed] Reconnecting in {:.1}s",
                shared.reconnect_interval.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(shared.reconnect_interval) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn read_session(
        shared: &Shared,
        mut stream: MessageStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(FeedMessage::Close)) | None => return SessionEnd::Closed,
                    Some(Ok(message)) => shared.handle_message(message),
                    Some(Err(err)) => {
                        log_feed_error(&err, "NetworkFeed::read");
                        return SessionEnd::Failed;
                    }
                },
                _ = shutdown.changed() => return SessionEnd::Shutdown,
            }
        }
    }
}

impl DataFeed for NetworkFeed {
    fn start(&mut self) -> Result<(), FeedError> {
        if self.is_running() {
            return Err(FeedError::AlreadyRunning);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let generation = shared.current_generation();
        self.task = Some(handle.spawn(Self::run(shared, generation, shutdown_rx)));
        self.shutdown = Some(shutdown_tx);
        tracing::info!("[NetworkFeed] Started for {}", self.shared.url);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
            self.shared.retire_worker();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn on_data(&mut self, callback: DataCallback) {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for NetworkFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

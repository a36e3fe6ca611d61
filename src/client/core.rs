use super::{ClientState, ConnectionManager, ConnectionState, GatewayBuilder, GatewayOptions};
use crate::infrastructure::{FrameStream, KeepAlive, ProxyConfig, Timer, WebSocketFactory};
use crate::task::TaskReporter;
use crate::types::{CONNECT_PATH, Frame, Result};
use futures::stream::StreamExt;
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, watch};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// The relay gateway: one persistent duplex connection to the coordinating server.
///
/// `Gateway` opens `wss://{server}/connect`, registers the configured user and
/// device every time the channel opens, keeps it alive with periodic pings and
/// carries task outcomes back to the server. Frames handed to it while the channel
/// is down are queued and delivered after the next successful open.
///
/// Cloning is cheap; all clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use relay_gateway::{Gateway, GatewayOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = Gateway::new(GatewayOptions {
///     server: "relay.example.com".to_string(),
///     user: "alice".to_string(),
///     device: "laptop-1".to_string(),
///     ..Default::default()
/// })?;
///
/// gateway.connect().await?;
/// gateway.transfer_result("task-1", "ok", 200);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Gateway {
    pub(crate) options: Arc<GatewayOptions>,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) state: Arc<RwLock<ClientState>>,
}

/// Non-owning handle used by the gateway's own background tasks
#[derive(Clone)]
pub(crate) struct WeakGateway {
    options: Arc<GatewayOptions>,
    proxy: Option<ProxyConfig>,
    connection: Weak<ConnectionManager>,
    state: Weak<RwLock<ClientState>>,
}

impl WeakGateway {
    pub(crate) fn upgrade(&self) -> Option<Gateway> {
        Some(Gateway {
            options: Arc::clone(&self.options),
            proxy: self.proxy.clone(),
            connection: self.connection.upgrade()?,
            state: self.state.upgrade()?,
        })
    }

    /// Upgrades unless every handle is gone or the last disconnect was manual
    async fn live(&self) -> Option<Gateway> {
        let Some(gateway) = self.upgrade() else {
            tracing::debug!("Gateway dropped, stopping reconnection");
            return None;
        };
        if gateway.was_manual_disconnect().await {
            tracing::info!("Manual disconnect detected, will not attempt to reconnect");
            return None;
        }
        Some(gateway)
    }

    /// Retries `connect()` with backoff until the channel is open.
    ///
    /// The gateway is only upgraded for the duration of one attempt, so dropping
    /// the last user handle ends the loop at the next attempt.
    pub(crate) async fn reconnect_with(&self, timer: &mut Timer) {
        loop {
            if self.live().await.is_none() {
                return;
            }

            timer.schedule_timeout().await;

            let Some(gateway) = self.live().await else {
                return;
            };
            if matches!(
                gateway.connection.state(),
                ConnectionState::Open | ConnectionState::Connecting
            ) {
                tracing::info!("Already connected or connecting, stopping reconnection attempts");
                return;
            }

            tracing::info!("Attempting to reconnect (attempt {})...", timer.attempts());
            match gateway.connect().await {
                Ok(()) => {
                    tracing::info!("Reconnected successfully");
                    timer.reset();
                    return;
                }
                Err(e) => {
                    tracing::error!("Reconnection attempt failed: {}", e);
                }
            }
        }
    }
}

impl Gateway {
    /// Creates a gateway without connecting.
    ///
    /// Spawns the outbound writer loop (and the reconnect watcher unless
    /// `auto_reconnect` is off), so it must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`](crate::GatewayError::Config) for a blank
    /// server, user or device and [`GatewayError::Proxy`](crate::GatewayError::Proxy)
    /// for an unusable proxy descriptor.
    pub fn new(options: GatewayOptions) -> Result<Self> {
        GatewayBuilder::new(options).map(|builder| builder.build())
    }

    /// Creates a gateway with default settings and makes the first connection attempt.
    ///
    /// A failed first attempt is logged, not returned: the reconnect watcher keeps
    /// trying in the background. Only invalid options produce an error.
    pub async fn open(
        server: impl Into<String>,
        user: impl Into<String>,
        device: impl Into<String>,
        proxy: Option<String>,
    ) -> Result<Self> {
        let gateway = Self::new(GatewayOptions {
            server: server.into(),
            user: user.into(),
            device: device.into(),
            proxy,
            ..Default::default()
        })?;

        if let Err(e) = gateway.connect().await {
            tracing::error!("Initial connection failed: {}", e);
        }
        Ok(gateway)
    }

    pub(crate) fn downgrade(&self) -> WeakGateway {
        WeakGateway {
            options: Arc::clone(&self.options),
            proxy: self.proxy.clone(),
            connection: Arc::downgrade(&self.connection),
            state: Arc::downgrade(&self.state),
        }
    }

    pub(crate) async fn was_manual_disconnect(&self) -> bool {
        self.state.read().await.was_manual_disconnect
    }

    /// Opens the duplex channel and registers.
    ///
    /// Returns immediately if the channel is already open or opening. On success
    /// the `register` frame has been written (it is always the first frame of a
    /// connection), the state is `Open` and the keep-alive loop runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy tunnel, TCP/TLS connection, WebSocket
    /// handshake or registration write fails. The state is back to `Closed` then.
    pub async fn connect(&self) -> Result<()> {
        if !self.connection.begin_connecting() {
            return Ok(());
        }

        match self.open_channel().await {
            Ok(()) => {
                tracing::info!("Gateway connected.");
                Ok(())
            }
            Err(e) => {
                self.connection.clear_writer().await;
                self.connection.set_state(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    async fn open_channel(&self) -> Result<()> {
        let url = self.endpoint_url()?;
        tracing::info!("Connecting to {}", url);

        let (write_half, read_half) = WebSocketFactory::create(&url, self.proxy.as_ref()).await?;

        let generation = {
            let mut state = self.state.write().await;
            state.was_manual_disconnect = false;
            state.next_generation()
        };

        self.connection.set_writer(write_half).await;
        self.connection
            .write_now(&Frame::register(
                self.options.user.as_str(),
                self.options.device.as_str(),
            ))
            .await?;

        self.spawn_reader(read_half, generation).await;
        self.connection.set_state(ConnectionState::Open);

        let keepalive = KeepAlive::new(Arc::downgrade(&self.connection))
            .with_interval(self.options.keepalive_interval)
            .spawn();
        self.state.write().await.task_manager.track(keepalive);

        Ok(())
    }

    async fn spawn_reader(&self, mut read_half: FrameStream, generation: u64) {
        let gateway = self.downgrade();

        let mut state = self.state.write().await;
        state.task_manager.spawn(async move {
            tracing::debug!("Starting read task");
            while let Some(msg_result) = read_half.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        tracing::info!("Message received: {}", text);
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::info!("Message received: {} bytes of binary data", data.len());
                    }
                    Ok(Message::Close(frame)) => {
                        if let Some(close_frame) = frame {
                            tracing::warn!(
                                "Server closed connection: code={:?}, reason='{}'",
                                close_frame.code,
                                close_frame.reason
                            );
                        } else {
                            tracing::warn!("Server closed connection without close frame");
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        tracing::debug!("Received ping ({} bytes)", data.len());
                    }
                    Ok(Message::Pong(data)) => {
                        tracing::debug!("Received pong ({} bytes)", data.len());
                    }
                    Ok(Message::Frame(_)) => {
                        tracing::debug!("Received raw frame (internal)");
                    }
                    // The stream itself decides when the channel is gone
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                    }
                }
            }

            if let Some(gateway) = gateway.upgrade() {
                gateway.handle_closed(generation).await;
            }
            tracing::debug!("Read task finished");
        });
    }

    async fn handle_closed(&self, generation: u64) {
        if self.state.read().await.generation != generation {
            return;
        }
        self.connection.clear_writer().await;
        self.connection.set_state(ConnectionState::Closed);
        tracing::info!("Gateway disconnected.");
    }

    /// Keeps calling [`connect()`](Self::connect) with backoff until the channel is
    /// open, a manual disconnect happens or every other handle is dropped.
    pub async fn try_reconnect(&self) {
        let mut timer = Timer::new(self.options.reconnect_intervals.clone());
        self.downgrade().reconnect_with(&mut timer).await;
    }

    /// Closes the channel and stops reconnecting.
    ///
    /// Queued frames stay queued; they go out if [`connect()`](Self::connect) is
    /// called again.
    pub async fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.was_manual_disconnect = true;
            state.task_manager.abort_all();
        }

        if self.connection.state() == ConnectionState::Closed {
            return Ok(());
        }

        tracing::info!("Disconnecting from gateway server");
        self.connection.close().await?;
        tracing::info!("Gateway disconnected.");
        Ok(())
    }

    /// Queues a frame for the server. Returns immediately and never fails; while the
    /// channel is not open the frame is retried every `send_retry_backoff`.
    pub fn send_message(&self, frame: Frame) {
        self.connection.send_message(frame);
    }

    /// Sends `{type: "response", taskid, response, status}`
    pub fn transfer_result(&self, taskid: &str, response: &str, status: u16) {
        self.send_message(Frame::response(taskid, response, status));
    }

    /// Sends `{type: "error", taskid, error, code}`
    pub fn transfer_error(&self, taskid: &str, error: &str, code: u16) {
        self.send_message(Frame::error(taskid, error, code));
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Frames accepted by [`send_message`](Self::send_message) but not yet written
    pub fn pending_frames(&self) -> usize {
        self.connection.pending_frames()
    }

    pub fn server(&self) -> &str {
        &self.options.server
    }

    pub fn user(&self) -> &str {
        &self.options.user
    }

    pub fn device(&self) -> &str {
        &self.options.device
    }

    /// `wss://{server}/connect`, or `ws://` when TLS is disabled
    pub fn endpoint_url(&self) -> Result<Url> {
        let scheme = if self.options.use_tls { "wss" } else { "ws" };
        let url = Url::parse(&format!(
            "{}://{}{}",
            scheme, self.options.server, CONNECT_PATH
        ))?;
        Ok(url)
    }
}

impl TaskReporter for Gateway {
    fn transfer_result(&self, taskid: &str, response: &str, status: u16) {
        Gateway::transfer_result(self, taskid, response, status);
    }

    fn transfer_error(&self, taskid: &str, error: &str, code: u16) {
        Gateway::transfer_error(self, taskid, error, code);
    }
}

use crate::infrastructure::FrameSink;
use crate::types::{Frame, GatewayError, Result, SEND_RETRY_BACKOFF};
use futures::SinkExt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Owns the write half of the duplex channel and the outbound frame queue.
///
/// Callers enqueue frames with [`send_message`](Self::send_message); a single writer
/// loop (see [`spawn_writer`](Self::spawn_writer)) drains the queue in order. A frame
/// that cannot be written because the channel is not open stays at the head of the
/// queue and is retried after the send backoff, so frames survive reconnects.
pub struct ConnectionManager {
    ws_write: Mutex<Option<FrameSink>>,
    state: watch::Sender<ConnectionState>,
    outbound_tx: mpsc::UnboundedSender<Frame>,
    outbound_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    pending: AtomicUsize,
    retry_backoff: Duration,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_retry_backoff(SEND_RETRY_BACKOFF)
    }

    pub fn with_retry_backoff(retry_backoff: Duration) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            ws_write: Mutex::new(None),
            state,
            outbound_tx,
            outbound_rx: std::sync::Mutex::new(Some(outbound_rx)),
            pending: AtomicUsize::new(0),
            retry_backoff,
        }
    }

    /// Sets the WebSocket write sink (called after a successful handshake)
    pub async fn set_writer(&self, writer: FrameSink) {
        *self.ws_write.lock().await = Some(writer);
    }

    /// Clears the writer (used when the read side ends)
    pub async fn clear_writer(&self) {
        *self.ws_write.lock().await = None;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn set_state(&self, new_state: ConnectionState) {
        let old = self.state.send_replace(new_state);
        if old != new_state {
            tracing::debug!("Connection state {:?} -> {:?}", old, new_state);
        }
    }

    /// Claims the `Connecting` state unless the channel is already open or opening.
    ///
    /// Check and set happen under the watch lock, so only one caller wins.
    pub fn begin_connecting(&self) -> bool {
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Open | ConnectionState::Connecting => false,
            ConnectionState::Closed | ConnectionState::Closing => {
                tracing::debug!("Connection state {:?} -> Connecting", state);
                *state = ConnectionState::Connecting;
                true
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Queues a frame for transmission. Never fails; the writer loop retries until
    /// the channel is open.
    pub fn send_message(&self, frame: Frame) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.outbound_tx.send(frame).is_err() {
            // Receiver only goes away with the writer loop's runtime
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Outbound queue closed, frame dropped");
        }
    }

    /// Frames queued but not yet written
    pub fn pending_frames(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Writes a frame right away, bypassing the queue. Used for registration, which
    /// must precede anything queued and happens before the state flips to `Open`.
    pub async fn write_now(&self, frame: &Frame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let message = Message::Text(json.into());

        let mut ws_guard = self.ws_write.lock().await;
        let Some(ws) = ws_guard.as_mut() else {
            return Err(GatewayError::NotConnected);
        };
        ws.send(message).await?;

        tracing::debug!("Sent {} frame", frame.kind());
        Ok(())
    }

    async fn write_queued(&self, frame: &Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.write_now(frame).await
    }

    /// Spawns the single writer loop. Only the first call spawns; later calls return `None`.
    pub fn spawn_writer(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self
            .outbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let connection = Arc::downgrade(self);
        let backoff = self.retry_backoff;

        Some(tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if !Self::deliver(&connection, &frame, backoff).await {
                    break;
                }
            }
            tracing::debug!("Writer loop finished");
        }))
    }

    /// Retries one frame until it is written. Returns false once the manager is gone.
    async fn deliver(connection: &Weak<Self>, frame: &Frame, backoff: Duration) -> bool {
        loop {
            let Some(conn) = connection.upgrade() else {
                return false;
            };

            match conn.write_queued(frame).await {
                Ok(()) => {
                    conn.pending.fetch_sub(1, Ordering::SeqCst);
                    return true;
                }
                Err(GatewayError::Serialization(e)) => {
                    conn.pending.fetch_sub(1, Ordering::SeqCst);
                    tracing::error!("Dropping unserializable {} frame: {}", frame.kind(), e);
                    return true;
                }
                Err(GatewayError::NotConnected) => {
                    tracing::warn!("Gateway not open; retrying {} frame...", frame.kind());
                }
                Err(e) => {
                    tracing::error!("Failed to write {} frame: {}; retrying", frame.kind(), e);
                }
            }

            drop(conn);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Closes the WebSocket connection gracefully
    pub async fn close(&self) -> Result<()> {
        self.set_state(ConnectionState::Closing);

        let result = {
            let mut ws_guard = self.ws_write.lock().await;
            let result = match ws_guard.as_mut() {
                Some(ws) => ws.close().await,
                None => Ok(()),
            };
            *ws_guard = None;
            result
        };

        self.set_state(ConnectionState::Closed);
        result.map_err(GatewayError::from)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc as fmpsc;
    use tokio_tungstenite::tungstenite::Error as WsError;

    /// A sink whose written frames come out of the returned receiver
    pub(crate) fn test_sink() -> (FrameSink, fmpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = fmpsc::unbounded::<Message>();
        let sink: FrameSink = Box::pin(tx.sink_map_err(|_| WsError::ConnectionClosed));
        (sink, rx)
    }

    pub(crate) fn decode(message: Message) -> Frame {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_while_open_is_written() {
        let conn = Arc::new(ConnectionManager::new());
        conn.spawn_writer().unwrap();
        let (sink, mut rx) = test_sink();
        conn.set_writer(sink).await;
        conn.set_state(ConnectionState::Open);

        conn.send_message(Frame::response("t1", "ok", 200));

        assert_eq!(decode(rx.next().await.unwrap()), Frame::response("t1", "ok", 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_closed_is_retried_until_open() {
        let conn = Arc::new(ConnectionManager::new());
        conn.spawn_writer().unwrap();
        let (sink, mut rx) = test_sink();
        conn.set_writer(sink).await;

        conn.send_message(Frame::Ping);
        conn.send_message(Frame::error("t2", "boom", 500));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(conn.pending_frames(), 2);
        assert!(rx.try_recv().is_err(), "nothing written while closed");

        conn.set_state(ConnectionState::Open);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(decode(rx.next().await.unwrap()), Frame::Ping);
        assert_eq!(decode(rx.next().await.unwrap()), Frame::error("t2", "boom", 500));
        assert_eq!(conn.pending_frames(), 0);
        assert!(rx.try_recv().is_err(), "no duplicates");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_spaced_by_backoff() {
        let conn = Arc::new(ConnectionManager::with_retry_backoff(Duration::from_secs(1)));
        conn.spawn_writer().unwrap();
        let (sink, mut rx) = test_sink();
        conn.set_writer(sink).await;

        conn.send_message(Frame::Ping);
        tokio::time::sleep(Duration::from_millis(100)).await;
        conn.set_state(ConnectionState::Open);

        // The first attempt failed at t=0, the next one is due at t=1s
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(decode(rx.next().await.unwrap()), Frame::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_survive_writer_swap() {
        let conn = Arc::new(ConnectionManager::new());
        conn.spawn_writer().unwrap();

        conn.send_message(Frame::response("t3", "late", 200));
        tokio::time::sleep(Duration::from_secs(5)).await;

        let (sink, mut rx) = test_sink();
        conn.set_writer(sink).await;
        conn.set_state(ConnectionState::Open);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            decode(rx.next().await.unwrap()),
            Frame::response("t3", "late", 200)
        );
    }

    #[tokio::test]
    async fn test_write_now_without_writer() {
        let conn = ConnectionManager::new();
        let err = conn.write_now(&Frame::Ping).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
    }

    #[tokio::test]
    async fn test_writer_spawns_once() {
        let conn = Arc::new(ConnectionManager::new());
        assert!(conn.spawn_writer().is_some());
        assert!(conn.spawn_writer().is_none());
    }

    #[tokio::test]
    async fn test_close_resets_state() {
        let conn = ConnectionManager::new();
        let (sink, _rx) = test_sink();
        conn.set_writer(sink).await;
        conn.set_state(ConnectionState::Open);

        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            conn.write_now(&Frame::Ping).await,
            Err(GatewayError::NotConnected)
        ));
    }

    #[test]
    fn test_only_one_caller_claims_connecting() {
        let conn = ConnectionManager::new();
        let mut rx = conn.subscribe_state();

        assert!(conn.begin_connecting());
        assert!(!conn.begin_connecting());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        conn.set_state(ConnectionState::Open);
        assert!(!conn.begin_connecting());

        conn.set_state(ConnectionState::Closed);
        rx.borrow_and_update();
        assert!(conn.begin_connecting());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let conn = Arc::new(ConnectionManager::new());
        let claims: Vec<_> = (0..16)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.begin_connecting() })
            })
            .collect();

        let mut winners = 0;
        for claim in claims {
            if claim.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

use crate::client::{ConnectionManager, ConnectionState};
use crate::types::{Frame, KEEPALIVE_INTERVAL};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Emits a `ping` frame every interval while the connection is open.
///
/// The loop ends as soon as the connection leaves `Open` or the manager is dropped;
/// the next open starts a fresh one.
pub struct KeepAlive {
    interval: Duration,
    connection: Weak<ConnectionManager>,
}

impl KeepAlive {
    pub fn new(connection: Weak<ConnectionManager>) -> Self {
        Self {
            interval: KEEPALIVE_INTERVAL,
            connection,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let Some(mut state_rx) = self.connection.upgrade().map(|c| c.subscribe_state()) else {
            return;
        };

        // First ping goes out one full interval after open
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(connection) = self.connection.upgrade() else {
                        break;
                    };
                    if !connection.is_connected() {
                        continue;
                    }
                    connection.send_message(Frame::Ping);
                    tracing::debug!("Queued keep-alive ping");
                }
                alive = async {
                    state_rx
                        .wait_for(|state| *state != ConnectionState::Open)
                        .await
                        .is_ok()
                } => {
                    if alive {
                        tracing::debug!("Connection left open state, stopping keep-alive");
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::connection::tests::{decode, test_sink};
    use std::sync::Arc;

    async fn open_connection() -> (
        Arc<ConnectionManager>,
        futures::channel::mpsc::UnboundedReceiver<tokio_tungstenite::tungstenite::Message>,
    ) {
        let conn = Arc::new(ConnectionManager::new());
        conn.spawn_writer().unwrap();
        let (sink, rx) = test_sink();
        conn.set_writer(sink).await;
        conn.set_state(ConnectionState::Open);
        (conn, rx)
    }

    fn drain(
        rx: &mut futures::channel::mpsc::UnboundedReceiver<tokio_tungstenite::tungstenite::Message>,
    ) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            frames.push(decode(message));
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_ping_per_interval_while_open() {
        let (conn, mut rx) = open_connection().await;
        let handle = KeepAlive::new(Arc::downgrade(&conn)).spawn();

        tokio::time::sleep(Duration::from_millis(19_900)).await;
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(40_200)).await;
        assert_eq!(drain(&mut rx), vec![Frame::Ping, Frame::Ping, Frame::Ping]);
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ping_after_close() {
        let (conn, mut rx) = open_connection().await;
        let handle = KeepAlive::new(Arc::downgrade(&conn))
            .with_interval(Duration::from_secs(5))
            .spawn();

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(drain(&mut rx), vec![Frame::Ping]);

        conn.set_state(ConnectionState::Closed);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(drain(&mut rx).is_empty());
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_manager_dropped() {
        let conn = Arc::new(ConnectionManager::new());
        conn.set_state(ConnectionState::Open);
        let handle = KeepAlive::new(Arc::downgrade(&conn))
            .with_interval(Duration::from_secs(1))
            .spawn();

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(conn);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }
}

use super::{ClientState, ConnectionManager, ConnectionState, Gateway};
use crate::infrastructure::{ProxyConfig, Timer};
use crate::types::{
    GatewayError, KEEPALIVE_INTERVAL, RECONNECT_INTERVALS, Result, SEND_RETRY_BACKOFF,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Server address; the channel opens at `wss://{server}/connect`
    pub server: String,
    pub user: String,
    pub device: String,
    /// SOCKS proxy descriptor, e.g. `socks5://127.0.0.1:1080`
    pub proxy: Option<String>,
    pub keepalive_interval: Duration,
    pub send_retry_backoff: Duration,
    /// Reconnect delays in milliseconds; the last one repeats
    pub reconnect_intervals: Vec<u64>,
    pub auto_reconnect: bool,
    /// `false` selects plain `ws://`
    pub use_tls: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            server: String::new(),
            user: String::new(),
            device: String::new(),
            proxy: None,
            keepalive_interval: KEEPALIVE_INTERVAL,
            send_retry_backoff: SEND_RETRY_BACKOFF,
            reconnect_intervals: RECONNECT_INTERVALS.to_vec(),
            auto_reconnect: true,
            use_tls: true,
        }
    }
}

/// Builder for Gateway that handles validation and background task startup
pub struct GatewayBuilder {
    options: GatewayOptions,
    proxy: Option<ProxyConfig>,
}

impl GatewayBuilder {
    pub fn new(options: GatewayOptions) -> Result<Self> {
        for (field, value) in [
            ("server", &options.server),
            ("user", &options.user),
            ("device", &options.device),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("{} is required", field)));
            }
        }

        let proxy = match options.proxy.as_deref() {
            Some(descriptor) => Some(ProxyConfig::parse(descriptor).inspect_err(|_| {
                tracing::error!("Invalid proxy format: {}", descriptor);
            })?),
            None => None,
        };

        Ok(Self { options, proxy })
    }

    /// Build the gateway and spawn its writer loop and reconnect watcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Gateway {
        let connection = Arc::new(ConnectionManager::with_retry_backoff(
            self.options.send_retry_backoff,
        ));

        // Outlives individual connections; ends when the last handle drops the manager
        connection.spawn_writer();

        let gateway = Gateway {
            options: Arc::new(self.options),
            proxy: self.proxy,
            connection,
            state: Arc::new(RwLock::new(ClientState::new())),
        };

        if gateway.options.auto_reconnect {
            spawn_reconnect_watcher(&gateway);
        }

        gateway
    }
}

fn spawn_reconnect_watcher(gateway: &Gateway) {
    let mut rx = gateway.connection.subscribe_state();
    let weak = gateway.downgrade();
    let mut timer = Timer::new(gateway.options.reconnect_intervals.clone());

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = *rx.borrow_and_update();
            if state != ConnectionState::Closed {
                continue;
            }

            let Some(gateway) = weak.upgrade() else {
                break;
            };
            let manual = gateway.was_manual_disconnect().await;
            drop(gateway);
            if manual {
                continue;
            }

            tracing::info!("State watcher detected disconnect, attempting reconnection...");
            weak.reconnect_with(&mut timer).await;
        }
        tracing::info!("Reconnection watcher task finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> GatewayOptions {
        GatewayOptions {
            server: "relay.example.com".into(),
            user: "alice".into(),
            device: "laptop".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_follow_protocol() {
        let defaults = GatewayOptions::default();
        assert_eq!(defaults.keepalive_interval, Duration::from_secs(20));
        assert_eq!(defaults.send_retry_backoff, Duration::from_secs(1));
        assert!(defaults.use_tls);
        assert!(defaults.auto_reconnect);
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        for blank in ["server", "user", "device"] {
            let mut opts = options();
            match blank {
                "server" => opts.server.clear(),
                "user" => opts.user = "  ".into(),
                _ => opts.device.clear(),
            }
            let err = GatewayBuilder::new(opts).err().unwrap();
            assert!(
                matches!(&err, GatewayError::Config(msg) if msg.contains(blank)),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let opts = GatewayOptions {
            proxy: Some("ftp://nope".into()),
            ..options()
        };
        assert!(matches!(
            GatewayBuilder::new(opts),
            Err(GatewayError::Proxy(_))
        ));
    }

    #[tokio::test]
    async fn test_build_starts_closed() {
        let gateway = GatewayBuilder::new(options()).unwrap().build();
        assert_eq!(gateway.state(), ConnectionState::Closed);
        assert!(!gateway.is_connected());
    }
}

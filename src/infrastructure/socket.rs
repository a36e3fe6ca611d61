use super::proxy::ProxyConfig;
use crate::types::{GatewayError, Result};
use futures::stream::StreamExt;
use futures::{Sink, Stream};
use std::pin::Pin;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

/// Write half of the duplex channel
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of the duplex channel
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Opens WebSocket connections, directly or tunnelled through a SOCKS5 proxy.
pub struct WebSocketFactory;

impl WebSocketFactory {
    pub async fn create(url: &Url, proxy: Option<&ProxyConfig>) -> Result<(FrameSink, FrameStream)> {
        match proxy {
            None => {
                tracing::debug!("Creating WebSocket connection to: {}", url);
                let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
                let (write_half, read_half) = ws_stream.split();
                let sink: FrameSink = Box::pin(write_half);
                let stream: FrameStream = Box::pin(read_half);
                Ok((sink, stream))
            }
            Some(proxy) => {
                tracing::debug!("Creating WebSocket connection to: {} via {}", url, proxy);
                let stream = Self::tunnel(url, proxy).await?;
                let (ws_stream, _response) =
                    tokio_tungstenite::client_async_tls(url.as_str(), stream).await?;
                let (write_half, read_half) = ws_stream.split();
                let sink: FrameSink = Box::pin(write_half);
                let stream: FrameStream = Box::pin(read_half);
                Ok((sink, stream))
            }
        }
    }

    async fn tunnel(
        url: &Url,
        proxy: &ProxyConfig,
    ) -> Result<Socks5Stream<tokio::net::TcpStream>> {
        let Some(host) = url.host_str() else {
            return Err(GatewayError::Connection(format!("No host in {}", url)));
        };
        let port = url.port_or_known_default().unwrap_or(443);

        let stream = match proxy.credentials() {
            Some((user, password)) => {
                Socks5Stream::connect_with_password(proxy.address(), (host, port), user, password)
                    .await
            }
            None => Socks5Stream::connect(proxy.address(), (host, port)).await,
        };

        stream.map_err(|e| GatewayError::Proxy(format!("SOCKS tunnel via {} failed: {}", proxy, e)))
    }
}

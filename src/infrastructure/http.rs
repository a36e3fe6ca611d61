use super::proxy::ProxyConfig;
use crate::types::TaskError;
use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One outbound HTTP call issued on behalf of a task
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
}

/// Status and full text body of a completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP layer used by task runners.
///
/// Implementations must be cancel-safe: dropping the returned future aborts the call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TaskError>;
}

/// `reqwest`-backed transport. Keeps one client per proxy so connection pools are reused.
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            direct: reqwest::Client::new(),
            proxied: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyConfig>) -> Result<reqwest::Client, TaskError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(proxy.as_str()) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .proxy(proxy.to_reqwest()?)
            .build()?;
        clients.insert(proxy.as_str().to_string(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TaskError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

//! # Relay Gateway
//!
//! Keeps one persistent WebSocket connection to a coordinating server, runs outbound
//! HTTP tasks on its behalf and reports each outcome back over that connection.
//!
//! ## Example
//!
//! ```no_run
//! use relay_gateway::{Gateway, GatewayOptions, Method, TaskRequest, TaskRunner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::new(GatewayOptions {
//!         server: "relay.example.com".to_string(),
//!         user: "alice".to_string(),
//!         device: "laptop-1".to_string(),
//!         ..Default::default()
//!     })?;
//!     gateway.connect().await?;
//!
//!     let runner = TaskRunner::default();
//!     let task = TaskRequest::new("task-1", Method::GET, "https://example.com/");
//!     runner.start(task, Arc::new(gateway.clone())).wait().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod task;
pub mod types;

pub use client::{ConnectionState, Gateway, GatewayBuilder, GatewayOptions};
pub use infrastructure::{HttpRequest, HttpResponse, HttpTransport, ProxyConfig, ReqwestTransport};
pub use task::{
    CommandScriptExecutor, ScriptExecutor, TaskHandle, TaskReporter, TaskRequest, TaskRunner,
    TaskState,
};
pub use reqwest::Method;
pub use types::{Frame, GatewayError, Result, TaskError};

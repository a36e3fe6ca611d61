// Infrastructure module - Background services, transports and utilities
pub mod heartbeat;
pub mod http;
pub mod proxy;
pub mod socket;
pub mod task_manager;
pub mod timer;

pub use heartbeat::KeepAlive;
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use proxy::ProxyConfig;
pub use socket::{FrameSink, FrameStream, WebSocketFactory};
pub use task_manager::TaskManager;
pub use timer::Timer;

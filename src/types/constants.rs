use std::time::Duration;

/// Gateway frame types (magic strings layer)
pub mod frame_types {
    pub const REGISTER: &str = "register";
    pub const PING: &str = "ping";
    pub const RESPONSE: &str = "response";
    pub const ERROR: &str = "error";
}

/// Path of the duplex endpoint on the coordinating server
pub const CONNECT_PATH: &str = "/connect";

/// Keep-alive interval while the channel is open
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Delay before a frame is retried while the channel is not open
pub const SEND_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Error code reported when a task failure carries none
pub const DEFAULT_ERROR_CODE: u16 = 500;

/// Message reported for a cancelled task
pub const ABORTED_MESSAGE: &str = "The operation was aborted";

/// Default reconnect intervals (milliseconds)
pub const RECONNECT_INTERVALS: [u64; 4] = [1000, 2000, 5000, 10000];
pub const DEFAULT_RECONNECT_FALLBACK: u64 = 10000;

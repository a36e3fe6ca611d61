// Module declarations
mod builder;
pub(crate) mod connection;
mod core;
mod state;

// Public API exports
pub use builder::{GatewayBuilder, GatewayOptions};
pub use connection::{ConnectionManager, ConnectionState};
pub use core::Gateway;
pub use state::ClientState;

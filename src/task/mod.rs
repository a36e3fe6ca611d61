// Relay tasks: one outbound HTTP call each, reported back through the gateway
mod request;
mod runner;
mod script;

pub use request::{DEFAULT_TASK_TIMEOUT, TaskRequest, permits_body};
pub use runner::{TaskHandle, TaskReporter, TaskRunner, TaskState};
pub use script::{CommandScriptExecutor, ScriptExecutor};

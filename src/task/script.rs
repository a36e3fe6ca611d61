use crate::types::TaskError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Post-processing hook run on a task's response body before the outcome is reported.
///
/// A failure turns the task into an `error` report even if the HTTP call succeeded.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &str, response: &str, timeout: Duration)
    -> Result<(), TaskError>;
}

/// Runs scripts with an external interpreter.
///
/// The script is passed as the last argument and the response body is written to
/// the process's stdin. A non-zero exit or running past the timeout is a failure;
/// the process is killed when the timeout fires or the task is cancelled.
///
/// ```no_run
/// use relay_gateway::CommandScriptExecutor;
///
/// // Runs `sh -c '<script>'`
/// let executor = CommandScriptExecutor::new("sh").arg("-c");
/// ```
#[derive(Debug, Clone)]
pub struct CommandScriptExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandScriptExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    async fn run(&self, script: &str, response: &str) -> Result<(), TaskError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| script_error(format!("Failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Scripts that ignore stdin may exit before reading it
            if let Err(e) = stdin.write_all(response.as_bytes()).await {
                tracing::debug!("Script closed stdin early: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| script_error(format!("Script execution failed: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let message = match (stderr.is_empty(), output.status.code()) {
            (false, _) => stderr.to_string(),
            (true, Some(code)) => format!("Script exited with status {}", code),
            (true, None) => "Script terminated by signal".to_string(),
        };
        Err(script_error(message))
    }
}

#[async_trait]
impl ScriptExecutor for CommandScriptExecutor {
    async fn execute(
        &self,
        script: &str,
        response: &str,
        timeout: Duration,
    ) -> Result<(), TaskError> {
        match tokio::time::timeout(timeout, self.run(script, response)).await {
            Ok(result) => result,
            Err(_) => Err(script_error(format!("Script timed out after {:?}", timeout))),
        }
    }
}

fn script_error(message: String) -> TaskError {
    TaskError::Script {
        message,
        code: None,
    }
}

use super::request::TaskRequest;
use super::script::ScriptExecutor;
use crate::infrastructure::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::TaskError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Where task outcomes go. Implemented by [`Gateway`](crate::Gateway).
///
/// Both calls must return promptly; the gateway only queues a frame.
pub trait TaskReporter: Send + Sync {
    fn transfer_result(&self, taskid: &str, response: &str, status: u16);
    fn transfer_error(&self, taskid: &str, error: &str, code: u16);
}

/// Lifecycle of a started task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    /// A `response` frame was reported
    Completed { status: u16 },
    /// An `error` frame was reported
    Failed { code: u16, message: String },
    /// Cancelled before an outcome; an `error` frame was reported
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Handle to a running task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    taskid: String,
    token: CancellationToken,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub fn taskid(&self) -> &str {
        &self.taskid
    }

    /// Aborts the in-flight HTTP call or script. No-op once the task has reported.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Resolves once the outcome has been reported and the task has finished.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.state.clone();
        match rx.wait_for(TaskState::is_terminal).await {
            Ok(state) => state.clone(),
            // The task died without publishing (panic); report what we last saw
            Err(_) => self.state(),
        }
    }
}

/// Starts relay tasks.
///
/// Owns the HTTP layer and the optional script executor shared by every task it starts.
#[derive(Clone)]
pub struct TaskRunner {
    http: Arc<dyn HttpTransport>,
    executor: Option<Arc<dyn ScriptExecutor>>,
}

impl TaskRunner {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self {
            http,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Spawns the task and returns at once.
    ///
    /// Exactly one of `transfer_result`/`transfer_error` is called on `reporter`,
    /// followed by the completion log line. Must be called inside a tokio runtime.
    pub fn start(&self, request: TaskRequest, reporter: Arc<dyn TaskReporter>) -> TaskHandle {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(TaskState::Running);

        let handle = TaskHandle {
            taskid: request.taskid.clone(),
            token: token.clone(),
            state: state_rx,
        };

        let runner = self.clone();
        tokio::spawn(async move {
            let taskid = request.taskid.clone();
            tracing::debug!("Task {} started (created {:?})", taskid, request.born_at);

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(TaskError::Cancelled),
                result = runner.execute(&request) => result,
            };

            let state = report(&taskid, outcome, reporter.as_ref());
            tracing::info!("Task {} completed in {:?}", taskid, request.age());
            state_tx.send_replace(state);
        });

        handle
    }

    async fn execute(&self, request: &TaskRequest) -> Result<HttpResponse, TaskError> {
        let response = self.http.send(request.to_http()).await?;
        tracing::info!("Response: {}", response.body);

        if let Some(script) = &request.script {
            let Some(executor) = &self.executor else {
                return Err(TaskError::Script {
                    message: "No script executor configured".to_string(),
                    code: None,
                });
            };
            executor
                .execute(script, &response.body, request.timeout)
                .await?;
        }

        if !response.is_success() {
            return Err(TaskError::HttpStatus(response.status));
        }
        Ok(response)
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()))
    }
}

fn report(
    taskid: &str,
    outcome: Result<HttpResponse, TaskError>,
    reporter: &dyn TaskReporter,
) -> TaskState {
    match outcome {
        Ok(response) => {
            reporter.transfer_result(taskid, &response.body, response.status);
            TaskState::Completed {
                status: response.status,
            }
        }
        Err(err) => {
            tracing::error!("Task {} failed: {}", taskid, err);
            let code = err.code();
            let message = err.to_string();
            reporter.transfer_error(taskid, &message, code);

            match err {
                TaskError::Cancelled => TaskState::Cancelled,
                _ => TaskState::Failed { code, message },
            }
        }
    }
}

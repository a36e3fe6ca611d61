use crate::infrastructure::{HttpRequest, ProxyConfig};
use reqwest::Method;
use std::time::{Duration, Instant, SystemTime};

/// Default budget for a task's HTTP call and post-processing script
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Methods whose requests carry a body (the create/update family)
pub fn permits_body(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH].contains(method)
}

/// One unit of relay work: an outbound HTTP request plus optional post-processing.
///
/// The task id is echoed back in the `response`/`error` frame; keeping it unique is
/// up to whoever dispatches the task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub taskid: String,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub script: Option<String>,
    pub timeout: Duration,
    pub proxy: Option<ProxyConfig>,
    /// Monotonic creation time, for measuring how long the task took
    pub born: Instant,
    /// Wall-clock creation time, for logs and for the dispatching side
    pub born_at: SystemTime,
}

impl TaskRequest {
    pub fn new(taskid: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            taskid: taskid.into(),
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            script: None,
            timeout: DEFAULT_TASK_TIMEOUT,
            proxy: None,
            born: Instant::now(),
            born_at: SystemTime::now(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Time since the task was created
    pub fn age(&self) -> Duration {
        self.born.elapsed()
    }

    /// The HTTP call for this task. The body is dropped for methods that do not
    /// carry one; the task timeout doubles as the request deadline.
    pub(crate) fn to_http(&self) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone().filter(|_| permits_body(&self.method)),
            timeout: Some(self.timeout),
            proxy: self.proxy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_bearing_methods() {
        assert!(permits_body(&Method::POST));
        assert!(permits_body(&Method::PUT));
        assert!(permits_body(&Method::PATCH));
        assert!(!permits_body(&Method::GET));
        assert!(!permits_body(&Method::DELETE));
        assert!(!permits_body(&Method::HEAD));
    }

    #[test]
    fn test_creation_times_are_recorded() {
        let before = SystemTime::now();
        let task = TaskRequest::new("t0", Method::GET, "http://x/");
        assert!(task.born_at >= before);
        assert!(task.born_at <= SystemTime::now());
        assert!(task.age() < Duration::from_secs(5));
    }

    #[test]
    fn test_body_only_attached_when_permitted() {
        let post = TaskRequest::new("t1", Method::POST, "http://x/").with_body("{}");
        assert_eq!(post.to_http().body.as_deref(), Some("{}"));

        let get = TaskRequest::new("t2", Method::GET, "http://x/").with_body("{}");
        assert_eq!(get.to_http().body, None);
    }

    #[test]
    fn test_timeout_becomes_request_deadline() {
        let task = TaskRequest::new("t3", Method::GET, "http://x/")
            .with_timeout(Duration::from_secs(7))
            .with_headers([("accept", "text/plain"), ("x-id", "1")]);
        let http = task.to_http();
        assert_eq!(http.timeout, Some(Duration::from_secs(7)));
        assert_eq!(
            http.headers,
            vec![
                ("accept".to_string(), "text/plain".to_string()),
                ("x-id".to_string(), "1".to_string())
            ]
        );
    }
}

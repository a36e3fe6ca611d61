use relay_gateway::{CommandScriptExecutor, Gateway, Method, TaskRequest, TaskRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Connects to a relay server and runs one task per URL given on the command line.
///
/// RELAY_SERVER, RELAY_USER and RELAY_DEVICE are read from the environment (or .env);
/// RELAY_PROXY optionally names a SOCKS proxy and RELAY_SCRIPT a `sh -c` post-processing
/// script applied to every response.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let server = std::env::var("RELAY_SERVER").expect("RELAY_SERVER must be set");
    let user = std::env::var("RELAY_USER").expect("RELAY_USER must be set");
    let device = std::env::var("RELAY_DEVICE").expect("RELAY_DEVICE must be set");
    let proxy = std::env::var("RELAY_PROXY").ok();
    let script = std::env::var("RELAY_SCRIPT").ok();

    println!("Connecting to {}...", server);
    let gateway = Gateway::open(server, user, device, proxy.clone()).await?;

    let runner = TaskRunner::default()
        .with_executor(Arc::new(CommandScriptExecutor::new("sh").arg("-c")));
    let reporter = Arc::new(gateway.clone());

    let mut handles = Vec::new();
    for (i, url) in std::env::args().skip(1).enumerate() {
        let mut task = TaskRequest::new(format!("demo-{}", i), Method::GET, url)
            .with_timeout(Duration::from_secs(15));
        if let Some(script) = &script {
            task = task.with_script(script.clone());
        }
        if let Some(proxy) = &proxy {
            task = task.with_proxy(proxy.parse()?);
        }
        handles.push(runner.start(task, reporter.clone()));
    }

    for handle in &handles {
        println!("{}: {:?}", handle.taskid(), handle.wait().await);
    }

    println!("Waiting for queued frames; Ctrl-C to quit");
    tokio::signal::ctrl_c().await?;

    gateway.disconnect().await?;
    println!("Disconnected!");
    Ok(())
}

use agent_runtime::agent::roles::Role;
use agent_runtime::run::Run;
use agent_runtime::sandbox::ProcessToolExecutor;
use agent_runtime::thinker::http::HttpThinker;
use agent_runtime::{Result, RuntimeConfig};
use std::sync::Arc;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let task = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("usage: agent-runtime <task>");
        std::process::exit(2);
    });

    info!("starting agent runtime");
    let config = RuntimeConfig::load()?;

    let thinker: Arc<dyn agent_runtime::thinker::http::Thinker> = Arc::new(HttpThinker::new(
        config.thinker_base_url.clone(),
        config.thinker_api_key.clone(),
        config.thinker_timeout_seconds,
    ));
    let executor = Arc::new(ProcessToolExecutor::new());

    let run = Run::start(config, thinker, executor, "agent_runs", "run".to_string()).await?;

    match run.run_to_completion(Role::Coordinator, task, None).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "run failed");
            Err(e)
        }
    }
}

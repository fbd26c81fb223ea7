use dgraph_orchestrator::{start_server, ServiceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env();
    info!(
        engine = %config.engine_bin.display(),
        graph = %config.default_graph.display(),
        timeout_secs = config.engine_timeout.as_secs(),
        "starting dgraph orchestrator"
    );

    start_server(config).await
}

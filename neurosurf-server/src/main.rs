use neurosurf_server::{ServerConfig, init_tracing, load_dotenv, run_server};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = load_dotenv();

    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format);
    match dotenv {
        Ok(Some(path)) => debug!(path = %path.display(), "loaded env file"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to load .env file"),
    }

    run_server(config).await
}

use std::sync::Arc;

use kontakt_bff::{AppState, Config, Server, app};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        env = ?config.env,
        dataset = %config.sanity.dataset,
        enheter = %config.enheter.base_url,
        mottak = %config.mottak.base_url,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "configuration loaded"
    );

    let state = match AppState::from_config(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Startup error: {e}");
            std::process::exit(2);
        }
    };

    let _sweeper = state.content.cache().spawn_sweeper(config.cache_sweep_interval);

    if let Err(e) = Server::bind(config.bind_addr).serve(app::router(state)).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}

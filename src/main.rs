use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use bookshelf::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "bookshelf",
        "bookshelf starting: RUST_LOG='{}', bind={}:{}, db='{}', classify_url='{}', classify_timeout={:?}, session_ttl={:?}",
        rust_log, cfg.bind, cfg.http_port, cfg.db_path, cfg.classify_url, cfg.classify_timeout, cfg.session_ttl
    );

    bookshelf::server::run(cfg).await
}

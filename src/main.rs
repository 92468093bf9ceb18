use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.to_lowercase().parse().unwrap_or_default());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    scangate::cli::run().await
}

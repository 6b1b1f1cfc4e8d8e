use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xanthus::{config, http};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::Settings::load()?;
    http::run_server(settings).await
}

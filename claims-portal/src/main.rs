use anyhow::Context as _;
use claims_portal::{LogFormat, PortalConfig, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claims_portal=debug,portal_flow=debug,tower_http=debug".into());

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PortalConfig::from_env();
    init_tracing(config.log_format);

    let app = create_app(&config);
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    let addr = listener.local_addr()?;

    info!(%addr, "Claims portal listening");
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

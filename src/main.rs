use shopmetrics::config::DashboardConfig;
use shopmetrics::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DashboardConfig::from_env();
    info!(
        timezone = %config.timezone,
        crm = config.highlevel.is_some(),
        ads = config.meta.is_some(),
        books = config.quickbooks.is_some(),
        "starting dashboard backend"
    );

    let state = AppState::new(config);
    shopmetrics::start_server(state).await
}

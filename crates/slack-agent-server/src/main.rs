mod configuration;
mod error;
mod routes;
mod state;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = configuration::Settings::new()?;
    tracing::info!(
        gateway_url = %settings.gateway_url,
        scope = %settings.cognito_scope,
        workload_name = %settings.workload_name,
        user_id = %settings.user_id,
        "loaded configuration"
    );

    let state = state::AppState::from_settings(&settings)?;
    let app = routes::configure(state);

    let listener = tokio::net::TcpListener::bind(settings.socket_addr()?).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

use std::net::{IpAddr, SocketAddr};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    routes::create_router,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkout_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let addr = SocketAddr::from((config.host.parse::<IpAddr>()?, config.port));
    let app = create_router(AppState::new(pool, config));

    tracing::info!("listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}

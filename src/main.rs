//! Storefront Core - cart, checkout and order fulfilment service

use std::sync::Arc;

use anyhow::{Context, Result};
use storefront_core::config::Config;
use storefront_core::publisher::{EventPublisher, NatsPublisher, NullPublisher};
use storefront_core::{http, MemoryStore, PgStore, Storefront, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await.context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(error) => {
                tracing::warn!(%error, "NATS unavailable, events will not be published");
                Arc::new(NullPublisher)
            }
        },
        None => Arc::new(NullPublisher),
    };

    let storefront = Storefront::new(store).with_publisher(publisher).with_settings(config.settings());
    let app = http::router(Arc::new(storefront));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("storefront-core listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

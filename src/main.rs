//! OpenSASE Checkout - pricing, cart and order service

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_checkout::clock::SystemClock;
use opensase_checkout::config::Config;
use opensase_checkout::events::{EventSink, LogSink, NatsSink};
use opensase_checkout::http;
use opensase_checkout::scheduler::Scheduler;
use opensase_checkout::services::{AppContext, Deps};
use opensase_checkout::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(config.require_database_url()?).await.context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let events: Arc<dyn EventSink> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsSink::new(client, "ecommerce")),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, logging events instead");
                Arc::new(LogSink)
            }
        },
        None => Arc::new(LogSink),
    };

    let deps = Deps { store: Arc::new(PgStore::new(db)), clock: Arc::new(SystemClock), events, config: config.commerce.clone() };
    let scheduler = Scheduler::spawn(deps.clone());

    let app = http::router(Arc::new(AppContext::new(deps))).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!(port = config.port, activation = ?config.commerce.activation, "OpenSASE Checkout listening on 0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

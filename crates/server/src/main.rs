//! Parley server binary

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_carrier::HttpCarrierControl;
use parley_config::Settings;
use parley_core::CarrierControl;
use parley_persistence::{CallLogStore, InMemoryCallLogStore, ScyllaCallLogStore};
use parley_server::{router, state::AppState};
use parley_store::{CallStateStore, InMemoryCallStateStore, RedisCallStateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let settings = Arc::new(Settings::load().context("loading settings")?);

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .context("installing prometheus exporter")?;

    let store: Arc<dyn CallStateStore> = if settings.redis.enabled {
        Arc::new(
            RedisCallStateStore::connect(&settings.redis.url)
                .await
                .context("connecting to redis")?,
        )
    } else {
        tracing::warn!("redis disabled: call state is process-local only");
        Arc::new(InMemoryCallStateStore::new())
    };

    let log_store: Arc<dyn CallLogStore> = if settings.scylla.enabled {
        Arc::new(
            ScyllaCallLogStore::connect(&settings.scylla)
                .await
                .context("initializing scylla persistence")?,
        )
    } else {
        tracing::warn!("scylla disabled: call logs are in-memory only");
        Arc::new(InMemoryCallLogStore::new())
    };

    let carrier_api_base = std::env::var("CARRIER_API_BASE")
        .unwrap_or_else(|_| "https://api.telnyx.com/v2".to_string());
    let control: Arc<dyn CarrierControl> = Arc::new(HttpCarrierControl::new(
        carrier_api_base,
        settings.vendors.carrier_api_key.clone(),
    ));

    let state = AppState::new(settings.clone(), store, log_store, control);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, max_calls = settings.server.max_concurrent_calls, "parley listening");

    axum::serve(listener, router(state))
        .await
        .context("serving")?;

    Ok(())
}

use crate::app_config::AppConfig;
use crate::history::{field_series, load_history, pivot_rows};
use crate::view::{DeviceViewHandle, ViewSources};
use crate::view_listener::view_listener;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

mod app_config;
mod domain;
mod history;
mod platform;
mod view;
mod view_listener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Arc::new(AppConfig::load()?);
    info!("✅  Loaded configuration with {} device(s)", config.devices().len());

    let http_client = platform::new_client(&config)?;
    let session = platform::login(&http_client, config.platform()).await?;
    let user = platform::current_user(&http_client, config.platform(), &session).await?;
    info!("✅  Logged in as {} ({})", user.display_name(), user.authority);

    let platform_client = Arc::new(platform::PlatformClient::new(http_client, config.clone()));
    let sources = ViewSources::shared(platform_client.clone());

    let mut views = Vec::with_capacity(config.devices().len());
    for profile in config.devices() {
        let handle = DeviceViewHandle::open(Arc::new(profile.clone()), session.clone(), sources.clone(), config.core().queue_buffer_size());
        let notifier_rx = handle.subscribe();
        task::spawn(async move {
            view_listener(notifier_rx).await;
        });
        info!("✅  Opened view for {}", profile.name);
        views.push(handle);
    }

    for profile in config.devices() {
        match load_history(platform_client.as_ref(), &session, profile, config.history().window()).await {
            Ok(series) => {
                let rows = pivot_rows(&series, &profile.telemetry_keys);
                let temperatures = profile.climate_key().map(|key| field_series(&series, key, "temp")).unwrap_or_default();
                let peak = temperatures.iter().map(|(_, t)| *t).fold(None, |max: Option<f64>, t| Some(max.map_or(t, |m| m.max(t))));
                info!("📈 {}: {} history row(s), peak temperature {:?}", profile.name, rows.len(), peak);
            }
            Err(e) => warn!("⚠️ Unable to load history for {}: {}", profile.name, e),
        }
    }

    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down...");
    for view in views {
        view.discard().await;
    }
    info!("🛑 Shutting down... OK");

    Ok(())
}

use crate::view::model::{DeviceViewModel, NotificationLevel, ViewState};
use tokio::sync::watch::Receiver;
use tracing::{info, instrument, warn};

#[instrument(skip_all, fields(device_id = %rx.borrow().profile.id))]
pub async fn view_listener(mut rx: Receiver<DeviceViewModel>) {
    let mut last: Option<DeviceViewModel> = None;

    while rx.changed().await.is_ok() {
        let model: DeviceViewModel = rx.borrow_and_update().clone();
        log_changes(last.as_ref(), &model);

        if model.state == ViewState::Discarded {
            break;
        }
        last = Some(model);
    }
}

fn log_changes(last: Option<&DeviceViewModel>, model: &DeviceViewModel) {
    let name = &model.profile.name;

    if let Some(climate) = model.climate().filter(|c| last.and_then(DeviceViewModel::climate).is_none_or(|l| l.ts != c.ts)) {
        info!(
            "🌡️ {}: {} °C, {} % humidity, battery {} %",
            name,
            format_reading(climate.temperature),
            format_reading(climate.humidity),
            format_reading(climate.battery)
        );
    }

    if let Some(power) = model.power().filter(|p| last.and_then(DeviceViewModel::power).is_none_or(|l| l.ts != p.ts)) {
        info!(
            "⚡ {}: {} V, {} A, {} W, {} kWh",
            name,
            format_reading(power.voltage),
            format_reading(power.current),
            format_reading(power.power),
            format_reading(power.energy)
        );
    }

    if last.is_none_or(|l| l.live != model.live) {
        if model.live {
            info!("🟢 {} is live", name);
        } else if model.state != ViewState::Empty {
            info!("⚪ {} shows snapshot data only", name);
        }
    }

    if last.is_none_or(|l| l.pending != model.pending) && !model.pending.is_empty() {
        info!("✏️ {}: editing {:?}", name, model.pending);
    }

    if let Some(notification) = &model.notification {
        if last.is_none_or(|l| l.notification.as_ref() != Some(notification)) {
            match notification.level {
                NotificationLevel::Success => info!("✅ {}: {}", name, notification.message),
                NotificationLevel::Error => warn!("⚠️ {}: {}", name, notification.message),
                NotificationLevel::LoginRequired => warn!("🔑 {}: {}", name, notification.message),
            }
        }
    }

    if model.state == ViewState::Discarded {
        info!("👋 {} closed", name);
    }
}

fn format_reading(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v))
}

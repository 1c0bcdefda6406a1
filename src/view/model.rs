use crate::domain::GeoLocation;
use crate::domain::attribute_store::Attributes;
use crate::domain::device_profile::DeviceProfile;
use crate::domain::safe_zone::{GeofenceStatus, SafeZones};
use crate::domain::sample::{SampleValue, TelemetrySample, value_as_bool};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewState {
    Empty,
    Loading,
    Ready,
    Editing,
    Discarded,
}

/// Progress of one independently loaded part of the view (telemetry or attributes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    LoginRequired,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Notification {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Render-ready snapshot of a device view, published after every processed event.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceViewModel {
    pub profile: Arc<DeviceProfile>,
    pub state: ViewState,
    pub telemetry_status: SliceStatus,
    pub attributes_status: SliceStatus,
    pub live: bool,
    pub login_required: bool,
    pub telemetry: BTreeMap<String, TelemetrySample>,
    /// Confirmed values with pending edits laid over them
    pub attributes: Attributes,
    pub pending: BTreeSet<String>,
    pub saving: BTreeSet<String>,
    pub notification: Option<Notification>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClimateReading {
    pub ts: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PowerReading {
    pub ts: i64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy: Option<f64>,
}

impl DeviceViewModel {
    pub fn sample(&self, key: &str) -> Option<&TelemetrySample> {
        self.telemetry.get(key)
    }

    pub fn attribute(&self, key: &str) -> Option<SampleValue> {
        self.attributes.get(key).cloned().map(SampleValue::normalize)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn climate(&self) -> Option<ClimateReading> {
        let sample = self.sample(self.profile.climate_key()?)?;
        Some(ClimateReading {
            ts: sample.ts,
            temperature: sample.value.field_f64("temp"),
            humidity: sample.value.field_f64("hum"),
            battery: sample.value.field_f64("bat"),
        })
    }

    pub fn power(&self) -> Option<PowerReading> {
        let sample = self.sample(self.profile.power_meter_key()?)?;
        Some(PowerReading {
            ts: sample.ts,
            voltage: sample.value.field_f64("voltage"),
            current: sample.value.field_f64("current"),
            power: sample.value.field_f64("power"),
            energy: sample.value.field_f64("energy"),
        })
    }

    pub fn settings(&self) -> Option<Map<String, Value>> {
        self.composite_attribute(self.profile.settings_key()?)
    }

    pub fn info(&self) -> Option<Map<String, Value>> {
        self.composite_attribute(self.profile.info_key()?)
    }

    fn composite_attribute(&self, key: &str) -> Option<Map<String, Value>> {
        match self.attribute(key)? {
            SampleValue::Composite(map) => Some(map),
            _ => None,
        }
    }

    /// Always three slots when the profile tracks safe zones, whatever the platform holds.
    pub fn safe_zones(&self) -> Option<SafeZones> {
        let (zone_key, _, _) = self.profile.geofence_keys()?;
        Some(self.attributes.get(zone_key).map(SafeZones::from_attribute).unwrap_or_default())
    }

    pub fn location(&self) -> Option<GeoLocation> {
        let (_, _, location_key) = self.profile.geofence_keys()?;
        match &self.sample(location_key)?.value {
            SampleValue::Composite(map) => serde_json::from_value(Value::Object(map.clone())).ok(),
            _ => None,
        }
    }

    pub fn geofence_status(&self) -> Option<GeofenceStatus> {
        let (_, toggle_key, _) = self.profile.geofence_keys()?;
        let enabled = self.attributes.get(toggle_key).and_then(value_as_bool).unwrap_or(false);
        if !enabled {
            return Some(GeofenceStatus::Disabled);
        }

        let status = match (self.location(), self.safe_zones()) {
            (Some(location), Some(zones)) if zones.fences().next().is_some() => {
                if zones.contains(&location) {
                    GeofenceStatus::Inside
                } else {
                    GeofenceStatus::Outside
                }
            }
            _ => GeofenceStatus::Unknown,
        };
        Some(status)
    }
}

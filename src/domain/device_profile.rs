use serde::Deserialize;
use thiserror::Error;

/// Describes one instrumented warehouse: which platform device carries its data, which keys belong to it and what
/// the view can show for it.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeviceProfile {
    pub id: String,
    pub name: String,
    pub device_id: String,
    pub telemetry_keys: Vec<String>,
    pub attribute_keys: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Capability {
    /// Composite telemetry key carrying `temp`, `hum` and `bat`
    ClimateSensor { key: String },
    /// Composite telemetry key carrying `voltage`, `current`, `power` and `energy`
    PowerMeter { key: String },
    /// Composite attribute with set-points and toggles (`temp`, `mode`, `fan`, `light`, `door`, `power`)
    Settings { key: String },
    /// Composite attribute with descriptive information (`name`, `marterial`, `latitude`, `longitude`)
    Info { key: String },
    Geofence {
        zone_key: String,
        toggle_key: String,
        location_key: String,
    },
}

impl DeviceProfile {
    pub fn lookup<'a>(profiles: &'a [DeviceProfile], id: &str) -> Option<&'a DeviceProfile> {
        profiles.iter().find(|profile| profile.id == id)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.device_id.trim().is_empty() {
            return Err(ProfileError::MissingDeviceId(self.id.clone()));
        }
        if self.telemetry_keys.is_empty() {
            return Err(ProfileError::NoTelemetryKeys(self.id.clone()));
        }
        if self.attribute_keys.is_empty() {
            return Err(ProfileError::NoAttributeKeys(self.id.clone()));
        }

        for capability in &self.capabilities {
            let (telemetry, attributes) = capability.keys();
            if let Some(key) = telemetry.iter().find(|key| !self.telemetry_keys.iter().any(|k| k == **key)) {
                return Err(ProfileError::UnknownKey {
                    profile: self.id.clone(),
                    key: key.to_string(),
                });
            }
            if let Some(key) = attributes.iter().find(|key| !self.attribute_keys.iter().any(|k| k == **key)) {
                return Err(ProfileError::UnknownKey {
                    profile: self.id.clone(),
                    key: key.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn climate_key(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::ClimateSensor { key } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn power_meter_key(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::PowerMeter { key } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn settings_key(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::Settings { key } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn info_key(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::Info { key } => Some(key.as_str()),
            _ => None,
        })
    }

    /// Returns `(zone_key, toggle_key, location_key)` for profiles that track a location.
    pub fn geofence_keys(&self) -> Option<(&str, &str, &str)> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::Geofence {
                zone_key,
                toggle_key,
                location_key,
            } => Some((zone_key.as_str(), toggle_key.as_str(), location_key.as_str())),
            _ => None,
        })
    }
}

impl Capability {
    // (telemetry keys, attribute keys)
    fn keys(&self) -> (Vec<&str>, Vec<&str>) {
        match self {
            Capability::ClimateSensor { key } | Capability::PowerMeter { key } => (vec![key.as_str()], vec![]),
            Capability::Settings { key } | Capability::Info { key } => (vec![], vec![key.as_str()]),
            Capability::Geofence {
                zone_key,
                toggle_key,
                location_key,
            } => (vec![location_key.as_str()], vec![zone_key.as_str(), toggle_key.as_str()]),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ProfileError {
    #[error("device profile '{0}' has no platform device id")]
    MissingDeviceId(String),
    #[error("device profile '{0}' has no telemetry keys")]
    NoTelemetryKeys(String),
    #[error("device profile '{0}' has no attribute keys")]
    NoAttributeKeys(String),
    #[error("device profile '{profile}' uses key '{key}' in a capability but does not declare it")]
    UnknownKey { profile: String, key: String },
    #[error("device profile '{0}' is defined more than once")]
    Duplicate(String),
}

#[cfg(test)]
pub(crate) fn warehouse_profile() -> DeviceProfile {
    DeviceProfile {
        id: "1".to_string(),
        name: "Warehouse 1".to_string(),
        device_id: "dev-1".to_string(),
        telemetry_keys: vec!["1".to_string(), "10".to_string()],
        attribute_keys: vec!["1".to_string(), "set-1".to_string()],
        capabilities: vec![
            Capability::ClimateSensor { key: "1".to_string() },
            Capability::PowerMeter { key: "10".to_string() },
            Capability::Settings { key: "set-1".to_string() },
            Capability::Info { key: "1".to_string() },
        ],
    }
}

#[cfg(test)]
pub(crate) fn tracker_profile() -> DeviceProfile {
    DeviceProfile {
        id: "tracker".to_string(),
        name: "Tracker".to_string(),
        device_id: "dev-2".to_string(),
        telemetry_keys: vec!["gps".to_string()],
        attribute_keys: vec!["safe_zone".to_string(), "set_zone".to_string()],
        capabilities: vec![Capability::Geofence {
            zone_key: "safe_zone".to_string(),
            toggle_key: "set_zone".to_string(),
            location_key: "gps".to_string(),
        }],
    }
}

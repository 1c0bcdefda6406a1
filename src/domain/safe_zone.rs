use crate::domain::GeoLocation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const SAFE_ZONE_SLOTS: usize = 3;

/// A single field of a safe zone slot. The editor works on text, the platform may hand back numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Number(f64),
    Text(String),
}

impl SlotValue {
    pub fn empty() -> Self {
        SlotValue::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SlotValue::Text(text) if text.trim().is_empty())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SlotValue::Number(n) => Some(*n),
            SlotValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl Default for SlotValue {
    fn default() -> Self {
        SlotValue::empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeZoneSlot {
    #[serde(default)]
    pub latitude: SlotValue,
    #[serde(default)]
    pub longitude: SlotValue,
    #[serde(default)]
    pub radius: SlotValue,
}

impl SafeZoneSlot {
    pub fn new(latitude: f64, longitude: f64, radius: f64) -> Self {
        SafeZoneSlot {
            latitude: SlotValue::Number(latitude),
            longitude: SlotValue::Number(longitude),
            radius: SlotValue::Number(radius),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_empty() && self.longitude.is_empty() && self.radius.is_empty()
    }

    /// Returns the circle this slot describes, if every field is a usable number.
    pub fn fence(&self) -> Option<GeoFence> {
        let center = GeoLocation::new(self.latitude.as_f64()?, self.longitude.as_f64()?)?;
        let radius_m = self.radius.as_f64().filter(|radius| radius.is_finite() && *radius > 0.0)?;

        Some(GeoFence { center, radius_m })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoFence {
    pub center: GeoLocation,
    pub radius_m: f64,
}

impl GeoFence {
    pub fn contains(&self, location: &GeoLocation) -> bool {
        self.center.distance_m(location) <= self.radius_m
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GeofenceStatus {
    Disabled,
    Unknown,
    Inside,
    Outside,
}

/// The safe zones of a tracked device, always exactly [`SAFE_ZONE_SLOTS`] slots long.
#[derive(Clone, Debug, PartialEq)]
pub struct SafeZones {
    slots: [SafeZoneSlot; SAFE_ZONE_SLOTS],
}

impl SafeZones {
    pub fn empty() -> Self {
        SafeZones {
            slots: Default::default(),
        }
    }

    pub fn from_slots(slots: impl IntoIterator<Item = SafeZoneSlot>) -> Self {
        let mut zones = Self::empty();
        for (index, slot) in slots.into_iter().take(SAFE_ZONE_SLOTS).enumerate() {
            zones.slots[index] = slot;
        }
        zones
    }

    /// Reads the attribute value as stored on the platform, either an array or a JSON-encoded array.
    pub fn from_attribute(value: &Value) -> Self {
        let parsed = match value {
            Value::String(text) if text.trim().is_empty() => return Self::empty(),
            Value::String(text) => serde_json::from_str::<Vec<SafeZoneSlot>>(text),
            Value::Null => return Self::empty(),
            other => serde_json::from_value::<Vec<SafeZoneSlot>>(other.clone()),
        };

        match parsed {
            Ok(slots) => Self::from_slots(slots),
            Err(e) => {
                warn!("⚠️ Unable to parse safe zones '{}': {}", value, e);
                Self::empty()
            }
        }
    }

    /// Serializes all slots, empty ones included, as a single attribute value.
    pub fn to_attribute(&self) -> Value {
        serde_json::to_value(&self.slots).unwrap_or(Value::Null)
    }

    pub fn slots(&self) -> &[SafeZoneSlot] {
        &self.slots
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut SafeZoneSlot> {
        self.slots.get_mut(index)
    }

    pub fn fences(&self) -> impl Iterator<Item = GeoFence> + '_ {
        self.slots.iter().filter_map(SafeZoneSlot::fence)
    }

    pub fn contains(&self, location: &GeoLocation) -> bool {
        self.fences().any(|fence| fence.contains(location))
    }
}

impl Default for SafeZones {
    fn default() -> Self {
        Self::empty()
    }
}

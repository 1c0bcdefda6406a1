use crate::domain::GeoLocation;
use crate::domain::geo_location::{is_valid_latitude, is_valid_longitude};
use crate::domain::sample::value_as_f64;
use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// Devices report coordinates either as numbers or as numeric text
impl<'de> Deserialize<'de> for GeoLocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Debug, Deserialize)]
        pub struct Inner {
            latitude: Value,
            longitude: Value,
        }

        let inner = Inner::deserialize(deserializer)?;
        let latitude = value_as_f64(&inner.latitude).ok_or_else(|| Error::custom(format!("invalid location latitude: {}", inner.latitude)))?;
        let longitude = value_as_f64(&inner.longitude).ok_or_else(|| Error::custom(format!("invalid location longitude: {}", inner.longitude)))?;

        if !is_valid_latitude(latitude) {
            return Err(Error::custom(format!("invalid location latitude: {}, must be between -90 and 90", latitude)));
        }

        if !is_valid_longitude(longitude) {
            return Err(Error::custom(format!("invalid location longitude: {}, must be between -180 and 180", longitude)));
        }

        Ok(GeoLocation { latitude, longitude })
    }
}

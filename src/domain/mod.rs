pub mod attribute_store;
pub mod device_profile;
pub mod events;
mod geo_location;
mod geo_location_deserializer;
pub mod live_feed;
pub mod safe_zone;
pub mod sample;
pub mod session;
pub mod subscription;
pub mod telemetry_source;

pub use geo_location::GeoLocation;

use crate::domain::session::Session;
use crate::platform::PlatformError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

pub type Attributes = BTreeMap<String, Value>;

#[async_trait]
pub trait AttributeStore: Debug + Send + Sync {
    /// Current server-side values. Keys the platform does not know are absent from the result.
    async fn read(&self, session: &Session, device_id: &str, keys: &[String]) -> Result<Attributes, PlatformError>;

    /// Persists the payload. Callers always send the full attribute set merged with their changes.
    async fn write(&self, session: &Session, device_id: &str, payload: &Attributes) -> Result<(), PlatformError>;
}

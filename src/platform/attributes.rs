use crate::domain::attribute_store::{AttributeStore, Attributes};
use crate::domain::session::Session;
use crate::platform::client::{PlatformClient, PlatformError, authorized, check_status};
use crate::platform::domain::AttributeKv;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

const SHARED_SCOPE: &str = "SHARED_SCOPE";

#[async_trait]
impl AttributeStore for PlatformClient {
    #[instrument(skip(self, session))]
    async fn read(&self, session: &Session, device_id: &str, keys: &[String]) -> Result<Attributes, PlatformError> {
        debug!("Reading shared attributes...");
        let request = self
            .client
            .get(self.url(&format!("/api/plugins/telemetry/DEVICE/{}/values/attributes/{}", device_id, SHARED_SCOPE)))
            .query(&[("keys", keys.join(","))]);
        let response = check_status(authorized(request, session)?.send().await?).await?;
        let attributes = response
            .json::<Vec<AttributeKv>>()
            .await?
            .into_iter()
            .map(|attribute| (attribute.key, attribute.value))
            .collect::<Attributes>();

        debug!("Reading shared attributes... OK, {} found", attributes.len());
        Ok(attributes)
    }

    #[instrument(skip(self, session, payload), fields(keys = payload.len()))]
    async fn write(&self, session: &Session, device_id: &str, payload: &Attributes) -> Result<(), PlatformError> {
        info!("💾 Saving shared attributes...");
        let request = self
            .client
            .post(self.url(&format!("/api/plugins/telemetry/DEVICE/{}/attributes/{}", device_id, SHARED_SCOPE)))
            .json(payload);
        check_status(authorized(request, session)?.send().await?).await?;

        info!("💾 Saving shared attributes... OK");
        Ok(())
    }
}

use crate::domain::events::ViewEvent;
use crate::domain::session::Session;
use crate::domain::subscription::SubscriptionHandle;
use crate::platform::PlatformError;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc::Sender;

#[async_trait]
pub trait LiveFeed: Debug + Send + Sync {
    /// Opens a push channel for the device. Updates for `keys` are posted to `tx` as [`ViewEvent::LiveUpdate`]; the
    /// channel ending for any reason other than cancellation is posted as [`ViewEvent::LiveChannelClosed`] tagged
    /// with `channel`.
    async fn subscribe(
        &self,
        session: &Session,
        device_id: &str,
        keys: &[String],
        channel: u64,
        tx: Sender<ViewEvent>,
    ) -> Result<SubscriptionHandle, PlatformError>;
}

use crate::domain::sample::TelemetrySample;
use crate::domain::session::Session;
use crate::platform::PlatformError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;

#[async_trait]
pub trait TelemetrySource: Debug + Send + Sync {
    /// Latest sample per key. Keys unknown to the platform are absent from the result.
    async fn latest(&self, session: &Session, device_id: &str, keys: &[String]) -> Result<Vec<TelemetrySample>, PlatformError>;

    /// Samples per key between `start_ts` and `end_ts` (epoch milliseconds, inclusive).
    async fn timeseries(
        &self,
        session: &Session,
        device_id: &str,
        keys: &[String],
        start_ts: i64,
        end_ts: i64,
    ) -> Result<BTreeMap<String, Vec<TelemetrySample>>, PlatformError>;
}

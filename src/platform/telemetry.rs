use crate::domain::sample::TelemetrySample;
use crate::domain::session::Session;
use crate::domain::telemetry_source::TelemetrySource;
use crate::platform::client::{PlatformClient, PlatformError, authorized, check_status};
use crate::platform::domain::TsValue;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

#[async_trait]
impl TelemetrySource for PlatformClient {
    #[instrument(skip(self, session))]
    async fn latest(&self, session: &Session, device_id: &str, keys: &[String]) -> Result<Vec<TelemetrySample>, PlatformError> {
        if keys.is_empty() {
            return Err(PlatformError::InvalidRequest("telemetry keys must not be empty".to_string()));
        }

        debug!("Fetching latest telemetry...");
        let request = self
            .client
            .get(self.url(&format!("/api/plugins/telemetry/DEVICE/{}/values/timeseries", device_id)))
            .query(&[("keys", keys.join(","))]);
        let response = check_status(authorized(request, session)?.send().await?).await?;
        let series = response.json::<BTreeMap<String, Vec<TsValue>>>().await?;

        let samples = series
            .into_iter()
            .filter_map(|(key, values)| values.into_iter().next().map(|latest| (key, latest)))
            .filter(|(_, latest)| !latest.value.is_null())
            .map(|(key, latest)| TelemetrySample::new(key, latest.ts, latest.value))
            .collect::<Vec<_>>();

        debug!("Fetching latest telemetry... OK, {} key(s)", samples.len());
        Ok(samples)
    }

    #[instrument(skip(self, session))]
    async fn timeseries(
        &self,
        session: &Session,
        device_id: &str,
        keys: &[String],
        start_ts: i64,
        end_ts: i64,
    ) -> Result<BTreeMap<String, Vec<TelemetrySample>>, PlatformError> {
        if keys.is_empty() {
            return Err(PlatformError::InvalidRequest("telemetry keys must not be empty".to_string()));
        }
        if start_ts > end_ts {
            return Err(PlatformError::InvalidRequest(format!("start {} is after end {}", start_ts, end_ts)));
        }

        let request = self
            .client
            .get(self.url(&format!("/api/plugins/telemetry/DEVICE/{}/values/timeseries", device_id)))
            .query(&[
                ("keys", keys.join(",")),
                ("startTs", start_ts.to_string()),
                ("endTs", end_ts.to_string()),
            ]);
        let response = check_status(authorized(request, session)?.send().await?).await?;
        let series = response.json::<BTreeMap<String, Vec<TsValue>>>().await?;

        Ok(series
            .into_iter()
            .map(|(key, values)| {
                let samples = values
                    .into_iter()
                    .filter(|value| value.value != Value::Null)
                    .map(|value| TelemetrySample::new(key.clone(), value.ts, value.value))
                    .collect();
                (key, samples)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfigBuilder;
    use crate::domain::sample::{Scalar, SampleValue};
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use reqwest::Client;
    use std::sync::Arc;

    fn platform_client(url: String) -> PlatformClient {
        PlatformClient::new(Client::new(), Arc::new(AppConfigBuilder::new().platform_url(url).build()))
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[tokio::test]
    async fn latest_returns_the_most_recent_sample_per_key() -> Result<(), PlatformError> {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/api/plugins/telemetry/DEVICE/dev-1/values/timeseries")
            .match_query(Matcher::UrlEncoded("keys".into(), "1,10".into()))
            .match_header("x-authorization", "Bearer jwt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "1": [{ "ts": 1700000000000, "value": "{\"temp\":4.5,\"hum\":71,\"bat\":88}" }],
                  "10": [{ "ts": 1700000000500, "value": "{\"voltage\":229.8}" }]
                }"#,
            )
            .create_async()
            .await;

        let samples = platform_client(server.url()).latest(&Session::new("jwt", None), "dev-1", &keys(&["1", "10"])).await?;

        mock.assert();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].key, "1");
        assert_eq!(samples[0].ts, 1700000000000);
        assert_eq!(samples[0].value.field_f64("temp"), Some(4.5));
        assert_eq!(samples[1].value.field_f64("voltage"), Some(229.8));
        Ok(())
    }

    #[tokio::test]
    async fn latest_skips_keys_without_values() -> Result<(), PlatformError> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/plugins/telemetry/DEVICE/dev-1/values/timeseries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{ "1": [{ "ts": 1, "value": "7" }], "unknown": [{ "ts": 2, "value": null }], "empty": [] }"#)
            .create_async()
            .await;

        let samples = platform_client(server.url())
            .latest(&Session::new("jwt", None), "dev-1", &keys(&["1", "unknown", "empty"]))
            .await?;

        assert_eq!(samples, vec![TelemetrySample {
            key: "1".to_string(),
            ts: 1,
            value: SampleValue::Scalar(Scalar::Number(7.0)),
        }]);
        Ok(())
    }

    #[tokio::test]
    async fn latest_rejects_empty_keys_without_calling_the_platform() {
        let result = platform_client("http://127.0.0.1:1".to_string()).latest(&Session::new("jwt", None), "dev-1", &[]).await;

        assert!(matches!(result, Err(PlatformError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn latest_surfaces_platform_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/plugins/telemetry/DEVICE/dev-1/values/timeseries")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = platform_client(server.url()).latest(&Session::new("jwt", None), "dev-1", &keys(&["1"])).await;

        assert!(matches!(result, Err(PlatformError::Status { .. })));
    }

    #[tokio::test]
    async fn timeseries_returns_all_samples_in_the_range() -> Result<(), PlatformError> {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/api/plugins/telemetry/DEVICE/dev-1/values/timeseries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("keys".into(), "1".into()),
                Matcher::UrlEncoded("startTs".into(), "1000".into()),
                Matcher::UrlEncoded("endTs".into(), "5000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{ "1": [{ "ts": 3000, "value": "{\"temp\":5}" }, { "ts": 2000, "value": "{\"temp\":4}" }] }"#)
            .create_async()
            .await;

        let series = platform_client(server.url())
            .timeseries(&Session::new("jwt", None), "dev-1", &keys(&["1"]), 1000, 5000)
            .await?;

        mock.assert();
        assert_eq!(series["1"].len(), 2);
        assert_eq!(series["1"][1].value.field_f64("temp"), Some(4.0));
        Ok(())
    }

    #[tokio::test]
    async fn timeseries_rejects_an_inverted_range() {
        let result = platform_client("http://127.0.0.1:1".to_string())
            .timeseries(&Session::new("jwt", None), "dev-1", &keys(&["1"]), 5000, 1000)
            .await;

        assert!(matches!(result, Err(PlatformError::InvalidRequest(_))));
    }
}

use crate::domain::device_profile::DeviceProfile;
use crate::domain::sample::{SampleValue, TelemetrySample};
use crate::domain::session::Session;
use crate::domain::telemetry_source::TelemetrySource;
use crate::platform::PlatformError;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, instrument};

pub type Series = BTreeMap<String, Vec<TelemetrySample>>;

/// One table row: the value of every requested key at a single timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRow {
    pub ts: i64,
    pub values: BTreeMap<String, Option<SampleValue>>,
}

impl HistoryRow {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }
}

/// Pivots per-key series into rows ordered by timestamp. Keys without a sample at a timestamp are `None`.
pub fn pivot_rows(series: &Series, keys: &[String]) -> Vec<HistoryRow> {
    let timestamps: BTreeSet<i64> = keys
        .iter()
        .filter_map(|key| series.get(key))
        .flat_map(|samples| samples.iter().map(|s| s.ts))
        .collect();

    timestamps
        .into_iter()
        .map(|ts| HistoryRow {
            ts,
            values: keys
                .iter()
                .map(|key| {
                    let value = series.get(key).and_then(|samples| samples.iter().find(|s| s.ts == ts)).map(|s| s.value.clone());
                    (key.clone(), value)
                })
                .collect(),
        })
        .collect()
}

/// Chart points for one composite sub-field. Missing or non-numeric values are plotted as 0.
pub fn field_series(series: &Series, key: &str, field: &str) -> Vec<(DateTime<Utc>, f64)> {
    let mut points: Vec<(DateTime<Utc>, f64)> = series
        .get(key)
        .into_iter()
        .flatten()
        .filter_map(|sample| {
            let time = DateTime::from_timestamp_millis(sample.ts)?;
            Some((time, sample.value.field_f64(field).unwrap_or(0.0)))
        })
        .collect();

    points.sort_by_key(|(time, _)| *time);
    points
}

/// Fetches the climate history of a device over the last `window`.
#[instrument(skip(source, session, profile), fields(device_id = %profile.id))]
pub async fn load_history(source: &dyn TelemetrySource, session: &Session, profile: &DeviceProfile, window: Duration) -> Result<Series, PlatformError> {
    let Some(climate_key) = profile.climate_key() else {
        return Ok(Series::new());
    };

    let end = Utc::now();
    let start = TimeDelta::from_std(window)
        .ok()
        .and_then(|window| end.checked_sub_signed(window))
        .unwrap_or(DateTime::UNIX_EPOCH);
    info!("📈 Loading history since {}...", start.format("%Y-%m-%d %H:%M"));

    let series = source
        .timeseries(session, &profile.device_id, &[climate_key.to_string()], start.timestamp_millis(), end.timestamp_millis())
        .await?;

    info!("📈 Loading history since {}... OK", start.format("%Y-%m-%d %H:%M"));
    Ok(series)
}

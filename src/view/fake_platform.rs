use crate::domain::attribute_store::{AttributeStore, Attributes};
use crate::domain::events::ViewEvent;
use crate::domain::live_feed::LiveFeed;
use crate::domain::sample::TelemetrySample;
use crate::domain::session::Session;
use crate::domain::subscription::SubscriptionHandle;
use crate::domain::telemetry_source::TelemetrySource;
use crate::platform::PlatformError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::Sender;
use tokio::sync::{Notify, oneshot};

/// In-memory platform that records what the reconciler asks of it.
#[derive(Debug, Default)]
pub struct FakePlatform {
    pub samples: Mutex<Vec<TelemetrySample>>,
    pub attributes: Mutex<Attributes>,
    pub writes: Mutex<Vec<Attributes>>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub unauthorized: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub subscriptions: AtomicUsize,
    pub cancelled: Arc<AtomicBool>,
    pub live_tx: Mutex<Option<Sender<ViewEvent>>>,
    /// When set, `latest` waits for a notification before answering.
    pub hold_snapshot: Option<Arc<Notify>>,
    /// When set, `subscribe` waits for a notification before connecting.
    pub hold_subscribe: Option<Arc<Notify>>,
    pub reads: AtomicUsize,
    /// Reads to hold back by their 1-based number. A held read answers with the attributes as they were when it
    /// was issued.
    pub hold_reads: Mutex<BTreeMap<usize, Arc<Notify>>>,
    pub channels: Mutex<Vec<u64>>,
}

impl FakePlatform {
    pub fn with_attributes(attributes: Attributes) -> Self {
        FakePlatform {
            attributes: Mutex::new(attributes),
            ..FakePlatform::default()
        }
    }

    pub fn live_tx(&self) -> Option<Sender<ViewEvent>> {
        self.live_tx.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Attributes> {
        self.writes.lock().unwrap().clone()
    }

    /// Channel numbers of every subscription attempt so far.
    pub fn channels(&self) -> Vec<u64> {
        self.channels.lock().unwrap().clone()
    }

    fn failure(&self) -> PlatformError {
        if self.unauthorized.load(Ordering::SeqCst) {
            PlatformError::Unauthorized
        } else {
            PlatformError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".to_string(),
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for FakePlatform {
    async fn latest(&self, _session: &Session, _device_id: &str, keys: &[String]) -> Result<Vec<TelemetrySample>, PlatformError> {
        if let Some(hold) = &self.hold_snapshot {
            hold.notified().await;
        }
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(PlatformError::Unauthorized);
        }
        let samples = self.samples.lock().unwrap();
        Ok(samples.iter().filter(|s| keys.contains(&s.key)).cloned().collect())
    }

    async fn timeseries(
        &self,
        _session: &Session,
        _device_id: &str,
        keys: &[String],
        start_ts: i64,
        end_ts: i64,
    ) -> Result<BTreeMap<String, Vec<TelemetrySample>>, PlatformError> {
        let samples = self.samples.lock().unwrap();
        let mut series: BTreeMap<String, Vec<TelemetrySample>> = BTreeMap::new();
        for sample in samples.iter().filter(|s| keys.contains(&s.key) && (start_ts..=end_ts).contains(&s.ts)) {
            series.entry(sample.key.clone()).or_default().push(sample.clone());
        }
        Ok(series)
    }
}

#[async_trait]
impl AttributeStore for FakePlatform {
    async fn read(&self, _session: &Session, _device_id: &str, keys: &[String]) -> Result<Attributes, PlatformError> {
        let number = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let result = if self.fail_reads.load(Ordering::SeqCst) || self.unauthorized.load(Ordering::SeqCst) {
            Err(self.failure())
        } else {
            let attributes = self.attributes.lock().unwrap();
            Ok(attributes.iter().filter(|(key, _)| keys.contains(key)).map(|(k, v)| (k.clone(), v.clone())).collect())
        };

        let hold = self.hold_reads.lock().unwrap().remove(&number);
        if let Some(hold) = hold {
            hold.notified().await;
        }
        result
    }

    async fn write(&self, _session: &Session, _device_id: &str, payload: &Attributes) -> Result<(), PlatformError> {
        if self.fail_writes.load(Ordering::SeqCst) || self.unauthorized.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        self.writes.lock().unwrap().push(payload.clone());
        self.attributes.lock().unwrap().extend(payload.clone());
        Ok(())
    }
}

#[async_trait]
impl LiveFeed for FakePlatform {
    async fn subscribe(&self, _session: &Session, _device_id: &str, _keys: &[String], channel: u64, tx: Sender<ViewEvent>) -> Result<SubscriptionHandle, PlatformError> {
        if let Some(hold) = &self.hold_subscribe {
            hold.notified().await;
        }
        self.channels.lock().unwrap().push(channel);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(PlatformError::Subscription {
                code: 2,
                message: "unreachable".to_string(),
            });
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.live_tx.lock().unwrap() = Some(tx);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let cancelled = self.cancelled.clone();
        let task = tokio::spawn(async move {
            if cancel_rx.await.is_ok() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
        Ok(SubscriptionHandle::new(cancel_tx, task))
    }
}

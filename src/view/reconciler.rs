use crate::domain::attribute_store::AttributeStore;
use crate::domain::events::{Failure, ViewCommand, ViewEvent};
use crate::domain::live_feed::LiveFeed;
use crate::domain::session::Session;
use crate::domain::subscription::SubscriptionHandle;
use crate::domain::telemetry_source::TelemetrySource;
use crate::view::device_view::{DeviceView, SavePlan};
use crate::view::error::ViewError;
use crate::view::model::DeviceViewModel;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, WeakSender};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// The three platform seams a device view talks to.
#[derive(Clone, Debug)]
pub struct ViewSources {
    pub telemetry: Arc<dyn TelemetrySource>,
    pub attributes: Arc<dyn AttributeStore>,
    pub live: Arc<dyn LiveFeed>,
}

impl ViewSources {
    pub fn shared<P>(platform: Arc<P>) -> Self
    where
        P: TelemetrySource + AttributeStore + LiveFeed + 'static,
    {
        ViewSources {
            telemetry: platform.clone(),
            attributes: platform.clone(),
            live: platform,
        }
    }
}

/// Owns one [`DeviceView`] and applies every event to it in arrival order. Network calls run in spawned tasks
/// that post their outcome back onto the same queue.
#[derive(Debug)]
pub struct Reconciler {
    view: DeviceView,
    session: Session,
    sources: ViewSources,
    tx: WeakSender<ViewEvent>,
    rx: Receiver<ViewEvent>,
    subscription: Option<SubscriptionHandle>,
    // Number of the most recent push channel, and whether it is still connecting
    live_channel: u64,
    subscribing: bool,
    notifier_tx: watch::Sender<DeviceViewModel>,
}

impl Reconciler {
    pub fn new(view: DeviceView, session: Session, sources: ViewSources, tx: WeakSender<ViewEvent>, rx: Receiver<ViewEvent>) -> (Self, watch::Receiver<DeviceViewModel>) {
        let (notifier_tx, notifier_rx) = watch::channel(view.model());

        let reconciler = Reconciler {
            view,
            session,
            sources,
            tx,
            rx,
            subscription: None,
            live_channel: 0,
            subscribing: false,
            notifier_tx,
        };
        (reconciler, notifier_rx)
    }

    #[instrument(skip_all, fields(device_id = %self.view.profile().id))]
    pub async fn run(mut self) {
        info!("🔵 Opening device view...");
        self.reload();
        info!("🔵 Opening device view... OK");

        while let Some(event) = self.rx.recv().await {
            debug!("🔵 Received event: {:?}", event);
            if matches!(event, ViewEvent::Command(ViewCommand::Discard)) {
                break;
            }
            self.apply(event);
            self.publish();
        }

        self.shutdown();
    }

    fn apply(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::SnapshotLoaded(samples) => {
                let applied = self.view.apply_snapshot(samples);
                debug!("🔸 Applied {} snapshot sample(s)", applied);
            }
            ViewEvent::SnapshotFailed(failure) => self.view.snapshot_failed(failure),
            ViewEvent::AttributesLoaded { generation, attributes } => {
                self.view.apply_attributes(generation, attributes);
            }
            ViewEvent::AttributesFailed { generation, failure } => self.view.attributes_failed(generation, failure),
            ViewEvent::Subscribed { channel, handle } => {
                if self.subscribing && channel == self.live_channel {
                    self.subscribing = false;
                    self.subscription = Some(handle);
                    self.view.set_live(true);
                    info!("🟢 Live updates started on channel #{}", channel);
                } else {
                    // Dropping the handle closes the channel
                    debug!("Ignoring subscription for channel #{}, current is #{}", channel, self.live_channel);
                }
            }
            ViewEvent::SubscribeFailed { channel, failure } => {
                if self.subscribing && channel == self.live_channel {
                    self.subscribing = false;
                    self.view.subscribe_failed(failure);
                } else {
                    debug!("Ignoring failed subscription for channel #{}: {}", channel, failure.message);
                }
            }
            ViewEvent::LiveUpdate(update) => {
                self.view.apply_live_update(update);
            }
            ViewEvent::LiveChannelClosed { channel, reason } => {
                if channel == self.live_channel {
                    self.subscribing = false;
                    self.subscription = None;
                    self.view.live_closed(&reason);
                } else {
                    debug!("Ignoring close of channel #{}, current is #{}: {}", channel, self.live_channel, reason);
                }
            }
            ViewEvent::SaveSucceeded {
                key,
                revision,
                generation,
                written,
                refreshed,
            } => self.view.confirm_save(&key, revision, generation, written, refreshed),
            ViewEvent::SaveFailed { key, revision, failure } => self.view.fail_save(&key, revision, failure),
            ViewEvent::Command(command) => {
                if let Err(e) = self.execute(command) {
                    warn!("⚠️ Rejected command: {}", e);
                    self.view.notify_error(e.to_string());
                }
            }
        }
    }

    fn execute(&mut self, command: ViewCommand) -> Result<(), ViewError> {
        match command {
            ViewCommand::BeginEdit { key } => self.view.begin_edit(&key),
            ViewCommand::UpdateEdit { key, value } => self.view.update_edit(&key, value),
            ViewCommand::SetField { key, field, value } => self.view.set_edit_field(&key, &field, value),
            ViewCommand::ToggleField { key, field } => self.view.toggle_edit_field(&key, &field),
            ViewCommand::EditSafeZone { index, slot } => self.view.edit_safe_zone(index, slot),
            ViewCommand::CancelEdit { key } => self.view.cancel_edit(&key),
            ViewCommand::Save { key } => {
                let plan = self.view.save_payload(&key)?;
                self.spawn_save(plan);
                Ok(())
            }
            ViewCommand::Reload => {
                self.reload();
                Ok(())
            }
            ViewCommand::DismissNotification => {
                self.view.dismiss_notification();
                Ok(())
            }
            ViewCommand::Discard => Err(ViewError::Discarded),
        }
    }

    /// Refetches both slices and resubscribes when the push channel is gone. Nothing here waits on the network.
    fn reload(&mut self) {
        self.view.start_loading();
        self.publish();

        self.spawn_snapshot();
        self.spawn_attributes();

        if !self.subscribing && self.subscription.as_ref().is_none_or(SubscriptionHandle::is_closed) {
            self.spawn_subscribe();
        }
    }

    fn spawn_subscribe(&mut self) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.live_channel += 1;
        self.subscribing = true;
        let channel = self.live_channel;
        let live = self.sources.live.clone();
        let session = self.session.clone();
        let profile = self.view.profile().clone();

        tokio::spawn(async move {
            debug!(device_id = profile.id, "🟢 Subscribing on channel #{}...", channel);
            let event = match live.subscribe(&session, &profile.device_id, &profile.telemetry_keys, channel, tx.clone()).await {
                Ok(handle) => ViewEvent::Subscribed { channel, handle },
                Err(e) => ViewEvent::SubscribeFailed { channel, failure: e.into() },
            };
            // An undelivered handle is dropped, which closes the channel
            tx.send(event).await.unwrap_or_default();
        });
    }

    fn spawn_snapshot(&self) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let source = self.sources.telemetry.clone();
        let session = self.session.clone();
        let profile = self.view.profile().clone();

        tokio::spawn(async move {
            let event = match source.latest(&session, &profile.device_id, &profile.telemetry_keys).await {
                Ok(samples) => ViewEvent::SnapshotLoaded(samples),
                Err(e) => ViewEvent::SnapshotFailed(e.into()),
            };
            // The view may have been discarded in the meantime
            tx.send(event).await.unwrap_or_default();
        });
    }

    fn spawn_attributes(&mut self) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let generation = self.view.next_attributes_generation();
        let store = self.sources.attributes.clone();
        let session = self.session.clone();
        let profile = self.view.profile().clone();

        tokio::spawn(async move {
            let event = match store.read(&session, &profile.device_id, &profile.attribute_keys).await {
                Ok(attributes) => ViewEvent::AttributesLoaded { generation, attributes },
                Err(e) => ViewEvent::AttributesFailed { generation, failure: e.into() },
            };
            tx.send(event).await.unwrap_or_default();
        });
    }

    fn spawn_save(&self, plan: SavePlan) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let store = self.sources.attributes.clone();
        let session = self.session.clone();
        let profile = self.view.profile().clone();

        tokio::spawn(async move {
            debug!(device_id = profile.id, "💾 Saving '{}'...", plan.key);
            let event = match store.write(&session, &profile.device_id, &plan.payload).await {
                Ok(()) => {
                    debug!(device_id = profile.id, "💾 Saving '{}'... OK", plan.key);
                    let refreshed = store.read(&session, &profile.device_id, &profile.attribute_keys).await.map_err(Failure::from);
                    ViewEvent::SaveSucceeded {
                        key: plan.key,
                        revision: plan.revision,
                        generation: plan.generation,
                        written: plan.written,
                        refreshed,
                    }
                }
                Err(e) => ViewEvent::SaveFailed {
                    key: plan.key,
                    revision: plan.revision,
                    failure: e.into(),
                },
            };
            tx.send(event).await.unwrap_or_default();
        });
    }

    fn publish(&self) {
        self.notifier_tx.send_replace(self.view.model());
    }

    fn shutdown(&mut self) {
        info!("🔵 Discarding device view...");
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.rx.close();
        self.view.discard();
        self.publish();
        info!("🔵 Discarding device view... OK");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute_store::Attributes;
    use crate::domain::device_profile::warehouse_profile;
    use crate::domain::events::LiveUpdate;
    use crate::domain::sample::TelemetrySample;
    use crate::view::fake_platform::FakePlatform;
    use crate::view::model::{NotificationLevel, SliceStatus, ViewState};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, Sender};
    use tokio::sync::{Notify, watch::Receiver as WatchReceiver};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    fn start(platform: Arc<FakePlatform>) -> (Sender<ViewEvent>, WatchReceiver<DeviceViewModel>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let view = DeviceView::new(Arc::new(warehouse_profile()));
        let (reconciler, notifier) = Reconciler::new(view, Session::new("jwt", None), ViewSources::shared(platform), tx.downgrade(), rx);
        (tx, notifier, tokio::spawn(reconciler.run()))
    }

    async fn wait_until<F>(notifier: &mut WatchReceiver<DeviceViewModel>, condition: F) -> DeviceViewModel
    where
        F: FnMut(&DeviceViewModel) -> bool,
    {
        timeout(Duration::from_secs(2), notifier.wait_for(condition))
            .await
            .expect("condition not reached in time")
            .expect("reconciler stopped")
            .clone()
    }

    fn settings(temp: i64) -> Attributes {
        Attributes::from([("1".to_string(), json!({ "name": "Kho A" })), ("set-1".to_string(), json!({ "temp": temp }))])
    }

    #[test_log::test(tokio::test)]
    async fn run_loads_both_slices_and_goes_live() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        platform.samples.lock().unwrap().push(TelemetrySample::new("1", 100, json!(r#"{"temp":21.5,"hum":60}"#)));
        let (_tx, mut notifier, _task) = start(platform.clone());

        let model = wait_until(&mut notifier, |m| m.state == ViewState::Ready && m.live).await;

        assert_eq!(model.climate().and_then(|c| c.temperature), Some(21.5));
        assert_eq!(model.climate().and_then(|c| c.humidity), Some(60.0));
        assert_eq!(model.settings().map(|s| s["temp"].clone()), Some(json!(18)));
        assert_eq!(platform.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn edit_and_save_round_trips_through_the_attribute_store() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        let (tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;

        tx.send(ViewEvent::Command(ViewCommand::BeginEdit { key: "set-1".to_string() })).await.unwrap();
        tx.send(ViewEvent::Command(ViewCommand::SetField {
            key: "set-1".to_string(),
            field: "temp".to_string(),
            value: json!(20),
        }))
        .await
        .unwrap();
        tx.send(ViewEvent::Command(ViewCommand::Save { key: "set-1".to_string() })).await.unwrap();

        let model = wait_until(&mut notifier, |m| m.notification.as_ref().is_some_and(|n| n.level == NotificationLevel::Success)).await;

        assert_eq!(platform.writes(), vec![settings(20)]);
        assert!(!model.is_pending("set-1"));
        assert_eq!(model.settings().map(|s| s["temp"].clone()), Some(json!(20)));
        assert_eq!(model.state, ViewState::Ready);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_edit() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        platform.fail_writes.store(true, Ordering::SeqCst);
        let (tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;

        tx.send(ViewEvent::Command(ViewCommand::BeginEdit { key: "set-1".to_string() })).await.unwrap();
        tx.send(ViewEvent::Command(ViewCommand::UpdateEdit {
            key: "set-1".to_string(),
            value: json!({ "temp": 25 }),
        }))
        .await
        .unwrap();
        tx.send(ViewEvent::Command(ViewCommand::Save { key: "set-1".to_string() })).await.unwrap();

        let model = wait_until(&mut notifier, |m| m.notification.as_ref().is_some_and(|n| n.level == NotificationLevel::Error)).await;

        assert!(model.is_pending("set-1"));
        assert!(model.saving.is_empty());
        assert_eq!(model.settings().map(|s| s["temp"].clone()), Some(json!(25)));
        assert_eq!(platform.attributes.lock().unwrap()["set-1"], json!({ "temp": 18 }));
    }

    #[tokio::test]
    async fn unauthorized_loads_require_a_new_login() {
        let platform = Arc::new(FakePlatform::default());
        platform.unauthorized.store(true, Ordering::SeqCst);
        let (_tx, mut notifier, _task) = start(platform);

        let model = wait_until(&mut notifier, |m| m.attributes_status == SliceStatus::Failed && m.telemetry_status == SliceStatus::Failed).await;

        assert!(model.login_required);
        assert_eq!(model.notification.map(|n| n.level), Some(NotificationLevel::LoginRequired));
    }

    #[tokio::test]
    async fn closed_push_channel_falls_back_to_snapshot_data() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        let (tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.live).await;

        tx.send(ViewEvent::LiveChannelClosed {
            channel: 1,
            reason: "stream ended".to_string(),
        })
        .await
        .unwrap();
        let model = wait_until(&mut notifier, |m| !m.live).await;

        assert_eq!(model.notification, None);
        assert_eq!(platform.subscriptions.load(Ordering::SeqCst), 1);

        tx.send(ViewEvent::Command(ViewCommand::Reload)).await.unwrap();
        wait_until(&mut notifier, |m| m.live).await;
        assert_eq!(platform.subscriptions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn live_updates_merge_into_the_published_model() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        let (_tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.live && m.state == ViewState::Ready).await;

        let live_tx = platform.live_tx().unwrap();
        live_tx
            .send(ViewEvent::LiveUpdate(LiveUpdate {
                subscription_id: 1,
                samples: vec![TelemetrySample::new("10", 500, json!(r#"{"voltage":230.5}"#))],
            }))
            .await
            .unwrap();

        let model = wait_until(&mut notifier, |m| m.sample("10").is_some()).await;
        assert_eq!(model.power().and_then(|p| p.voltage), Some(230.5));
    }

    #[tokio::test]
    async fn discard_cancels_the_subscription_and_ignores_late_results() {
        let hold = Arc::new(Notify::new());
        let platform = Arc::new(FakePlatform {
            hold_snapshot: Some(hold.clone()),
            ..FakePlatform::with_attributes(settings(18))
        });
        platform.samples.lock().unwrap().push(TelemetrySample::new("1", 100, json!(r#"{"temp":4}"#)));
        let (tx, mut notifier, task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.live).await;

        tx.send(ViewEvent::Command(ViewCommand::Discard)).await.unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        hold.notify_one();
        tokio::task::yield_now().await;

        let model = notifier.borrow().clone();
        assert_eq!(model.state, ViewState::Discarded);
        assert!(!model.live);
        assert_eq!(model.sample("1"), None);
        timeout(Duration::from_secs(2), async {
            while !platform.cancelled.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn failed_subscribe_can_be_retried_with_a_reload() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        platform.fail_subscribe.store(true, Ordering::SeqCst);
        let (tx, mut notifier, _task) = start(platform.clone());
        let model = wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;
        assert!(!model.live);
        // The failure is queued by the time the attempt is recorded
        timeout(Duration::from_secs(2), async {
            while platform.channels().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        platform.fail_subscribe.store(false, Ordering::SeqCst);
        tx.send(ViewEvent::Command(ViewCommand::Reload)).await.unwrap();
        let model = wait_until(&mut notifier, |m| m.live).await;

        assert_eq!(model.notification, None);
        assert_eq!(platform.channels(), vec![1, 2]);
    }

    #[tokio::test]
    async fn slow_subscribe_does_not_hold_up_loading() {
        let hold = Arc::new(Notify::new());
        let platform = Arc::new(FakePlatform {
            hold_subscribe: Some(hold.clone()),
            ..FakePlatform::with_attributes(settings(18))
        });
        let (_tx, mut notifier, _task) = start(platform.clone());

        let model = wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;
        assert!(!model.live);
        assert_eq!(model.settings().map(|s| s["temp"].clone()), Some(json!(18)));

        hold.notify_one();
        wait_until(&mut notifier, |m| m.live).await;
        assert_eq!(platform.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discard_does_not_wait_for_a_stalled_subscribe() {
        let platform = Arc::new(FakePlatform {
            hold_subscribe: Some(Arc::new(Notify::new())),
            ..FakePlatform::with_attributes(settings(18))
        });
        let (tx, mut notifier, task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;

        tx.send(ViewEvent::Command(ViewCommand::Discard)).await.unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        assert_eq!(notifier.borrow().state, ViewState::Discarded);
        assert_eq!(platform.subscriptions.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn a_read_issued_before_a_save_does_not_roll_it_back() {
        let held_read = Arc::new(Notify::new());
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        // The first read loads the view, the second comes from the reload below
        platform.hold_reads.lock().unwrap().insert(2, held_read.clone());
        let (tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.state == ViewState::Ready).await;

        tx.send(ViewEvent::Command(ViewCommand::Reload)).await.unwrap();
        tx.send(ViewEvent::Command(ViewCommand::BeginEdit { key: "set-1".to_string() })).await.unwrap();
        tx.send(ViewEvent::Command(ViewCommand::SetField {
            key: "set-1".to_string(),
            field: "temp".to_string(),
            value: json!(20),
        }))
        .await
        .unwrap();
        tx.send(ViewEvent::Command(ViewCommand::Save { key: "set-1".to_string() })).await.unwrap();
        wait_until(&mut notifier, |m| m.notification.as_ref().is_some_and(|n| n.level == NotificationLevel::Success)).await;

        held_read.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(ViewEvent::Command(ViewCommand::DismissNotification)).await.unwrap();
        let model = wait_until(&mut notifier, |m| m.notification.is_none()).await;

        assert_eq!(platform.reads.load(Ordering::SeqCst), 3);
        assert_eq!(model.settings().map(|s| s["temp"].clone()), Some(json!(20)));
        assert!(!model.is_pending("set-1"));
        assert_eq!(model.state, ViewState::Ready);
    }

    #[tokio::test]
    async fn close_of_a_replaced_channel_keeps_the_new_one() {
        let platform = Arc::new(FakePlatform::with_attributes(settings(18)));
        let (tx, mut notifier, _task) = start(platform.clone());
        wait_until(&mut notifier, |m| m.live && m.state == ViewState::Ready).await;

        tx.send(ViewEvent::LiveChannelClosed {
            channel: 1,
            reason: "stream ended".to_string(),
        })
        .await
        .unwrap();
        wait_until(&mut notifier, |m| !m.live).await;
        tx.send(ViewEvent::Command(ViewCommand::Reload)).await.unwrap();
        wait_until(&mut notifier, |m| m.live && m.state == ViewState::Ready).await;
        assert_eq!(platform.channels(), vec![1, 2]);

        // The first channel's pump reports its end late
        tx.send(ViewEvent::LiveChannelClosed {
            channel: 1,
            reason: "stream ended".to_string(),
        })
        .await
        .unwrap();
        tx.send(ViewEvent::Command(ViewCommand::BeginEdit { key: "set-1".to_string() })).await.unwrap();
        let model = wait_until(&mut notifier, |m| m.is_pending("set-1")).await;

        assert!(model.live);
        platform
            .live_tx()
            .unwrap()
            .send(ViewEvent::LiveUpdate(LiveUpdate {
                subscription_id: 2,
                samples: vec![TelemetrySample::new("1", 300, json!(r#"{"temp":3.5}"#))],
            }))
            .await
            .unwrap();
        let model = wait_until(&mut notifier, |m| m.sample("1").is_some()).await;
        assert_eq!(model.climate().and_then(|c| c.temperature), Some(3.5));
        assert!(model.live);
    }
}

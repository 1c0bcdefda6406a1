use crate::domain::device_profile::DeviceProfile;
use crate::domain::events::{ViewCommand, ViewEvent};
use crate::domain::safe_zone::SafeZoneSlot;
use crate::domain::session::Session;
use crate::view::device_view::DeviceView;
use crate::view::error::ViewClosed;
use crate::view::model::DeviceViewModel;
use crate::view::reconciler::{Reconciler, ViewSources};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// The presentation side of a running device view. Every method enqueues a command; results show up in the
/// published model.
#[derive(Debug)]
pub struct DeviceViewHandle {
    profile: Arc<DeviceProfile>,
    tx: Sender<ViewEvent>,
    notifier_rx: watch::Receiver<DeviceViewModel>,
    task: Option<JoinHandle<()>>,
}

impl DeviceViewHandle {
    /// Starts the reconciler for `profile`. Loading begins immediately.
    pub fn open(profile: Arc<DeviceProfile>, session: Session, sources: ViewSources, buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        let view = DeviceView::new(profile.clone());
        let (reconciler, notifier_rx) = Reconciler::new(view, session, sources, tx.downgrade(), rx);

        DeviceViewHandle {
            profile,
            tx,
            notifier_rx,
            task: Some(tokio::spawn(reconciler.run())),
        }
    }

    pub fn profile(&self) -> &Arc<DeviceProfile> {
        &self.profile
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceViewModel> {
        self.notifier_rx.clone()
    }

    pub fn model(&self) -> DeviceViewModel {
        self.notifier_rx.borrow().clone()
    }

    pub async fn begin_edit(&self, key: impl Into<String>) -> Result<(), ViewClosed> {
        self.send(ViewCommand::BeginEdit { key: key.into() }).await
    }

    pub async fn update_edit(&self, key: impl Into<String>, value: Value) -> Result<(), ViewClosed> {
        self.send(ViewCommand::UpdateEdit { key: key.into(), value }).await
    }

    pub async fn set_field(&self, key: impl Into<String>, field: impl Into<String>, value: Value) -> Result<(), ViewClosed> {
        self.send(ViewCommand::SetField {
            key: key.into(),
            field: field.into(),
            value,
        })
        .await
    }

    pub async fn toggle_field(&self, key: impl Into<String>, field: impl Into<String>) -> Result<(), ViewClosed> {
        self.send(ViewCommand::ToggleField {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn edit_safe_zone(&self, index: usize, slot: SafeZoneSlot) -> Result<(), ViewClosed> {
        self.send(ViewCommand::EditSafeZone { index, slot }).await
    }

    pub async fn cancel_edit(&self, key: impl Into<String>) -> Result<(), ViewClosed> {
        self.send(ViewCommand::CancelEdit { key: key.into() }).await
    }

    pub async fn save(&self, key: impl Into<String>) -> Result<(), ViewClosed> {
        self.send(ViewCommand::Save { key: key.into() }).await
    }

    pub async fn reload(&self) -> Result<(), ViewClosed> {
        self.send(ViewCommand::Reload).await
    }

    pub async fn dismiss_notification(&self) -> Result<(), ViewClosed> {
        self.send(ViewCommand::DismissNotification).await
    }

    /// Stops the view and waits until the push channel is closed.
    pub async fn discard(mut self) {
        debug!(device_id = self.profile.id, "Discarding view");
        self.tx.send(ViewEvent::Command(ViewCommand::Discard)).await.unwrap_or_default();
        if let Some(task) = self.task.take() {
            task.await.unwrap_or_default();
        }
    }

    async fn send(&self, command: ViewCommand) -> Result<(), ViewClosed> {
        self.tx
            .send(ViewEvent::Command(command))
            .await
            .map_err(|_| ViewClosed(self.profile.id.clone()))
    }
}

impl Drop for DeviceViewHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            // Best effort, the reconciler also stops once every sender is gone
            self.tx.try_send(ViewEvent::Command(ViewCommand::Discard)).unwrap_or_default();
        }
    }
}

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Owns a live push-channel subscription. Cancelling (or dropping) the handle closes the channel.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn new(cancel_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        SubscriptionHandle {
            cancel_tx: Some(cancel_tx),
            task,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            // The task may already have ended on its own
            cancel_tx.send(()).unwrap_or_default();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_tx.is_none() || self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

use crate::domain::attribute_store::Attributes;
use crate::domain::safe_zone::SafeZoneSlot;
use crate::domain::sample::TelemetrySample;
use crate::domain::subscription::SubscriptionHandle;
use crate::platform::PlatformError;
use serde_json::Value;

/// Everything the reconciler reacts to, processed one at a time in arrival order.
///
/// Attribute reads carry the generation they were issued with so an older read can never replace a newer one. Push
/// channel events carry the channel number chosen by the reconciler when it subscribed.
#[derive(Debug)]
pub enum ViewEvent {
    SnapshotLoaded(Vec<TelemetrySample>),
    SnapshotFailed(Failure),
    AttributesLoaded {
        generation: u64,
        attributes: Attributes,
    },
    AttributesFailed {
        generation: u64,
        failure: Failure,
    },
    Subscribed {
        channel: u64,
        handle: SubscriptionHandle,
    },
    SubscribeFailed {
        channel: u64,
        failure: Failure,
    },
    LiveUpdate(LiveUpdate),
    LiveChannelClosed {
        channel: u64,
        reason: String,
    },
    SaveSucceeded {
        key: String,
        revision: u64,
        generation: u64,
        written: Value,
        refreshed: Result<Attributes, Failure>,
    },
    SaveFailed {
        key: String,
        revision: u64,
        failure: Failure,
    },
    Command(ViewCommand),
}

/// User intents coming from the presentation side.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    BeginEdit { key: String },
    UpdateEdit { key: String, value: Value },
    SetField { key: String, field: String, value: Value },
    ToggleField { key: String, field: String },
    EditSafeZone { index: usize, slot: SafeZoneSlot },
    CancelEdit { key: String },
    Save { key: String },
    Reload,
    DismissNotification,
    Discard,
}

/// One push-channel message: the changed keys since the previous message.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub subscription_id: i64,
    pub samples: Vec<TelemetrySample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthorized,
    Transport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn transport(message: impl Into<String>) -> Self {
        Failure {
            kind: FailureKind::Transport,
            message: message.into(),
        }
    }
}

impl From<&PlatformError> for Failure {
    fn from(error: &PlatformError) -> Self {
        Failure {
            kind: if error.is_unauthorized() { FailureKind::Unauthorized } else { FailureKind::Transport },
            message: error.to_string(),
        }
    }
}

impl From<PlatformError> for Failure {
    fn from(error: PlatformError) -> Self {
        Failure::from(&error)
    }
}

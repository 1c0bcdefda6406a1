use crate::domain::attribute_store::Attributes;
use crate::domain::device_profile::DeviceProfile;
use crate::domain::events::{Failure, FailureKind, LiveUpdate};
use crate::domain::safe_zone::{SafeZoneSlot, SafeZones};
use crate::domain::sample::{SampleValue, TelemetrySample, value_as_bool};
use crate::view::error::ViewError;
use crate::view::model::{DeviceViewModel, Notification, NotificationLevel, SliceStatus, ViewState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq)]
struct PendingEdit {
    value: Value,
    revision: u64,
    // Revision of the value currently being written, if any
    saving: Option<u64>,
}

/// What to send to the attribute store to persist one pending edit.
#[derive(Clone, Debug, PartialEq)]
pub struct SavePlan {
    pub key: String,
    pub revision: u64,
    /// Attribute generation of the read that follows the write
    pub generation: u64,
    pub written: Value,
    pub payload: Attributes,
}

/// The reconciled state of one device. Telemetry, confirmed attributes and pending edits are kept in separate maps
/// so live telemetry can never touch an attribute that is being edited.
#[derive(Debug)]
pub struct DeviceView {
    profile: Arc<DeviceProfile>,
    started: bool,
    discarded: bool,
    telemetry: BTreeMap<String, TelemetrySample>,
    telemetry_status: SliceStatus,
    attributes: Attributes,
    attributes_status: SliceStatus,
    // Last attribute read handed out, and the newest one applied so far
    issued_generation: u64,
    applied_generation: u64,
    pending: BTreeMap<String, PendingEdit>,
    next_revision: u64,
    live: bool,
    login_required: bool,
    notification: Option<Notification>,
}

impl DeviceView {
    pub fn new(profile: Arc<DeviceProfile>) -> Self {
        DeviceView {
            profile,
            started: false,
            discarded: false,
            telemetry: BTreeMap::new(),
            telemetry_status: SliceStatus::Idle,
            attributes: Attributes::new(),
            attributes_status: SliceStatus::Idle,
            issued_generation: 0,
            applied_generation: 0,
            pending: BTreeMap::new(),
            next_revision: 1,
            live: false,
            login_required: false,
            notification: None,
        }
    }

    pub fn profile(&self) -> &Arc<DeviceProfile> {
        &self.profile
    }

    pub fn state(&self) -> ViewState {
        if self.discarded {
            ViewState::Discarded
        } else if !self.started {
            ViewState::Empty
        } else if !self.pending.is_empty() {
            ViewState::Editing
        } else if self.telemetry_status == SliceStatus::Loading || self.attributes_status == SliceStatus::Loading {
            ViewState::Loading
        } else {
            ViewState::Ready
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// Marks both slices as loading. Data already held stays visible until replaced.
    pub fn start_loading(&mut self) {
        self.started = true;
        self.telemetry_status = SliceStatus::Loading;
        self.attributes_status = SliceStatus::Loading;
    }

    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    pub fn apply_snapshot(&mut self, samples: Vec<TelemetrySample>) -> usize {
        self.telemetry_status = SliceStatus::Ready;
        samples.into_iter().filter(|sample| self.apply_sample(sample.clone())).count()
    }

    /// Merges one push message. Keys absent from the message keep their current sample.
    pub fn apply_live_update(&mut self, update: LiveUpdate) -> usize {
        update.samples.into_iter().filter(|sample| self.apply_sample(sample.clone())).count()
    }

    /// Replaces the held sample for the key only if the new one is strictly newer.
    pub fn apply_sample(&mut self, sample: TelemetrySample) -> bool {
        if !self.profile.telemetry_keys.contains(&sample.key) {
            debug!(device_id = self.profile.id, "Ignoring sample for unknown key '{}'", sample.key);
            return false;
        }

        if let Some(held) = self.telemetry.get(&sample.key) {
            if sample.ts <= held.ts {
                debug!(device_id = self.profile.id, "Ignoring stale sample for '{}' ({} <= {})", sample.key, sample.ts, held.ts);
                return false;
            }
        }

        if sample.value.is_raw() {
            debug!(device_id = self.profile.id, "Keeping raw value for '{}'", sample.key);
        }
        self.telemetry.insert(sample.key.clone(), sample);
        true
    }

    pub fn telemetry(&self, key: &str) -> Option<&TelemetrySample> {
        self.telemetry.get(key)
    }

    pub fn snapshot_failed(&mut self, failure: Failure) {
        self.telemetry_status = SliceStatus::Failed;
        self.report_failure("Unable to load telemetry", failure);
    }

    /// Numbers an attribute read before it is issued. Reads are applied in this order, whatever order they
    /// complete in.
    pub fn next_attributes_generation(&mut self) -> u64 {
        self.issued_generation += 1;
        self.issued_generation
    }

    /// Replaces the confirmed attributes with the server's view, unless a newer read was already applied. Pending
    /// edits are left alone.
    pub fn apply_attributes(&mut self, generation: u64, attributes: Attributes) -> bool {
        if generation < self.applied_generation {
            debug!(device_id = self.profile.id, "Ignoring attribute read #{}, #{} is newer", generation, self.applied_generation);
            return false;
        }

        self.applied_generation = generation;
        self.attributes_status = SliceStatus::Ready;
        self.attributes = attributes
            .into_iter()
            .filter(|(key, _)| self.profile.attribute_keys.contains(key))
            .collect();
        true
    }

    pub fn attributes_failed(&mut self, generation: u64, failure: Failure) {
        if generation < self.applied_generation {
            debug!(device_id = self.profile.id, "Ignoring failed attribute read #{}: {}", generation, failure.message);
            return;
        }
        self.attributes_status = SliceStatus::Failed;
        self.report_failure("Unable to load attributes", failure);
    }

    pub fn confirmed_attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The value the user should see: the pending edit if there is one, the confirmed value otherwise.
    pub fn displayed_attribute(&self, key: &str) -> Option<&Value> {
        self.pending.get(key).map(|edit| &edit.value).or_else(|| self.attributes.get(key))
    }

    pub fn begin_edit(&mut self, key: &str) -> Result<(), ViewError> {
        self.ensure_editable(key)?;
        if matches!(self.attributes_status, SliceStatus::Idle | SliceStatus::Loading) && !self.attributes.contains_key(key) {
            return Err(ViewError::NotReady);
        }
        if self.pending.contains_key(key) {
            return Ok(());
        }

        let confirmed = self.attributes.get(key).cloned().unwrap_or(Value::Null);
        let value = if self.is_zone_key(key) {
            SafeZones::from_attribute(&confirmed).to_attribute()
        } else {
            confirmed
        };

        let revision = self.bump_revision();
        self.pending.insert(key.to_string(), PendingEdit { value, revision, saving: None });
        debug!(device_id = self.profile.id, "✏️ Editing '{}'", key);
        Ok(())
    }

    pub fn update_edit(&mut self, key: &str, value: Value) -> Result<(), ViewError> {
        self.modify_edit(key, |current| *current = value)
    }

    pub fn set_edit_field(&mut self, key: &str, field: &str, value: Value) -> Result<(), ViewError> {
        self.modify_edit(key, |current| {
            let mut map = as_composite(current);
            map.insert(field.to_string(), value);
            *current = Value::Object(map);
        })
    }

    pub fn toggle_edit_field(&mut self, key: &str, field: &str) -> Result<(), ViewError> {
        self.modify_edit(key, |current| {
            let mut map = as_composite(current);
            let enabled = map.get(field).and_then(value_as_bool).unwrap_or(false);
            map.insert(field.to_string(), Value::Bool(!enabled));
            *current = Value::Object(map);
        })
    }

    pub fn edit_safe_zone(&mut self, index: usize, slot: SafeZoneSlot) -> Result<(), ViewError> {
        let (zone_key, _, _) = self.profile.geofence_keys().ok_or(ViewError::MissingCapability("geofence"))?;
        let zone_key = zone_key.to_string();
        let edit = self.pending.get(&zone_key).ok_or_else(|| ViewError::NoPendingEdit(zone_key.clone()))?;

        let mut zones = SafeZones::from_attribute(&edit.value);
        *zones.slot_mut(index).ok_or(ViewError::InvalidSlot(index))? = slot;
        self.modify_edit(&zone_key, |current| *current = zones.to_attribute())
    }

    /// Drops the pending edit; the confirmed value shows again.
    pub fn cancel_edit(&mut self, key: &str) -> Result<(), ViewError> {
        if self.discarded {
            return Err(ViewError::Discarded);
        }
        self.pending.remove(key).ok_or_else(|| ViewError::NoPendingEdit(key.to_string()))?;
        debug!(device_id = self.profile.id, "✏️ Cancelled editing '{}'", key);
        Ok(())
    }

    /// Builds the full attribute payload for saving `key` and marks the edit as being saved.
    pub fn save_payload(&mut self, key: &str) -> Result<SavePlan, ViewError> {
        if self.discarded {
            return Err(ViewError::Discarded);
        }
        let is_zone_key = self.is_zone_key(key);
        let edit = self.pending.get_mut(key).ok_or_else(|| ViewError::NoPendingEdit(key.to_string()))?;
        if edit.saving == Some(edit.revision) {
            return Err(ViewError::SaveInProgress(key.to_string()));
        }

        let written = if is_zone_key {
            SafeZones::from_attribute(&edit.value).to_attribute()
        } else {
            edit.value.clone()
        };
        edit.saving = Some(edit.revision);

        let revision = edit.revision;

        let mut payload = self.attributes.clone();
        payload.insert(key.to_string(), written.clone());

        Ok(SavePlan {
            key: key.to_string(),
            revision,
            generation: self.next_attributes_generation(),
            written,
            payload,
        })
    }

    /// Applies a successful write. The edit is cleared unless the user changed it while it was being saved.
    pub fn confirm_save(&mut self, key: &str, revision: u64, generation: u64, written: Value, refreshed: Result<Attributes, Failure>) {
        let unchanged = self.pending.get(key).is_some_and(|edit| edit.revision == revision);
        if unchanged {
            self.pending.remove(key);
        } else if let Some(edit) = self.pending.get_mut(key) {
            edit.saving = None;
        }

        match refreshed {
            Ok(attributes) => {
                if !self.apply_attributes(generation, attributes) {
                    self.attributes.insert(key.to_string(), written);
                }
                info!(device_id = self.profile.id, "🟢 Saved '{}'", key);
                self.notification = Some(Notification::success(format!("Saved '{}'", key)));
            }
            Err(failure) => {
                // The write went through, use what was written until the next successful read
                self.attributes.insert(key.to_string(), written);
                self.report_failure("Saved, but unable to reload attributes", failure);
            }
        }
    }

    /// Keeps the edit so the user can retry.
    pub fn fail_save(&mut self, key: &str, revision: u64, failure: Failure) {
        if let Some(edit) = self.pending.get_mut(key) {
            if edit.saving == Some(revision) {
                edit.saving = None;
            }
        }
        self.report_failure(&format!("Unable to save '{}'", key), failure);
    }

    pub fn live_closed(&mut self, reason: &str) {
        if self.live {
            warn!(device_id = self.profile.id, "🔴 Live updates stopped: {}", reason);
        }
        self.live = false;
    }

    /// Falls back to snapshot-only data. Only an expired session is worth telling the user about.
    pub fn subscribe_failed(&mut self, failure: Failure) {
        self.live = false;
        match failure.kind {
            FailureKind::Unauthorized => self.report_failure("Unable to start live updates", failure),
            FailureKind::Transport => warn!(device_id = self.profile.id, "🔴 Live updates unavailable: {}", failure.message),
        }
    }

    pub fn notify_error(&mut self, message: impl Into<String>) {
        self.notification = Some(Notification::error(message));
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    pub fn discard(&mut self) {
        self.discarded = true;
        self.live = false;
        self.pending.clear();
    }

    pub fn model(&self) -> DeviceViewModel {
        let mut attributes = self.attributes.clone();
        attributes.extend(self.pending.iter().map(|(key, edit)| (key.clone(), edit.value.clone())));

        DeviceViewModel {
            profile: self.profile.clone(),
            state: self.state(),
            telemetry_status: self.telemetry_status,
            attributes_status: self.attributes_status,
            live: self.live,
            login_required: self.login_required,
            telemetry: self.telemetry.clone(),
            attributes,
            pending: self.pending.keys().cloned().collect(),
            saving: self
                .pending
                .iter()
                .filter(|(_, edit)| edit.saving.is_some())
                .map(|(key, _)| key.clone())
                .collect(),
            notification: self.notification.clone(),
        }
    }

    fn ensure_editable(&self, key: &str) -> Result<(), ViewError> {
        if self.discarded {
            return Err(ViewError::Discarded);
        }
        if !self.profile.attribute_keys.iter().any(|k| k == key) {
            return Err(ViewError::UnknownAttribute(key.to_string()));
        }
        Ok(())
    }

    fn modify_edit<F>(&mut self, key: &str, modify: F) -> Result<(), ViewError>
    where
        F: FnOnce(&mut Value),
    {
        self.ensure_editable(key)?;
        let revision = self.bump_revision();
        let edit = self.pending.get_mut(key).ok_or_else(|| ViewError::NoPendingEdit(key.to_string()))?;
        modify(&mut edit.value);
        edit.revision = revision;
        Ok(())
    }

    fn bump_revision(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }

    fn is_zone_key(&self, key: &str) -> bool {
        self.profile.geofence_keys().is_some_and(|(zone_key, _, _)| zone_key == key)
    }

    fn report_failure(&mut self, context: &str, failure: Failure) {
        warn!(device_id = self.profile.id, "⚠️ {}: {}", context, failure.message);
        self.notification = Some(match failure.kind {
            FailureKind::Unauthorized => {
                self.login_required = true;
                Notification {
                    level: NotificationLevel::LoginRequired,
                    message: "Session expired, log in again".to_string(),
                }
            }
            FailureKind::Transport => Notification::error(format!("{}: {}", context, failure.message)),
        });
    }
}

/// Interprets an edited value as an object, starting from an empty one for anything else.
fn as_composite(value: &Value) -> Map<String, Value> {
    match SampleValue::normalize(value.clone()) {
        SampleValue::Composite(map) => map,
        _ => Map::new(),
    }
}

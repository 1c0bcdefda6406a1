use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ViewError {
    #[error("attribute '{0}' does not belong to this device")]
    UnknownAttribute(String),
    #[error("attributes are still loading")]
    NotReady,
    #[error("attribute '{0}' is not being edited")]
    NoPendingEdit(String),
    #[error("attribute '{0}' is already being saved")]
    SaveInProgress(String),
    #[error("device has no {0} capability")]
    MissingCapability(&'static str),
    #[error("safe zone slot {0} does not exist")]
    InvalidSlot(usize),
    #[error("the view has been discarded")]
    Discarded,
}

#[derive(Error, Debug, PartialEq)]
#[error("device view '{0}' is no longer running")]
pub struct ViewClosed(pub String);

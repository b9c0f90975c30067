use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum SyncError {
    #[error("Remote device unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote command failed: {0}")]
    RemoteCommand(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Control `{control}` cannot send {state}")]
    UnsupportedCommand {
        control: &'static str,
        state: String,
    },

    #[error("No device named `{0}` on the dashboard")]
    UnknownDevice(String),

    #[error("Cannot apply `{input}` to {device}")]
    InvalidInput { device: String, input: String },
}

/// Reasons a pushed payload could not be turned into a canonical state.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The payload does not carry the field this control reads.
    #[error("payload has no `{0}` field")]
    MissingField(&'static str),

    #[error("field `{field}` is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

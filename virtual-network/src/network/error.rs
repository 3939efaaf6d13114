use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("node '{0}' not in network")]
    UnknownNode(String),
    #[error("name '{0}' already exists")]
    DuplicateName(String),
    #[error("'{0}' is not a host")]
    NotAHost(String),
    #[error("'{0}' is not a switch")]
    NotASwitch(String),
    #[error("src and dst not connected: {0} {1}")]
    NotConnected(String, String),
    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },
    #[error("node '{0}' is still running a command")]
    NodeBusy(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetworkError {
    pub(crate) fn invalid_parameter(
        key: &str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            key: key.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

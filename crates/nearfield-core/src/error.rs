use crate::types::{AdapterState, TagHandle, TagTechnology};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("adapter is not enabled")]
    NotEnabled,

    #[error("adapter task rejected in transitional state {0}")]
    AdapterBusy(AdapterState),

    #[error("controller initialization failed: {0}")]
    InitializationFailed(String),

    // Driver errors
    #[error("driver error: {0}")]
    Driver(String),

    #[error("operation timeout after {0}ms")]
    Timeout(u64),

    // Tag session errors
    #[error("handle {0} not registered")]
    HandleNotFound(TagHandle),

    #[error("technology {0} not supported by this tag")]
    TechnologyNotSupported(TagTechnology),

    #[error("no target observed in the field")]
    NoTarget,

    #[error("tag left the field")]
    TagLost,

    #[error("payload of {len} bytes exceeds the {max} byte limit for {tech}")]
    ExceededLength {
        tech: TagTechnology,
        max: usize,
        len: usize,
    },

    #[error("transceive failed: {0}")]
    TransceiveFailed(String),

    #[error("invalid target data: {0}")]
    InvalidTarget(String),

    // Service errors
    #[error("service has stopped")]
    ServiceStopped,

    #[error("preference store error: {0}")]
    Preferences(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::HandleNotFound(TagHandle::new(7));
        assert_eq!(err.to_string(), "handle 7 not registered");

        let err = Error::ExceededLength {
            tech: TagTechnology::NfcF,
            max: 252,
            len: 300,
        };
        assert_eq!(
            err.to_string(),
            "payload of 300 bytes exceeds the 252 byte limit for NFC-F"
        );

        let err = Error::AdapterBusy(AdapterState::TurningOn);
        assert!(err.to_string().contains("turning on"));
    }
}

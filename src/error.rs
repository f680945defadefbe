//! Error type for the pairing core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PairingError {
    /// The requested compute device cannot be used in this build or on
    /// this machine.
    #[error("compute backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Thresholds that would make the score formula divide by zero or
    /// produce non-finite values.
    #[error("invalid pairing configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, PairingError>;

// error.rs

use crate::*;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Message(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[cfg(target_os = "espidf")]
    #[error("ESP-IDF error: {0}")]
    Esp(#[from] esp_idf_sys::EspError),
}

pub type AppResult<T> = Result<T, AppError>;

/// Why a captured frame did not turn into a [`MeterReading`].
///
/// None of these are fatal. The receiver counts them and moves on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Corrupt L-field {l_field}, drained {drained} bytes")]
    CorruptLength { l_field: u8, drained: usize },
    #[error("L-field {0} out of range")]
    BadLength(u8),
    #[error("Frame truncated: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },
    #[error("Frame queue full, frame dropped")]
    QueueOverflow,
    #[error("Frame from other meter {0}")]
    IdentityMismatch(MeterIdentity),
    #[error("CRC mismatch: calc={calculated:04X} frame={received:04X}")]
    CrcMismatch { calculated: u16, received: u16 },
    #[error("No encrypted data in frame")]
    NoCiphertext,
    #[error("Decryption failed: {0}")]
    Crypto(&'static str),
    #[error("Plaintext too short for parsing: {0} bytes")]
    PayloadTooShort(usize),
}

// EOF

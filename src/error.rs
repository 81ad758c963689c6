use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::SessionState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Session command failed: {source}")]
    SessionError { #[from] source: SessionError },

    #[error("Failed to read from/write to the terminal: {source}")]
    IOError { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("No peripheral with identifier {0} has been discovered")]
    UnknownDevice(String),

    #[error("No peripheral is connected")]
    NotConnected,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("The bluetooth operation did not finish within {0} ms")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Heart rate measurement too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not connected to a heart rate sensor")]
    NotConnected,

    #[error("Operation not allowed in session state {0}")]
    InvalidState(SessionState),

    #[error("The heart rate service has no writable characteristic")]
    NoWritableCharacteristic,

    #[error("Failed to issue configuration write: {0}")]
    WriteFailed(String),

    #[error("No discovered device at index {0}")]
    NoSuchDevice(usize),

    #[error("The monitor task has stopped")]
    MonitorStopped,
}

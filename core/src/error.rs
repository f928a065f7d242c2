//! Outcome and error types for the ESP-01 driver.
//!
//! # Design
//! Callers of the C surface only ever see the four-valued [`Status`]. Rust
//! callers get a [`WifiError`] that keeps the diagnostic detail (which token
//! was awaited, what the module answered) and collapses onto a `Status` via
//! [`WifiError::status`]. `Busy` is kept distinct from `Error`: it means the
//! engine refused to start because the transport already has a command in
//! flight, not that an exchange failed.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a command exchange or of a whole driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error,
    Timeout,
    Busy,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::Timeout => "TIMEOUT",
            Status::Busy => "BUSY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> From<&Result<T, WifiError>> for Status {
    fn from(result: &Result<T, WifiError>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

/// Failure reported by the platform's serial primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("serial transport failed: {0}")]
pub struct SerialError(pub String);

/// A `DriverConfig` that cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Errors returned by every fallible `Esp01` operation.
#[derive(Debug, Error)]
pub enum WifiError {
    /// Another command still owns the transport. Retry later.
    #[error("transport busy: a command is already in flight")]
    Busy,

    /// Neither the awaited token nor an error marker arrived in time.
    #[error("timed out after {timeout_ms} ms waiting for {waiting_for:?}")]
    Timeout { waiting_for: String, timeout_ms: u64 },

    /// The module answered with its `ERROR` marker.
    #[error("module reported ERROR: {response:?}")]
    Module { response: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A command or request did not fit its bounded buffer.
    #[error("{what} does not fit in {capacity} bytes")]
    Overflow { what: &'static str, capacity: usize },

    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The station reported no usable address.
    #[error("no station address assigned")]
    NoAddress,

    /// Joining the access point failed before an address was requested.
    #[error("failed to join access point: {source}")]
    NotConnected {
        #[source]
        source: Box<WifiError>,
    },

    #[error("no response after {attempts} attempts")]
    RetriesExhausted { attempts: u8 },
}

impl WifiError {
    pub fn status(&self) -> Status {
        match self {
            WifiError::Busy => Status::Busy,
            WifiError::Timeout { .. } => Status::Timeout,
            WifiError::Module { .. }
            | WifiError::InvalidArgument(_)
            | WifiError::Overflow { .. }
            | WifiError::Serial(_)
            | WifiError::Config(_)
            | WifiError::NoAddress
            | WifiError::NotConnected { .. }
            | WifiError::RetriesExhausted { .. } => Status::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_renders_wire_names() {
        assert_eq!(Status::Ok.to_string(), "OK");
        assert_eq!(Status::Error.to_string(), "ERROR");
        assert_eq!(Status::Timeout.to_string(), "TIMEOUT");
        assert_eq!(Status::Busy.to_string(), "BUSY");
    }

    #[test]
    fn errors_collapse_onto_status() {
        assert_eq!(WifiError::Busy.status(), Status::Busy);
        let timeout = WifiError::Timeout {
            waiting_for: "OK".to_string(),
            timeout_ms: 10,
        };
        assert_eq!(timeout.status(), Status::Timeout);
        assert_eq!(WifiError::NoAddress.status(), Status::Error);
        let not_connected = WifiError::NotConnected {
            source: Box::new(WifiError::Busy),
        };
        assert_eq!(not_connected.status(), Status::Error);
    }

    #[test]
    fn result_converts_to_status() {
        let ok: Result<(), WifiError> = Ok(());
        assert_eq!(Status::from(&ok), Status::Ok);
        let err: Result<(), WifiError> = Err(WifiError::RetriesExhausted { attempts: 3 });
        assert_eq!(Status::from(&err), Status::Error);
    }
}

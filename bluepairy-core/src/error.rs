/*!
 * Error types
 * BlueZ error replies and workflow failures
 */

use std::time::Duration;

use thiserror::Error;

/// Prefix BlueZ puts in front of every error name it returns.
pub const BLUEZ_ERROR_PREFIX: &str = "org.bluez.Error.";

/// A typed error reply from the Bluetooth daemon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BluezError {
    #[error("already connected: {0}")]
    AlreadyConnected(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),
    #[error("authentication timeout: {0}")]
    AuthenticationTimeout(String),
    #[error("connection attempt failed: {0}")]
    ConnectionAttemptFailed(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("{name}: {message}")]
    Other { name: String, message: String },
}

impl BluezError {
    /// Map an error name from an error reply onto the taxonomy.
    pub fn from_name(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name.strip_prefix(BLUEZ_ERROR_PREFIX) {
            Some("AlreadyConnected") => Self::AlreadyConnected(message),
            Some("AlreadyExists") => Self::AlreadyExists(message),
            Some("AuthenticationFailed") => Self::AuthenticationFailed(message),
            Some("AuthenticationRejected") => Self::AuthenticationRejected(message),
            Some("AuthenticationTimeout") => Self::AuthenticationTimeout(message),
            Some("ConnectionAttemptFailed") => Self::ConnectionAttemptFailed(message),
            Some("Failed") => Self::Failed(message),
            _ => Self::Other {
                name: name.to_string(),
                message,
            },
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::AlreadyConnected(m)
            | Self::AlreadyExists(m)
            | Self::AuthenticationFailed(m)
            | Self::AuthenticationRejected(m)
            | Self::AuthenticationTimeout(m)
            | Self::ConnectionAttemptFailed(m)
            | Self::Failed(m) => m,
            Self::Other { message, .. } => message,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bluez(#[from] BluezError),

    #[error("bus transport: {0}")]
    Transport(String),

    #[error("malformed reply to {call}: {reason}")]
    MalformedReply { call: String, reason: String },

    #[error("no reply to {call} within {timeout:?}")]
    CallTimeout { call: String, timeout: Duration },

    #[error("no Bluetooth adapter present")]
    NoAdapters,

    #[error("failed to power up any Bluetooth adapter")]
    PowerUp,

    #[error("failed to start discovery on any powered adapter")]
    Discovery,

    #[error("no usable device found within {0:?}")]
    Timeout(Duration),

    #[error("connecting profile {uuid} on {device} failed: {source}")]
    ProfileConnection {
        device: String,
        uuid: String,
        #[source]
        source: BluezError,
    },

    #[error("invalid profile UUID {0:?}")]
    InvalidUuid(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("interrupted")]
    Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_error_names() {
        let err = BluezError::from_name("org.bluez.Error.AuthenticationFailed", "bad pin");
        assert_eq!(err, BluezError::AuthenticationFailed("bad pin".into()));
        assert_eq!(err.message(), "bad pin");

        let err = BluezError::from_name("org.bluez.Error.ConnectionAttemptFailed", "Page Timeout");
        assert!(matches!(err, BluezError::ConnectionAttemptFailed(_)));
    }

    #[test]
    fn unknown_names_fall_through_to_other() {
        let err = BluezError::from_name("org.freedesktop.DBus.Error.NoReply", "timed out");
        assert_eq!(
            err,
            BluezError::Other {
                name: "org.freedesktop.DBus.Error.NoReply".into(),
                message: "timed out".into(),
            }
        );
        assert_eq!(err.to_string(), "org.freedesktop.DBus.Error.NoReply: timed out");
    }
}

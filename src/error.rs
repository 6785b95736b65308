use crate::hotplug::Strategy;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons an activation is refused. Every variant is fatal to activation and
/// leaves nothing registered with the host or the OS.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("unsupported registration record version {found:#x} (expected {expected:#x})")]
    VersionMismatch { found: i32, expected: i32 },

    #[error("host did not provide a function lookup")]
    NoLookup,

    #[error("unable to import the following API function: {0}")]
    MissingCapability(&'static str),

    #[error("host did not provide a registration function")]
    NoRegister,

    #[error("host refused to register `{0}`")]
    Registration(&'static str),

    #[error("{strategy} subscription failed: {reason}")]
    Subscription { strategy: Strategy, reason: String },

    #[error("failed to spawn worker thread: {0}")]
    Thread(#[from] std::io::Error),
}

impl ActivationError {
    pub(crate) fn subscription(strategy: Strategy, reason: impl ToString) -> Self {
        ActivationError::Subscription {
            strategy,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("sourced value resolution failed: {0}")]
    SourceResolution(String),
    #[error("cache adapter: {0}")]
    Adapter(String),
    #[error("remote operation '{operation}' failed: {message}")]
    Remote { operation: String, message: String },
    #[error("operation '{0}' does not expose an attach hook")]
    AttachUnavailable(String),
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn remote(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Remote {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
pub mod time;

pub use time::{Clock, ManualClock, SystemClock, parse_time};

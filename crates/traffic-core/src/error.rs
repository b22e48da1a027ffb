use thiserror::Error;

/// Errors raised by name-based access to the outcome counter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("invalid counter key: {0}")]
    InvalidKey(String),
}

/// Configuration rejected by `Config::validate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid target base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("unknown traffic profile: {0}")]
    UnknownProfile(String),

    #[error("unknown progress mode: {0}")]
    UnknownProgressMode(String),

    #[error("invalid range for {field}: min {min} > max {max}")]
    InvertedRange { field: &'static str, min: u64, max: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

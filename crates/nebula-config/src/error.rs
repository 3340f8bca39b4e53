//! Configuration error types.

/// Errors that can occur when loading, saving, or parsing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("could not read HLOD settings file: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the config file to disk.
    #[error("could not write HLOD settings file: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("malformed HLOD settings file: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("could not encode HLOD settings: {0}")]
    SerializeError(#[source] ron::Error),

    /// The config parsed but holds values the builder cannot use.
    #[error("invalid config: {0}")]
    Invalid(String),
}

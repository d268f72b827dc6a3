use thiserror::Error;

/// Errors shared across the autotask crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file or environment override could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored enum string did not match any known variant.
    #[error("Unrecognized {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

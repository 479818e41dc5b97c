use thiserror::Error;

/// Result type alias for pistrap operations
pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum PistrapError {
    #[error("Operation aborted by user")]
    Aborted,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Interrupted by signal; cleaning up")]
    Interrupted,

    #[error("Missing host dependencies: {0}")]
    MissingDependencies(String),
}

use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataManagerError {
    /// An error reported by a storage strategy while reading or writing
    #[error("Storage error: {0}")]
    Storage(String),

    /// An error that occurs when interpreting a [DataManagerConfig](crate::DataManagerConfig)
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl DataManagerError {
    /// Wrap any displayable error reported by a storage strategy
    pub fn storage<E>(error: E) -> Self
    where
        E: std::fmt::Display,
    {
        DataManagerError::Storage(format!("{error}"))
    }
}

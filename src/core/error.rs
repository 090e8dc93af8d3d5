use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Persistence error for partition '{partition}': {message}")]
    PersistenceError { partition: String, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("World error: {0}")]
    WorldError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Cleanup engine is no longer accepting commands")]
    EngineStopped,

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, SweepError>;

impl SweepError {
    pub fn persistence(partition: impl ToString, message: impl ToString) -> Self {
        Self::PersistenceError {
            partition: partition.to_string(),
            message: message.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for SweepError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

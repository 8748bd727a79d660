use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CONSUMER_FAILURE: {0}")]
    Consumer(String),
    #[error("RELEASE_FAILURE: {0}")]
    Release(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<AppError> for std::io::Error {
    fn from(value: AppError) -> Self {
        std::io::Error::other(value)
    }
}

pub type AppResult<T> = Result<T, AppError>;

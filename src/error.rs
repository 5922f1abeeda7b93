use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Code is required")]
    EmptyCode,

    #[error("No sandbox slot available")]
    PoolExhausted,

    #[error("Sandbox launcher failed: {0}")]
    Launcher(String),

    #[error("Invalid accounting report: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Validation errors are rejected before any sandbox resource is touched
    /// and must never be retried. Everything else is an infrastructure
    /// failure that the queue layer handles through redelivery.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::UnsupportedLanguage(_) | Error::EmptyCode)
    }
}

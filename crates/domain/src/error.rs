/// Shared error type used across all FAME crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("plugin load: {0}")]
    PluginLoad(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    #[error("sandbox: {0}")]
    Sandbox(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

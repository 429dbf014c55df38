use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("No browser found: {0}")]
    BrowserNotFound(String),

    #[error("Debug endpoint not ready: {0}")]
    EndpointNotReady(String),

    #[error("No page target: {0}")]
    NoPageTarget(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element rejected action: {0}")]
    ElementRejected(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport and navigation failures can be retried on a fresh session;
    /// launch and element failures cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ConnectionClosed | Error::Timeout(_) | Error::Navigation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

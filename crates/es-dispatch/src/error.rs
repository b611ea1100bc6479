use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown transport: {0}")]
    UnknownTransport(String),

    #[error("Subscription store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

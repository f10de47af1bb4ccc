use thiserror::Error;

#[derive(Error, Debug)]
pub enum WinrmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported auth type: {0}")]
    UnsupportedAuth(String),

    #[error("invalid proxy URL '{url}': {source}")]
    InvalidProxyUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("failed to create session: {0}")]
    SessionCreation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        source: Box<WinrmError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Error = WinrmError;
pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

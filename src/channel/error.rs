use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

use std::sync::Arc;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    WebRtc(Arc<webrtc::Error>),
    #[error("signaling transport error: {0}")]
    Transport(Arc<tungstenite::Error>),
    #[error("malformed payload: {0}")]
    Json(Arc<serde_json::Error>),
    #[error("channel closed")]
    ChannelClosed,
    #[error("no peer connection is armed")]
    NotConnected,
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),
    #[error("peer connections are not supported: {0}")]
    PeerConnectionUnsupported(String),
}

impl From<webrtc::Error> for Error {
    fn from(value: webrtc::Error) -> Self {
        Error::WebRtc(Arc::new(value))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(value: tungstenite::Error) -> Self {
        Error::Transport(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

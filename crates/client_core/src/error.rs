use std::time::Duration;

use shared::{error::ValidationError, protocol::CommandKind};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("access token must not be empty")]
    EmptyToken,
    #[error("access token must start with `{prefix}`")]
    MalformedToken { prefix: String },
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] Box<tungstenite::Error>),
    #[error("websocket handshake did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session transport is closed")]
    Closed,
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("websocket send failed: {0}")]
    Send(#[source] Box<tungstenite::Error>),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The command may still have taken effect on the device.
    #[error("no response to {command} within {waited:?}")]
    Timeout {
        command: CommandKind,
        waited: Duration,
    },
    #[error("not connected")]
    NotConnected,
    #[error("no device selected")]
    NoDeviceSelected,
}

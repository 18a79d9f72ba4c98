//! WebSocket client used by the `miniq` submit/status/delete commands.
//!
//! Each request opens its own connection, sends one frame and waits for the
//! matching reply.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::server::protocol::{Request, Response};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server closed the connection without replying")]
    Closed,
}

/// URL of a server listening on localhost.
pub fn server_url(port: u16) -> String {
    format!("ws://localhost:{port}")
}

pub async fn send_request(url: &str, request: &Request) -> Result<Response, ClientError> {
    let (mut ws, _) = connect_async(url).await?;

    let body = serde_json::to_string(request)?;
    ws.send(Message::Text(body.into())).await?;

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                let response: Response = serde_json::from_str(text.as_str())?;
                if let Err(e) = ws.close(None).await {
                    tracing::debug!(error = %e, "Closing WebSocket failed");
                }
                return Ok(response);
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(ClientError::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_url_uses_localhost() {
        assert_eq!(server_url(9876), "ws://localhost:9876");
    }
}

use futures_util::SinkExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),
}

pub enum Inbound {
    Text(String),
    Skip,
    Closed,
}

pub async fn connect(url: &str) -> Result<WsStream, TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws)
}

pub async fn send_text(ws: &mut WsStream, payload: String) -> Result<(), TransportError> {
    ws.send(Message::Text(payload.into())).await?;
    Ok(())
}

/// Best-effort close handshake for a socket we are abandoning.
pub async fn close(ws: &mut WsStream) {
    let _ = ws.close(None).await;
}

/// Maps a read result onto what the clients care about. Pings are answered by
/// tungstenite itself on the next read or write.
pub fn classify(incoming: Option<Result<Message, tungstenite::Error>>) -> Inbound {
    match incoming {
        Some(Ok(Message::Text(text))) => Inbound::Text(text.as_str().to_owned()),
        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Inbound::Text(text),
            Err(_) => Inbound::Skip,
        },
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => Inbound::Skip,
        Some(Ok(Message::Close(frame))) => {
            if let Some(frame) = frame {
                tracing::info!(
                    code = u16::from(frame.code),
                    reason = frame.reason.as_str(),
                    "server closed connection"
                );
            }
            Inbound::Closed
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "websocket read failed");
            Inbound::Closed
        }
        None => Inbound::Closed,
    }
}

//! Bidirectional byte pump between an `axum` web-socket and a C4 interactive
//! SSH session. Resize frames are a small JSON envelope (`{"resize":[cols,rows]}`)
//! distinguished from raw keystrokes by a `Text` vs `Binary` message.

use axum::extract::ws::{Message, WebSocket};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ssh::SshPool;

use super::PendingTerminal;

#[derive(Debug, Deserialize)]
struct ResizeFrame {
    resize: (u32, u32),
}

/// Drives one web-socket connection for the lifetime of the session. Closing
/// either side — the browser's socket or the PTY — tears down the other.
pub async fn handle_socket(mut socket: WebSocket, ssh: &SshPool, pending: PendingTerminal) {
    let mut session = match ssh.interactive_session(&pending.pool_key, &pending.private_key_pem).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = ?e, "failed to open interactive session");
            let _ = socket
                .send(Message::Text(format!("failed to open session: {e}").into()))
                .await;
            return;
        }
    };

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        if session.stdin.send(data.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<ResizeFrame>(&text) {
                            let (cols, rows) = frame.resize;
                            let _ = session.resize.send((cols, rows)).await;
                        } else if session.stdin.send(text.as_bytes().to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = ?e, "websocket recv error");
                        break;
                    }
                }
            }
            outgoing = session.stdout.recv() => {
                match outgoing {
                    Some(data) => {
                        if socket.send(Message::Binary(data.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.close();
    let _ = socket.send(Message::Close(None)).await;
}

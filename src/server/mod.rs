// Service host - WebSocket binding of the session protocol
//
// One WebSocket connection owns one session: binary messages feed the
// session handler, the events it produces are sent back as JSON text frames
// in order. Sessions are independent tokio tasks with no shared state.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;

use crate::pipeline::events::{OutboundEvent, ReportBody};
use crate::session::SessionHandler;

/// Build the router with the audio WebSocket and the health probe
pub fn build_router() -> Router {
    Router::new()
        .route("/ws/audio", get(audio_ws_handler))
        .route("/health", get(health))
}

/// Run the server until ctrl-c
pub async fn run_server(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding listener on {addr}"))?;
    log::info!("[Server] listening on {addr}");

    axum::serve(listener, build_router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("[Server] shutdown requested");
        })
        .await
        .context("serving sessions")?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn audio_ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_session)
}

/// Drive one session over its socket until stop, close, or error
async fn handle_session(mut socket: WebSocket) {
    let mut session = SessionHandler::new();
    log::info!("[Server] session opened");

    loop {
        let message = match socket.recv().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                log::warn!("[Server] transport error: {err}");
                // Best effort: surface an error-shaped report before closing
                let report = OutboundEvent::SessionReport(ReportBody::error(format!(
                    "Server error: {err}"
                )));
                if let Ok(text) = serde_json::to_string(&report) {
                    let _ = socket.send(Message::Text(text)).await;
                }
                break;
            }
            None => break,
        };

        match message {
            Message::Binary(frame) => {
                let turn = session.handle_frame(&frame);
                for event in turn.events {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            log::error!("[Server] failed to serialize event: {err}");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        log::warn!("[Server] peer went away mid-session");
                        return;
                    }
                }
                if turn.finished {
                    break;
                }
            }
            Message::Close(_) => break,
            // Text, ping and pong frames are not part of the protocol
            _ => {}
        }
    }

    log::info!("[Server] session closed");
}

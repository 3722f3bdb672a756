use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;

use crate::admission::middleware::peer_addr;
use crate::admission::Profile;
use crate::http::AppState;
use crate::realtime::{ConnectionStream, Outbound, RealtimeHub};

/// Largest inbound message or frame accepted (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// `GET /ws`: admission first, then the protocol upgrade
pub async fn ws_handler(State(state): State<AppState>, req: Request) -> Response {
    let ctx = state.admission.context(
        Profile::Upgrade,
        req.method(),
        req.uri(),
        req.headers(),
        peer_addr(&req),
    );
    if let Err(e) = state.admission.admit(&ctx).await {
        return reject_upgrade(e.status_code(Profile::Upgrade));
    }

    let (mut parts, _body) = req.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = Arc::clone(&state.hub);
    upgrade
        .max_message_size(MAX_MESSAGE_SIZE)
        .max_frame_size(MAX_MESSAGE_SIZE)
        .on_failed_upgrade(|e| log::debug!("websocket upgrade failed: {}", e))
        .on_upgrade(move |socket| serve_socket(socket, hub))
}

/// Status only, no body, and the connection is not kept alive
fn reject_upgrade(status: StatusCode) -> Response {
    (status, [(header::CONNECTION, "close")]).into_response()
}

async fn wait_terminated(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn serve_socket(socket: WebSocket, hub: Arc<RealtimeHub>) {
    let (handle, stream) = hub.connect();
    let id = handle.id();
    let ConnectionStream {
        mut outbound,
        shutdown,
    } = stream;
    let mut writer_shutdown = shutdown.clone();
    let mut reader_shutdown = shutdown;

    let (mut sink, mut source) = socket.split();

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = outbound.recv() => frame,
                _ = wait_terminated(&mut writer_shutdown) => break,
            };
            let message = match frame {
                Some(Outbound::Text(text)) => Message::Text(text),
                Some(Outbound::Ping) => Message::Ping(Bytes::new()),
                None => break,
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        let message = tokio::select! {
            message = source.next() => message,
            _ = wait_terminated(&mut reader_shutdown) => break,
        };
        match message {
            Some(Ok(Message::Text(text))) => hub.handle_text(&handle, text.as_str()),
            Some(Ok(Message::Binary(bytes))) => {
                hub.handle_text(&handle, &String::from_utf8_lossy(&bytes))
            }
            Some(Ok(Message::Pong(_))) => hub.pong(id),
            // pings are answered by the transport
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                log::debug!("connection {} read error: {}", id, e);
                break;
            }
        }
    }

    hub.disconnect(id);
    handle.terminate();
    let _ = writer.await;
}

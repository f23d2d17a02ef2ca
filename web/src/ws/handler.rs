use crate::error::Error;
use crate::extractors::bearer_credential::BearerCredential;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::*;
use realtime::connection::Registration;
use realtime::{Dispatcher, Frame, Principal};
use service::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long a closing writer may keep the socket alive.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Upgrades an authenticated request to a long-lived dashboard connection.
/// A rejected credential answers 401 and the handshake never completes.
pub(crate) async fn ws_handler(
    State(app_state): State<AppState>,
    BearerCredential(credential): BearerCredential,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let principal = app_state.authenticator.authenticate(&credential).await?;
    debug!("Establishing dashboard connection for {}", principal.identity);

    let dispatcher = app_state.dispatcher.clone();
    let outbound_buffer = app_state.config.outbound_buffer.max(1);

    Ok(ws
        .on_upgrade(move |socket| run_connection(socket, principal, dispatcher, outbound_buffer))
        .into_response())
}

/// Drives one connection from registration to retirement.
async fn run_connection(
    socket: WebSocket,
    principal: Principal,
    dispatcher: Arc<Dispatcher>,
    outbound_buffer: usize,
) {
    let identity = principal.identity.clone();
    let (tx, rx) = mpsc::channel(outbound_buffer);
    let registration = dispatcher.connect(principal, tx);

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_frames(sink, rx, registration.closed.clone()));

    read_frames(stream, &dispatcher, &identity, &registration).await;

    // Client went away, or we were displaced/evicted. Either way the registry
    // must no longer point at this connection before the socket is dropped.
    dispatcher.disconnect(&identity, &registration.connection_id);
    registration.closed.cancel();
    shutdown_writer(writer, &identity).await;
    debug!("Dashboard connection for {identity} closed");
}

/// Waits briefly for the writer to flush its Close frame, then aborts it so
/// the socket is dropped even if the peer stopped reading.
async fn shutdown_writer(mut writer: JoinHandle<()>, identity: &str) {
    match tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Writer task for {identity} ended abnormally: {e}"),
        Err(_) => {
            debug!("Writer task for {identity} did not stop in time, aborting");
            writer.abort();
        }
    }
}

async fn read_frames(
    mut stream: SplitStream<WebSocket>,
    dispatcher: &Dispatcher,
    identity: &str,
    registration: &Registration,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = registration.closed.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                dispatcher
                    .handle_client_frame(identity, &registration.connection_id, &text)
                    .await;
            }
            Some(Ok(Message::Binary(bytes))) => {
                // Only JSON text frames are understood; this yields a
                // malformed-message reply.
                let text = String::from_utf8_lossy(&bytes);
                dispatcher
                    .handle_client_frame(identity, &registration.connection_id, &text)
                    .await;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                dispatcher.touch(identity, &registration.connection_id);
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("{identity} closed the connection");
                break;
            }
            Some(Err(e)) => {
                debug!("Transport error reading from {identity}: {e}");
                break;
            }
        }
    }
}

/// Sole writer for the socket. Frames leave in queue order.
///
/// Every write races the close token: a peer that stopped reading can block
/// a send indefinitely, and retirement must still drop the socket.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => {
                // Nothing half written, so a Close frame is still well formed.
                let close = sink.send(Message::Close(None));
                let _ = tokio::time::timeout(WRITER_SHUTDOWN_GRACE, close).await;
                break;
            }
            frame = rx.recv() => frame,
        };

        let message = match frame {
            Some(Frame::Text(text)) => Message::Text(text.to_string()),
            Some(Frame::Ping) => Message::Ping(Vec::new()),
            None => break,
        };

        let sent = tokio::select! {
            biased;
            _ = closed.cancelled() => {
                debug!("Connection retired while a write was pending, dropping socket");
                break;
            }
            sent = sink.send(message) => sent,
        };

        if let Err(e) = sent {
            debug!("Transport error while writing: {e}");
            // Wake the reader so the connection goes through retirement.
            closed.cancel();
            break;
        }
    }
}

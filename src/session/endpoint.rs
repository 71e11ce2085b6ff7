//! Connection endpoint
//!
//! Wires one accepted WebSocket to the hub: splits the socket, spawns
//! the writer, and runs the reader loop inline until the connection
//! dies, then issues the final detach.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::presence::{DetachKind, PresenceHub, SiteMember};
use crate::protocol::Frame;
use crate::server::ServerConfig;

use super::state::{EndpointState, JoinAction};
use super::writer::EndpointWriter;

/// Serve one viewer connection until it closes
///
/// Returns once both tasks have exited and the endpoint's membership,
/// if any, has been detached.
pub async fn serve(
    socket: WebSocket,
    endpoint_id: u64,
    peer: String,
    hub: Arc<PresenceHub>,
    config: ServerConfig,
) {
    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(hub.config().outbound_capacity);
    let cancel = CancellationToken::new();

    let mut state = EndpointState::new(endpoint_id, peer);
    tracing::debug!(endpoint = endpoint_id, peer = %state.peer, "Viewer connected");

    let writer = EndpointWriter::new(
        sink,
        outbound_rx,
        cancel.clone(),
        endpoint_id,
        config.heartbeat_interval,
        config.write_timeout,
    );
    let writer_task = tokio::spawn(writer.run());

    read_loop(stream, &mut state, &hub, &outbound_tx, &cancel, &config).await;

    // Reader is done; detach from whatever site we still hold
    if let Some(site) = state.begin_close() {
        hub.detach(&site, endpoint_id, DetachKind::Final).await;
    }
    cancel.cancel();
    drop(outbound_tx);
    let _ = writer_task.await;
    state.closed();

    tracing::debug!(
        endpoint = endpoint_id,
        peer = %state.peer,
        duration_ms = state.duration().as_millis() as u64,
        "Viewer disconnected"
    );
}

/// Read inbound frames until close, error, cancellation, or inactivity
///
/// Any inbound traffic, pongs included, refreshes the inactivity
/// window; the heartbeat interval is shorter than the read timeout, so
/// a responsive client is never timed out between pings.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    state: &mut EndpointState,
    hub: &Arc<PresenceHub>,
    outbound: &mpsc::Sender<Frame>,
    cancel: &CancellationToken,
    config: &ServerConfig,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(endpoint = state.id, "Reader cancelled");
                return;
            }
            received = timeout(config.read_timeout, stream.next()) => received,
        };

        let message = match received {
            Err(_) => {
                tracing::debug!(endpoint = state.id, "Read inactivity timeout");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(endpoint = state.id, error = %e, "Read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                handle_frame(text.as_bytes(), state, hub, outbound, cancel).await;
            }
            Message::Binary(data) => {
                handle_frame(&data, state, hub, outbound, cancel).await;
            }
            // Control frames only refresh the inactivity window
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return,
        }
    }
}

/// Decode one inbound frame and dispatch a join; everything else is
/// dropped without touching the connection
async fn handle_frame(
    data: &[u8],
    state: &mut EndpointState,
    hub: &Arc<PresenceHub>,
    outbound: &mpsc::Sender<Frame>,
    cancel: &CancellationToken,
) {
    let frame = match serde_json::from_slice::<Frame>(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(endpoint = state.id, error = %e, "Discarding malformed frame");
            return;
        }
    };

    let Frame::Join { site_id } = frame else {
        tracing::debug!(endpoint = state.id, "Ignoring non-join frame from client");
        return;
    };

    match state.on_join(&site_id) {
        JoinAction::Ignore => {}
        JoinAction::Attach => {
            attach_current(state, hub, outbound, cancel).await;
        }
        JoinAction::Switch { previous } => {
            hub.detach(&previous, state.id, DetachKind::Switching).await;
            attach_current(state, hub, outbound, cancel).await;
        }
    }
}

/// Attach the endpoint to the site its state now points at
async fn attach_current(
    state: &mut EndpointState,
    hub: &Arc<PresenceHub>,
    outbound: &mpsc::Sender<Frame>,
    cancel: &CancellationToken,
) {
    let Some(site) = state.site() else {
        return;
    };
    let member = SiteMember::new(state.id, state.peer.clone(), outbound.clone(), cancel.clone());
    hub.attach(site, member).await;
    state.complete_join();
}

//! WebSocket server: accept loop and per-phone connection task.
//!
//! Each accepted TCP connection is upgraded to a WebSocket and handed to its
//! own Tokio task, which owns the whole lifecycle of that phone:
//!
//! 1. Upgrade, capturing the `pin` header of the HTTP request.  A peer that
//!    does not finish the upgrade within the handshake timeout is dropped.
//! 2. Open a slot in the session table and run the PIN challenge.  The socket
//!    is watched while the operator decides; a phone that hangs up
//!    mid-challenge ends it as a decline.
//! 3. Once authorized, decode each text frame and dispatch it before reading
//!    the next one, keeping per-phone event order.
//! 4. On any exit, remove the session (reset and unplug the gamepad) and close
//!    the socket.  Rejection is signalled only by that close.
//!
//! Outbound frames (`authorized`, `v`, `PO`) go through a per-connection
//! outbox channel drained by a writer task.  The writer closes the socket once
//! every sender is gone: the connection task's own, the session's, and the
//! feedback forwarder's, which ends when the gamepad is disposed.
//!
//! Shutdown is triggered by a shared `AtomicBool` that the accept loop polls
//! every 200 ms.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use xpalm_core::{
    decode_client_message, encode_server_message, ConnectionId, ProtocolError, ServerMessage,
};

use crate::application::authorize::{
    AuthOutcome, AuthProtocol, ConnectRequest, Notice, OperatorNotifier,
};
use crate::application::relay_input::{EventRelay, RelayError};
use crate::application::sessions::{Outbox, SessionTable};

/// HTTP header carrying the PIN the phone displays.
pub const PIN_HEADER: &str = "pin";

/// How long a new TCP connection has to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Shared services every connection task uses.
pub struct ServerContext {
    pub sessions: Arc<SessionTable>,
    pub auth: Arc<AuthProtocol>,
    pub relay: Arc<EventRelay>,
    pub notifier: Arc<dyn OperatorNotifier>,
    pub handshake_timeout: Duration,
}

impl ServerContext {
    /// Tears down every session at shutdown, telling the operator about each
    /// phone that was disconnected.  Returns the number of gamepads unplugged.
    pub async fn disconnect_all(&self) -> usize {
        let sources = self.sessions.close_all().await;
        for source in &sources {
            self.notifier.notify(Notice::Disconnected(*source));
        }
        sources.len()
    }
}

/// Binds the WebSocket listener.
///
/// # Errors
///
/// Returns an error if the address is already in use or not bindable.
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Runs the accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error only if the listener's local address cannot be read;
/// per-connection failures are logged and never end the loop.
pub async fn run_server(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("WebSocket server listening on {local}");

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("TCP connection from {peer}");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_phone(stream, peer, ctx).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_phone(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    match run_connection(stream, peer, &ctx).await {
        Ok(()) => debug!("connection {peer} finished"),
        Err(e) => warn!("connection {peer} failed: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ServerContext,
) -> anyhow::Result<()> {
    let mut pin = String::new();
    let capture_pin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(value) = req.headers().get(PIN_HEADER) {
            pin = value.to_str().unwrap_or_default().to_string();
        }
        Ok(resp)
    };
    let ws = timeout(ctx.handshake_timeout, accept_hdr_async(stream, capture_pin))
        .await
        .with_context(|| format!("WebSocket handshake with {peer} timed out"))?
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;

    let id = ConnectionId::new();
    let source = peer.ip();
    info!("{id}: phone connected from {peer}");

    let (sink, mut frames) = ws.split();
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(sink, outbox_rx, id));

    ctx.sessions.open(id).await;
    let request = ConnectRequest {
        connection_id: id,
        source,
        pin,
    };
    serve(ctx, &request, outbox, &mut frames).await;

    if ctx.sessions.remove(id).await {
        ctx.notifier.notify(Notice::Disconnected(source));
    }
    // Waits for the close frame to go out.
    let _ = writer.await;
    info!(
        "{id}: connection from {peer} closed, {} session(s) active",
        ctx.sessions.active_count().await
    );
    Ok(())
}

/// Runs the challenge and, if authorized, the input loop.
async fn serve(
    ctx: &ServerContext,
    request: &ConnectRequest,
    outbox: Outbox,
    frames: &mut WsSource,
) {
    let id = request.connection_id;

    let outcome = ctx
        .auth
        .authorize_until_hang_up(request, outbox, wait_for_close(frames))
        .await;

    let feedback = match outcome {
        AuthOutcome::Authorized(feedback) => feedback,
        AuthOutcome::Rejected => {
            info!("{id}: rejected");
            return;
        }
        AuthOutcome::Blacklisted => {
            info!("{id}: refused, address blacklisted");
            return;
        }
        AuthOutcome::Aborted(e) => {
            warn!("{id}: authorization aborted: {e}");
            return;
        }
    };

    let relay = Arc::clone(&ctx.relay);
    tokio::spawn(async move {
        relay.forward_feedback(id, feedback).await;
    });

    relay_frames(ctx, id, frames).await;
}

/// Reads frames until the phone goes away, dispatching each in order.
async fn relay_frames(ctx: &ServerContext, id: ConnectionId, frames: &mut WsSource) {
    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("{id}: WebSocket read ended: {e}");
                break;
            }
        };

        let event = match decode_client_message(&text) {
            Ok(event) => event,
            Err(ProtocolError::UnknownButton(e)) => {
                warn!("{id}: dropping key frame: {e}");
                continue;
            }
            Err(e) => {
                warn!("{id}: dropping frame: {e}");
                continue;
            }
        };

        match ctx.relay.dispatch(id, event).await {
            Ok(()) => {}
            Err(e @ RelayError::UnknownSession(_)) => debug!("{id}: {e}, event dropped"),
            Err(e) => warn!("{id}: {e}"),
        }
    }
}

/// Resolves when the phone closes the socket.  Frames are discarded.
async fn wait_for_close(frames: &mut WsSource) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(WsMessage::Close(_)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Drains the outbox onto the socket, then closes it.
async fn write_frames(
    mut sink: WsSink,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
    id: ConnectionId,
) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = sink.send(WsMessage::Text(encode_server_message(&msg))).await {
            debug!("{id}: WebSocket send failed: {e}");
            break;
        }
    }
    let _ = sink.close().await;
}

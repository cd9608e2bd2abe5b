//! WebSocket Relay Server
//!
//! Accepts provider and consumer sockets, binds each to its role via the
//! handshake request path (`/provider`, `/consumer`), and runs the
//! per-connection read/dispatch loop. Each inbound message is handled to
//! completion before the next; server-initiated pushes from the stimulus
//! driver interleave through the connection's channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::channel::auth;
use crate::channel::consumer::ConsumerChannel;
use crate::channel::provider::ProviderChannel;
use crate::connection::protocol::{ClientMessage, ParseError, Role, ServerSignal};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::validator::PacketValidator;

/// WebSocket server multiplexing the provider and consumer channels.
pub struct RelayServer {
    listener: TcpListener,
    registry: ConnectionRegistry,
    validator: Arc<dyn PacketValidator>,
}

impl RelayServer {
    /// Bind the relay to `addr`.
    pub async fn bind(
        addr: &str,
        registry: ConnectionRegistry,
        validator: Arc<dyn PacketValidator>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        Ok(Self {
            listener,
            registry,
            validator,
        })
    }

    /// Address the relay is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read local address")
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) -> Result<()> {
        loop {
            // One failed accept must not take the whole relay down.
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let registry = self.registry.clone();
            let validator = self.validator.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, registry, validator).await {
                    warn!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: ConnectionRegistry,
    validator: Arc<dyn PacketValidator>,
) -> Result<()> {
    // The role is chosen by the request path during the handshake.
    let mut role_slot = None;
    let callback = |req: &Request, resp: Response| {
        match req.uri().path().trim_end_matches('/') {
            "/provider" => role_slot = Some(Role::Provider),
            "/consumer" => role_slot = Some(Role::Consumer),
            other => {
                let mut reject = ErrorResponse::new(Some(format!("unknown channel: {other}")));
                *reject.status_mut() = StatusCode::NOT_FOUND;
                return Err(reject);
            }
        }
        Ok(resp)
    };

    let ws = accept_hdr_async(stream, callback)
        .await
        .context("WebSocket handshake failed")?;
    let role = role_slot.context("handshake accepted without a role")?;

    info!(peer = %peer, role = %role, "client connected");

    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(push_tx);
    let conn_id = handle.id();
    registry.bind(role, handle);

    let result = connection_loop(ws, role, push_rx, validator).await;

    registry.release(role, conn_id);
    info!(peer = %peer, role = %role, "client disconnected");
    result
}

async fn connection_loop(
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    role: Role,
    mut push_rx: mpsc::UnboundedReceiver<ServerSignal>,
    validator: Arc<dyn PacketValidator>,
) -> Result<()> {
    let (mut write, mut read) = ws.split();

    let provider = ProviderChannel::new(validator.clone());
    let consumer = ConsumerChannel::new(validator);

    loop {
        tokio::select! {
            msg = read.next() => {
                let signals = match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                        Ok(message) => dispatch(role, message, &provider, &consumer),
                        // A known event with an undecodable payload is a
                        // validation failure, not noise.
                        Err(err)
                            if matches!(
                                &err,
                                ParseError::Payload { event, .. } if handles(role, event)
                            ) =>
                        {
                            debug!(role = %role, error = %err, "rejecting malformed payload");
                            vec![ServerSignal::Error(err.to_string().into())]
                        }
                        Err(e) => {
                            // No handler registered for this event; drop it.
                            debug!(role = %role, error = %e, "ignoring unrecognized message");
                            continue;
                        }
                    },
                    Some(Ok(Message::Binary(payload))) => match role {
                        Role::Provider => provider.stream(&payload),
                        Role::Consumer => Vec::new(),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(role = %role, ?frame, "received close frame");
                        break;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                };

                for signal in signals {
                    write.send(Message::Text(signal.to_json()?.into())).await?;
                }
            }

            push = push_rx.recv() => {
                if let Some(signal) = push {
                    write.send(Message::Text(signal.to_json()?.into())).await?;
                }
            }
        }
    }

    Ok(())
}

/// Whether `event` has a handler on the channel bound to `role`.
fn handles(role: Role, event: &str) -> bool {
    match (role, event) {
        (_, "authorize") => true,
        (Role::Provider, "event" | "sensor" | "stream") => true,
        (Role::Consumer, "control" | "setFilter" | "getState") => true,
        (Role::Consumer, "subscribe" | "unsubscribe" | "joinStream" | "leaveStream") => true,
        _ => false,
    }
}

/// Route a parsed message to its channel handler. Events outside the
/// connection's role have no registered handler and produce nothing.
fn dispatch(
    role: Role,
    message: ClientMessage,
    provider: &ProviderChannel,
    consumer: &ConsumerChannel,
) -> Vec<ServerSignal> {
    use ClientMessage::*;

    match (role, message) {
        (_, Authorize(packet)) => vec![auth::authorize(packet.as_ref())],

        (Role::Provider, Event(packet)) => provider.event(packet),
        (Role::Provider, Sensor(packet)) => provider.sensor(packet),
        (Role::Provider, Stream(_)) => provider.stream_text(),

        (Role::Consumer, Control(packet)) => consumer.control(packet),
        (Role::Consumer, SetFilter(packet)) => consumer.set_filter(packet),
        (Role::Consumer, GetState(packet)) => consumer.get_state(packet),
        (
            Role::Consumer,
            Subscribe(packet) | Unsubscribe(packet) | JoinStream(packet) | LeaveStream(packet),
        ) => consumer.subscription(packet),

        _ => Vec::new(),
    }
}

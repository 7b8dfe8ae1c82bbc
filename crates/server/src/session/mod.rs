//! Session server implementation.
//!
//! Network tasks never touch session state. Every inbound event is queued
//! on a channel and applied by the authority tick loop, which owns the
//! [`SessionCoordinator`] outright: disconnects first, then the remaining
//! events in arrival order, then one lobby tick. Notifications produced
//! during the tick fan out to every connection over a single broadcast
//! channel, which preserves their production order per observer.

use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use protocol::messages::{ClientMessage, Hello, ServerMessage, SessionSnapshot};
use protocol::{ConnectionId, MAX_HELLO_PAYLOAD, RejectReason};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub mod coordinator;
pub mod participant;

pub use coordinator::SessionCoordinator;

/// An inbound network event, queued for the start of the next tick.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection passed the transport gate and asks for admission.
    /// The reply resolves to the welcome snapshot or a reject reason the
    /// transport must deliver before finalizing the disconnect.
    Connect {
        connection_id: ConnectionId,
        hello: Hello,
        reply: oneshot::Sender<Result<SessionSnapshot, RejectReason>>,
    },
    /// Reliable ordered request from an admitted client.
    Request {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    /// Fire-and-forget disconnect signal, at most once per connection.
    Disconnect { connection_id: ConnectionId },
}

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
        }
    }

    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }
        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Run the session server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));

    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (notify_tx, _notify_rx) = broadcast::channel::<ServerMessage>(256);

    // The tick loop owns the coordinator; nothing else mutates it.
    let coordinator = SessionCoordinator::new(&config);
    let tick_interval = config.server.tick_interval_ms;
    let loop_notify_tx = notify_tx.clone();
    tokio::spawn(async move {
        run_session_loop(coordinator, event_rx, loop_notify_tx, tick_interval).await;
    });

    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;
    let mut next_connection_id: ConnectionId = 1;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        {
            let mut state = conn_state.write().await;
            if !state.try_add_connection(ip, max_connections, ip_limit) {
                warn!("Connection rejected (limit reached): {}", addr);
                continue;
            }
        }

        let connection_id = next_connection_id;
        next_connection_id += 1;

        let event_tx = event_tx.clone();
        let notify_rx = notify_tx.subscribe();
        let conn_state = Arc::clone(&conn_state);

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, connection_id, event_tx, notify_rx).await;

            // Always remove from connection tracking when done
            {
                let mut state = conn_state.write().await;
                state.remove_connection(ip);
            }

            if let Err(e) = result {
                debug!("Connection {} ended with error: {}", addr, e);
            }
        });
    }
}

/// Authority tick loop: drains queued events and advances the session.
pub async fn run_session_loop(
    mut coordinator: SessionCoordinator,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    notify_tx: broadcast::Sender<ServerMessage>,
    tick_interval_ms: u64,
) {
    let period = Duration::from_millis(tick_interval_ms);
    let start = Instant::now() + period;
    let mut ticker = interval_at(start, period);
    // Use Skip to catch up on missed ticks - keeps the lobby timers honest.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_tick = Instant::now();

    loop {
        ticker.tick().await;

        // Monotonic clock, sampled once per tick; all in-phase timers run
        // off this delta.
        let now = Instant::now();
        let dt = now.duration_since(last_tick);
        last_tick = now;

        // Disconnects apply before anything else queued this tick, so a
        // request racing its own disconnect can never leave a dangling
        // seat or roster entry (cancel wins).
        let mut disconnects = Vec::new();
        let mut others = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Disconnect { .. } => disconnects.push(event),
                _ => others.push(event),
            }
        }

        for event in disconnects.into_iter().chain(others) {
            match event {
                SessionEvent::Disconnect { connection_id } => {
                    coordinator.on_disconnected(connection_id);
                }
                SessionEvent::Connect {
                    connection_id,
                    hello,
                    reply,
                } => {
                    let result = coordinator.on_connection_requested(connection_id, &hello);
                    let _ = reply.send(result);
                }
                SessionEvent::Request {
                    connection_id,
                    message,
                } => {
                    coordinator.handle_request(connection_id, message);
                }
            }
        }

        for message in coordinator.tick(dt) {
            // No receivers is fine; an empty lobby still ticks.
            let _ = notify_tx.send(message);
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    mut notify_rx: broadcast::Receiver<ServerMessage>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection {} from {}", connection_id, addr);

    let (mut write, mut read) = ws_stream.split();

    // The first frame must be a hello. The size gate runs before any
    // deserialization is attempted.
    let hello = loop {
        match read.next().await {
            Some(Ok(Message::Binary(data))) => {
                if data.len() > MAX_HELLO_PAYLOAD {
                    warn!(
                        "Connection {} hello of {} bytes over limit, rejecting",
                        connection_id,
                        data.len()
                    );
                    let frame = ServerMessage::Rejected {
                        reason: RejectReason::PayloadTooLarge,
                    }
                    .encode();
                    // Two-phase rejection: flush the reason, then close.
                    let _ = write.send(Message::Binary(frame.to_vec().into())).await;
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                match ClientMessage::parse(&data) {
                    Ok(ClientMessage::Hello(hello)) => break hello,
                    Ok(other) => {
                        debug!("Connection {} sent {:?} before hello", connection_id, other);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Connection {} sent invalid hello: {}", connection_id, e);
                        return Ok(());
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Err(e)) => return Err(e.into()),
            _ => {}
        }
    };

    // Admission is decided on the authority tick, serialized with every
    // other session event.
    let (reply_tx, reply_rx) = oneshot::channel();
    let sent = event_tx.send(SessionEvent::Connect {
        connection_id,
        hello,
        reply: reply_tx,
    });
    if sent.is_err() {
        return Ok(());
    }

    let snapshot = match reply_rx.await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(reason)) => {
            info!("Connection {} rejected: {:?}", connection_id, reason);
            let frame = ServerMessage::Rejected { reason }.encode();
            let _ = write.send(Message::Binary(frame.to_vec().into())).await;
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
        Err(_) => return Ok(()),
    };

    let welcome = ServerMessage::Welcome { snapshot };
    write
        .send(Message::Binary(welcome.encode().to_vec().into()))
        .await?;

    // Message loop - forward requests in, replicate notifications out.
    let result = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        match ClientMessage::parse(&data) {
                            Ok(message) => {
                                let event = SessionEvent::Request { connection_id, message };
                                if event_tx.send(event).is_err() {
                                    break Ok(());
                                }
                            }
                            Err(e) => {
                                warn!("Bad message from {}: {}", addr, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break Ok(());
                    }
                    Some(Err(e)) => {
                        break Err(e.into());
                    }
                    None => {
                        break Ok(());
                    }
                    _ => {}
                }
            }
            notification = notify_rx.recv() => {
                match notification {
                    Ok(message) => {
                        let frame = message.encode();
                        if let Err(e) = write.send(Message::Binary(frame.to_vec().into())).await {
                            debug!("Failed to send to {}: {}", addr, e);
                            break Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, {} notifications dropped", addr, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break Ok(());
                    }
                }
            }
        }
    };

    // The authority hears about the departure exactly once, however the
    // loop exits.
    let _ = event_tx.send(SessionEvent::Disconnect { connection_id });

    result
}

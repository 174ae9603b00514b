//! Parley production server.
//!
//! Production "glue" that wraps the action-based engine in
//! [`parley_core`] with real I/O: Tokio for the async runtime,
//! tokio-tungstenite for WebSocket transport, and the system clock.
//!
//! # Architecture
//!
//! The [`ChatDriver`] is pure logic behind a single mutex - every inbound
//! event locks it, runs to completion, and yields actions. [`Server`]
//! executes those actions against per-session outbound channels: each
//! connection gets an unbounded sender registered in [`SharedState`] and a
//! writer task draining the receiving end into its WebSocket sink. Broadcast
//! fan-out enumerates recipients from the driver at execution time and
//! skips connections that are already gone.
//!
//! Clients authenticate by presenting their token as the `token` query
//! parameter of the WebSocket handshake URL; handshakes without one are
//! rejected with 401 before the upgrade.

mod error;
mod system_env;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

pub use error::ServerError;
use futures::{SinkExt, StreamExt};
use parley_auth::{AuthorityConfig, JwtAuthority};
use parley_core::{ChatAction, ChatConfig, ChatDriver, ChatEvent, LogLevel, SessionId};
use parley_proto::{ClientEvent, ServerEvent};
pub use system_env::SystemEnv;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, RwLock, mpsc},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
    },
};

/// The production driver instantiation: system clock, JWT verification.
type Driver = ChatDriver<SystemEnv, JwtAuthority>;

/// Shared state for all connections: session ID → outbound channel.
///
/// All messages to a client go through its single channel, ensuring
/// ordering; the writer task owns the WebSocket sink.
struct SharedState {
    sessions: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4040").
    pub bind_address: String,
    /// Token authority configuration (secret, admin credentials).
    pub auth: AuthorityConfig,
    /// Engine configuration (rate-gate cooldown).
    pub chat: ChatConfig,
}

/// Production Parley server.
///
/// Wraps [`ChatDriver`] with WebSocket transport and the system
/// environment.
pub struct Server {
    listener: TcpListener,
    driver: Arc<Mutex<Driver>>,
    shared: Arc<SharedState>,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let driver =
            ChatDriver::new(SystemEnv::new(), JwtAuthority::new(config.auth), config.chat);

        Ok(Self {
            listener,
            driver: Arc::new(Mutex::new(driver)),
            shared: Arc::new(SharedState { sessions: RwLock::new(HashMap::new()) }),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections and processing events.
    ///
    /// Runs until the process is shut down or the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.listener.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, driver, shared).await {
                            tracing::debug!("connection error from {peer}: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Extract the `token` query parameter from the handshake URI.
fn query_token(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| pair.strip_prefix("token=")).map(ToString::to_string)
}

/// OS-random connection identifier.
#[allow(clippy::expect_used)]
fn random_session_id() -> SessionId {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf)
        .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    u64::from_le_bytes(buf)
}

/// Run one event through the driver and execute the resulting actions.
///
/// Engine errors mark programming-error conditions; they are logged and the
/// connection carries on.
async fn dispatch(driver: &Arc<Mutex<Driver>>, shared: &SharedState, event: ChatEvent) {
    let mut driver = driver.lock().await;
    match driver.process_event(event) {
        Ok(actions) => execute_actions(&driver, actions, shared).await,
        Err(e) => tracing::warn!("event processing error: {e}"),
    }
}

/// Handle a single WebSocket connection from handshake to cleanup.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    driver: Arc<Mutex<Driver>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let mut token = None;
    let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        token = query_token(request.uri().query());
        if token.is_some() {
            Ok(response)
        } else {
            let mut reject = ErrorResponse::new(Some("missing token".to_string()));
            *reject.status_mut() = StatusCode::UNAUTHORIZED;
            Err(reject)
        }
    })
    .await?;

    let Some(token) = token else {
        // Handshake was rejected above; nothing to clean up.
        return Ok(());
    };

    let session_id = random_session_id();
    tracing::debug!("new connection from {peer}: session {session_id}");

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    {
        let mut sessions = shared.sessions.write().await;
        sessions.insert(session_id, out_tx);
    }

    // Writer task: drains the outbound channel into the sink. Ends when the
    // channel closes (cleanup below) or after forwarding a close frame.
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    dispatch(&driver, &shared, ChatEvent::ConnectionAccepted { session_id, token }).await;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("read error on session {session_id}: {e}");
                break;
            },
        };

        match message {
            Message::Text(text) => match ClientEvent::decode(text.as_str()) {
                Ok(event) => {
                    dispatch(&driver, &shared, ChatEvent::EventReceived { session_id, event })
                        .await;
                },
                Err(e) => {
                    // Malformed inputs are dropped without reply.
                    tracing::debug!("dropping malformed event from session {session_id}: {e}");
                },
            },
            Message::Close(_) => break,
            // Binary frames are not part of the protocol; pings are answered
            // by the WebSocket layer itself.
            _ => {},
        }
    }

    {
        let mut sessions = shared.sessions.write().await;
        sessions.remove(&session_id);
    }

    dispatch(&driver, &shared, ChatEvent::ConnectionClosed { session_id }).await;

    Ok(())
}

/// Send one encoded event to one session, skipping closed connections.
async fn send_event(shared: &SharedState, session_id: SessionId, event: &ServerEvent) {
    match event.encode() {
        Ok(text) => {
            let sessions = shared.sessions.read().await;
            if let Some(tx) = sessions.get(&session_id) {
                let _ = tx.send(Message::text(text));
            }
        },
        Err(e) => tracing::error!("failed to encode event: {e}"),
    }
}

/// Execute driver actions against the live connection set.
async fn execute_actions(driver: &Driver, actions: Vec<ChatAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ChatAction::SendToSession { session_id, event } => {
                send_event(shared, session_id, &event).await;
            },

            ChatAction::SendToRoom { room, event, exclude } => {
                // Capture the recipient list first; fan-out is
                // fire-and-forget against whoever is still connected.
                let recipients = driver.occupants(&room);
                match event.encode() {
                    Ok(text) => {
                        let sessions = shared.sessions.read().await;
                        for session_id in recipients {
                            if Some(session_id) == exclude {
                                continue;
                            }
                            if let Some(tx) = sessions.get(&session_id) {
                                let _ = tx.send(Message::text(text.clone()));
                            }
                        }
                    },
                    Err(e) => tracing::error!("failed to encode event: {e}"),
                }
            },

            ChatAction::BroadcastAll { event } => {
                let recipients = driver.session_ids();
                match event.encode() {
                    Ok(text) => {
                        let sessions = shared.sessions.read().await;
                        for session_id in recipients {
                            if let Some(tx) = sessions.get(&session_id) {
                                let _ = tx.send(Message::text(text.clone()));
                            }
                        }
                    },
                    Err(e) => tracing::error!("failed to encode event: {e}"),
                }
            },

            ChatAction::CloseConnection { session_id, reason } => {
                tracing::info!("closing session {session_id}: {reason}");
                let sessions = shared.sessions.read().await;
                if let Some(tx) = sessions.get(&session_id) {
                    let _ = tx.send(Message::Close(None));
                }
            },

            ChatAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

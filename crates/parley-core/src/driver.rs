//! Chat driver.
//!
//! Ties together the session registry, room directory, and rate limiter into
//! one event→actions state machine. Every inbound event is processed to
//! completion before the next, so no transition can observe a torn update;
//! the runtime serializes access with a single lock around the driver.
//!
//! Per-session room membership follows `Unjoined → Joined(room)` on
//! admission, `Joined(a) → Joined(b)` on explicit join, and
//! `Joined(room) → Unjoined` on disconnect. Presence for a room is always
//! recomputed from the registry when broadcast.

use chrono::{DateTime, SecondsFormat, Utc};
use parley_auth::TokenVerifier;
use parley_proto::{ClientEvent, MessagePayload, Role, ServerEvent, TypingNotice};

use crate::{
    directory::{LOBBY, RoomDirectory, SUPPORT},
    env::Environment,
    error::ChatError,
    rate_limit::{MESSAGE_COOLDOWN, RateLimiter},
    registry::{Session, SessionId, SessionRegistry},
};

/// Sender name stamped on server-originated room notices.
const SYSTEM_SENDER: &str = "System";

/// Private notice for a rate-limited message.
const THROTTLE_NOTICE: &str = "Slow down! Wait a moment before sending another message.";

/// Private notice for an out-of-bounds nickname.
const NICKNAME_NOTICE: &str = "Nickname must be between 3 and 20 characters.";

/// Events the driver processes, produced by the transport runtime.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A connection completed the transport handshake.
    ConnectionAccepted {
        /// Unique connection ID assigned by the transport.
        session_id: SessionId,
        /// Opaque identity token from the handshake metadata.
        token: String,
    },

    /// A decoded client event arrived on an open connection.
    EventReceived {
        /// Connection that sent the event.
        session_id: SessionId,
        /// The decoded event.
        event: ClientEvent,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        session_id: SessionId,
    },
}

/// Actions the driver produces, executed by runtime-specific code.
///
/// Delivery is fire-and-forget: the runtime enumerates recipients at
/// execution time and simply skips connections that are already gone.
#[derive(Debug, Clone)]
pub enum ChatAction {
    /// Send an event to one connection.
    SendToSession {
        /// Target connection.
        session_id: SessionId,
        /// Event to deliver.
        event: ServerEvent,
    },

    /// Send an event to every session currently occupying a room.
    SendToRoom {
        /// Target room name.
        room: String,
        /// Event to deliver.
        event: ServerEvent,
        /// Session to exclude from delivery (the typist, for typing relays).
        exclude: Option<SessionId>,
    },

    /// Send an event to every admitted session regardless of room.
    ///
    /// Used only for room-directory changes.
    BroadcastAll {
        /// Event to deliver.
        event: ServerEvent,
    },

    /// Close a connection.
    CloseConnection {
        /// Connection to close.
        session_id: SessionId,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Minimum interval between chat messages from one connection.
    pub message_cooldown: std::time::Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { message_cooldown: MESSAGE_COOLDOWN }
    }
}

/// Action-based chat session manager.
///
/// Owns all mutable engine state; the runtime calls
/// [`process_event`](Self::process_event) for each inbound event and
/// executes the returned actions.
pub struct ChatDriver<E, V>
where
    E: Environment,
    V: TokenVerifier,
{
    registry: SessionRegistry,
    directory: RoomDirectory,
    rate_limiter: RateLimiter<E::Instant>,
    verifier: V,
    env: E,
}

impl<E, V> ChatDriver<E, V>
where
    E: Environment,
    V: TokenVerifier,
{
    /// Create a driver with the default room directory.
    pub fn new(env: E, verifier: V, config: ChatConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            directory: RoomDirectory::new(),
            rate_limiter: RateLimiter::new(config.message_cooldown),
            verifier,
            env,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the only entry point; events must be fed one at a time.
    pub fn process_event(&mut self, event: ChatEvent) -> Result<Vec<ChatAction>, ChatError> {
        match event {
            ChatEvent::ConnectionAccepted { session_id, token } => {
                self.handle_connection_accepted(session_id, &token)
            },
            ChatEvent::EventReceived { session_id, event } => {
                self.handle_client_event(session_id, event)
            },
            ChatEvent::ConnectionClosed { session_id } => {
                self.handle_connection_closed(session_id)
            },
        }
    }

    /// Authenticate and admit a new connection.
    ///
    /// On verification failure the connection is closed without a session -
    /// no retry, no broadcast.
    fn handle_connection_accepted(
        &mut self,
        session_id: SessionId,
        token: &str,
    ) -> Result<Vec<ChatAction>, ChatError> {
        let identity = match self.verifier.verify(token) {
            Ok(identity) => identity,
            Err(e) => {
                return Ok(vec![
                    ChatAction::Log {
                        level: LogLevel::Warn,
                        message: format!("rejected connection {session_id}: {e}"),
                    },
                    ChatAction::CloseConnection {
                        session_id,
                        reason: "authentication failed".to_string(),
                    },
                ]);
            },
        };

        self.registry.admit(session_id, identity.name.clone(), identity.role)?;

        let mut actions = vec![
            ChatAction::Log {
                level: LogLevel::Info,
                message: format!("client connected: {} (session {session_id})", identity.name),
            },
            ChatAction::SendToSession {
                session_id,
                event: ServerEvent::RoomList(self.directory.rooms().to_vec()),
            },
        ];

        let default_room = if identity.role.is_admin() { SUPPORT } else { LOBBY };
        actions.extend(self.join_room(session_id, default_room.to_string()));
        Ok(actions)
    }

    /// Dispatch a decoded client event.
    fn handle_client_event(
        &mut self,
        session_id: SessionId,
        event: ClientEvent,
    ) -> Result<Vec<ChatAction>, ChatError> {
        let (display_name, role, current_room) = {
            let session = self
                .registry
                .lookup(session_id)
                .ok_or(ChatError::SessionNotFound(session_id))?;
            (
                session.display_name().to_string(),
                session.role(),
                session.current_room().map(ToString::to_string),
            )
        };

        match event {
            ClientEvent::JoinRoom(room) => Ok(self.join_room(session_id, room)),
            ClientEvent::Message { content } => {
                Ok(self.relay_message(session_id, &display_name, role, current_room, content))
            },
            ClientEvent::Typing(is_typing) => {
                // No rate limit, no state: forward to the room minus the
                // typist. Dropped when not in a room.
                let Some(room) = current_room else { return Ok(Vec::new()) };
                Ok(vec![ChatAction::SendToRoom {
                    room,
                    event: ServerEvent::UserTyping(TypingNotice { display_name, is_typing }),
                    exclude: Some(session_id),
                }])
            },
            ClientEvent::ChangeNickname(name) => {
                self.change_nickname(session_id, current_room, &name)
            },
            ClientEvent::CreateRoom(name) => Ok(self.create_room(session_id, role, &name)),
            ClientEvent::DeleteRoom(name) => Ok(self.delete_room(session_id, role, &name)),
        }
    }

    /// Remove the session and recompute presence for its last room.
    fn handle_connection_closed(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<ChatAction>, ChatError> {
        self.rate_limiter.forget(session_id);

        // Closing a connection that was never admitted (failed auth) is
        // routine, not an error.
        let Some(session) = self.registry.remove(session_id) else {
            return Ok(Vec::new());
        };

        let mut actions = vec![ChatAction::Log {
            level: LogLevel::Info,
            message: format!(
                "client disconnected: {} (session {session_id})",
                session.display_name()
            ),
        }];
        if let Some(room) = session.current_room() {
            actions.push(self.presence_update(room));
        }
        Ok(actions)
    }

    /// The join transition, shared by explicit joins and default placement.
    ///
    /// Detaches from the previous room (broadcasting its shrunk presence),
    /// attaches to `room`, broadcasts the grown presence, and acks the
    /// joiner. The room name is deliberately NOT validated against the
    /// directory.
    fn join_room(&mut self, session_id: SessionId, room: String) -> Vec<ChatAction> {
        let mut actions = Vec::new();

        let previous = self
            .registry
            .lookup(session_id)
            .and_then(|s| s.current_room().map(ToString::to_string));
        if let Some(old_room) = previous {
            self.registry.set_room(session_id, None);
            actions.push(self.presence_update(&old_room));
        }

        self.registry.set_room(session_id, Some(room.clone()));
        actions.push(self.presence_update(&room));
        actions.push(ChatAction::SendToSession {
            session_id,
            event: ServerEvent::JoinedRoom(room),
        });
        actions
    }

    /// Gate, stamp, and route a chat message to the sender's current room.
    fn relay_message(
        &mut self,
        session_id: SessionId,
        sender: &str,
        role: Role,
        current_room: Option<String>,
        content: String,
    ) -> Vec<ChatAction> {
        // Requires a current room; dropped without reply otherwise.
        let Some(room) = current_room else { return Vec::new() };

        if !self.rate_limiter.allow(session_id, self.env.now()) {
            return vec![
                ChatAction::SendToSession {
                    session_id,
                    event: ServerEvent::Error(THROTTLE_NOTICE.to_string()),
                },
                ChatAction::Log {
                    level: LogLevel::Debug,
                    message: format!("rate-limited message from session {session_id}"),
                },
            ];
        }

        let payload = MessagePayload {
            sender: sender.to_string(),
            role,
            content,
            timestamp: self.timestamp(),
            room: room.clone(),
        };
        // The sender is included in the fan-out.
        vec![ChatAction::SendToRoom {
            room,
            event: ServerEvent::Message(payload),
            exclude: None,
        }]
    }

    /// Validate and apply a display-name change.
    fn change_nickname(
        &mut self,
        session_id: SessionId,
        current_room: Option<String>,
        name: &str,
    ) -> Result<Vec<ChatAction>, ChatError> {
        let (old, new) = match self.registry.rename(session_id, name) {
            Ok(renamed) => renamed,
            Err(ChatError::InvalidDisplayName { .. }) => {
                return Ok(vec![ChatAction::SendToSession {
                    session_id,
                    event: ServerEvent::Error(NICKNAME_NOTICE.to_string()),
                }]);
            },
            Err(e) => return Err(e),
        };

        let mut actions = vec![
            ChatAction::SendToSession {
                session_id,
                event: ServerEvent::NicknameUpdated(new.clone()),
            },
            ChatAction::Log {
                level: LogLevel::Info,
                message: format!("session {session_id} renamed: {old} -> {new}"),
            },
        ];

        if let Some(room) = current_room {
            actions.push(self.presence_update(&room));
            let notice = MessagePayload {
                sender: SYSTEM_SENDER.to_string(),
                role: Role::System,
                content: format!("{old} is now {new}"),
                timestamp: self.timestamp(),
                room: room.clone(),
            };
            actions.push(ChatAction::SendToRoom {
                room,
                event: ServerEvent::Message(notice),
                exclude: None,
            });
        }
        Ok(actions)
    }

    /// Admin-gated room creation. Silent no-op for non-admins and
    /// duplicates.
    fn create_room(&mut self, session_id: SessionId, role: Role, name: &str) -> Vec<ChatAction> {
        if !role.is_admin() {
            return vec![ChatAction::Log {
                level: LogLevel::Debug,
                message: format!("ignoring createRoom from non-admin session {session_id}"),
            }];
        }

        if !self.directory.create(name) {
            return vec![ChatAction::Log {
                level: LogLevel::Debug,
                message: format!("ignoring createRoom for existing room: {name}"),
            }];
        }

        vec![
            ChatAction::Log {
                level: LogLevel::Info,
                message: format!("room created: {name}"),
            },
            self.room_list_broadcast(),
        ]
    }

    /// Admin-gated room deletion with forced migration.
    ///
    /// Occupants of the deleted room are reassigned to the lobby directly -
    /// not via the join transition - so no presence is recomputed for the
    /// room that is going away. The directory notice is global; the lobby's
    /// grown presence is rebroadcast when anyone was displaced.
    fn delete_room(&mut self, session_id: SessionId, role: Role, name: &str) -> Vec<ChatAction> {
        if !role.is_admin() {
            return vec![ChatAction::Log {
                level: LogLevel::Debug,
                message: format!("ignoring deleteRoom from non-admin session {session_id}"),
            }];
        }

        if RoomDirectory::is_protected(name) {
            return vec![ChatAction::Log {
                level: LogLevel::Debug,
                message: format!("refusing to delete protected room: {name}"),
            }];
        }

        self.directory.remove(name);

        let displaced = self.registry.occupants(name);
        for id in &displaced {
            self.registry.set_room(*id, Some(LOBBY.to_string()));
        }

        let mut actions = vec![
            ChatAction::Log {
                level: LogLevel::Info,
                message: format!("room deleted: {name} ({} displaced)", displaced.len()),
            },
            self.room_list_broadcast(),
        ];
        if !displaced.is_empty() {
            actions.push(self.presence_update(LOBBY));
        }
        actions
    }

    /// Recompute a room's presence from the registry and broadcast it to
    /// the room's occupants.
    fn presence_update(&self, room: &str) -> ChatAction {
        ChatAction::SendToRoom {
            room: room.to_string(),
            event: ServerEvent::Users(self.registry.presence(room)),
            exclude: None,
        }
    }

    /// Global room-directory notice.
    fn room_list_broadcast(&self) -> ChatAction {
        ChatAction::BroadcastAll { event: ServerEvent::RoomList(self.directory.rooms().to_vec()) }
    }

    /// Current wall-clock time, ISO-8601 UTC with millisecond precision.
    fn timestamp(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.env.wall_clock_ms())
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }

    /// Session state for a connection.
    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.registry.lookup(session_id)
    }

    /// Sessions currently occupying `room`, ordered by admission. The
    /// runtime uses this to enumerate broadcast recipients.
    pub fn occupants(&self, room: &str) -> Vec<SessionId> {
        self.registry.occupants(room)
    }

    /// All admitted sessions, ordered by admission.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.session_ids()
    }

    /// Room names in client-visible order.
    pub fn rooms(&self) -> &[String] {
        self.directory.rooms()
    }

    /// Number of admitted sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

impl<E, V> std::fmt::Debug for ChatDriver<E, V>
where
    E: Environment,
    V: TokenVerifier,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatDriver")
            .field("session_count", &self.registry.len())
            .field("rooms", &self.directory.rooms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parley_auth::{AuthError, Identity};

    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn wall_clock_ms(&self) -> i64 {
            1_700_000_000_000
        }
    }

    /// Accepts tokens of the form `admin:<name>` and `user:<name>`.
    struct StubVerifier;

    impl TokenVerifier for StubVerifier {
        fn verify(&self, token: &str) -> Result<Identity, AuthError> {
            match token.split_once(':') {
                Some(("admin", name)) => Ok(Identity { name: name.to_string(), role: Role::Admin }),
                Some(("user", name)) => Ok(Identity { name: name.to_string(), role: Role::User }),
                _ => Err(AuthError::InvalidToken("unrecognized test token".to_string())),
            }
        }
    }

    fn driver() -> ChatDriver<TestEnv, StubVerifier> {
        ChatDriver::new(TestEnv, StubVerifier, ChatConfig::default())
    }

    fn connect(
        driver: &mut ChatDriver<TestEnv, StubVerifier>,
        session_id: SessionId,
        token: &str,
    ) -> Vec<ChatAction> {
        driver
            .process_event(ChatEvent::ConnectionAccepted {
                session_id,
                token: token.to_string(),
            })
            .unwrap()
    }

    #[test]
    fn guest_is_admitted_into_the_lobby() {
        let mut driver = driver();

        let actions = connect(&mut driver, 1, "user:alice");

        let session = driver.session(1).unwrap();
        assert_eq!(session.display_name(), "alice");
        assert_eq!(session.current_room(), Some(LOBBY));

        // Admission courtesy: the room list goes to the new connection
        // before the default join runs.
        assert!(matches!(
            &actions[1],
            ChatAction::SendToSession { session_id: 1, event: ServerEvent::RoomList(_) }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::SendToSession { session_id: 1, event: ServerEvent::JoinedRoom(room) }
                if room == LOBBY
        )));
    }

    #[test]
    fn admin_is_admitted_into_support() {
        let mut driver = driver();

        connect(&mut driver, 1, "admin:operator");

        assert_eq!(driver.session(1).unwrap().current_room(), Some(SUPPORT));
    }

    #[test]
    fn failed_authentication_closes_without_a_session() {
        let mut driver = driver();

        let actions = connect(&mut driver, 1, "garbage");

        assert!(driver.session(1).is_none());
        assert_eq!(driver.session_count(), 0);
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::CloseConnection { session_id: 1, .. }
        )));
        // Nothing is broadcast for a rejected connection.
        assert!(!actions.iter().any(|a| matches!(a, ChatAction::SendToRoom { .. })));
    }

    #[test]
    fn duplicate_admission_is_a_programming_error() {
        let mut driver = driver();

        connect(&mut driver, 1, "user:alice");
        let result = driver.process_event(ChatEvent::ConnectionAccepted {
            session_id: 1,
            token: "user:bob".to_string(),
        });

        assert!(matches!(result, Err(ChatError::SessionAlreadyAdmitted(1))));
    }

    #[test]
    fn join_detaches_then_attaches() {
        let mut driver = driver();
        connect(&mut driver, 1, "user:alice");

        let actions = driver
            .process_event(ChatEvent::EventReceived {
                session_id: 1,
                event: ClientEvent::JoinRoom("Privé A".to_string()),
            })
            .unwrap();

        assert_eq!(driver.session(1).unwrap().current_room(), Some("Privé A"));
        assert!(driver.occupants(LOBBY).is_empty());
        assert_eq!(driver.occupants("Privé A"), vec![1]);

        // Old room's shrunk presence, new room's grown presence, then the ack.
        assert!(matches!(
            &actions[0],
            ChatAction::SendToRoom { room, event: ServerEvent::Users(users), .. }
                if room == LOBBY && users.is_empty()
        ));
        assert!(matches!(
            &actions[1],
            ChatAction::SendToRoom { room, event: ServerEvent::Users(users), .. }
                if room == "Privé A" && users.len() == 1
        ));
        assert!(matches!(
            &actions[2],
            ChatAction::SendToSession { session_id: 1, event: ServerEvent::JoinedRoom(room) }
                if room == "Privé A"
        ));
    }

    #[test]
    fn join_allows_unlisted_room_names() {
        let mut driver = driver();
        connect(&mut driver, 1, "user:alice");

        driver
            .process_event(ChatEvent::EventReceived {
                session_id: 1,
                event: ClientEvent::JoinRoom("Hideout".to_string()),
            })
            .unwrap();

        assert_eq!(driver.session(1).unwrap().current_room(), Some("Hideout"));
        assert!(!driver.rooms().iter().any(|r| r == "Hideout"));
    }

    #[test]
    fn message_is_stamped_with_sender_and_room() {
        let mut driver = driver();
        connect(&mut driver, 1, "user:alice");

        let actions = driver
            .process_event(ChatEvent::EventReceived {
                session_id: 1,
                event: ClientEvent::Message { content: "hi".to_string() },
            })
            .unwrap();

        let Some(ChatAction::SendToRoom { room, event: ServerEvent::Message(payload), exclude }) =
            actions.first()
        else {
            unreachable!("expected a room broadcast, got {actions:?}");
        };
        assert_eq!(room, LOBBY);
        assert_eq!(payload.sender, "alice");
        assert_eq!(payload.role, Role::User);
        assert_eq!(payload.content, "hi");
        assert_eq!(payload.room, LOBBY);
        assert_eq!(payload.timestamp, "2023-11-14T22:13:20.000Z");
        // The sender is not excluded from the fan-out.
        assert_eq!(*exclude, None);
    }

    #[test]
    fn typing_is_relayed_without_the_typist() {
        let mut driver = driver();
        connect(&mut driver, 1, "user:alice");
        connect(&mut driver, 2, "user:bob");

        let actions = driver
            .process_event(ChatEvent::EventReceived {
                session_id: 1,
                event: ClientEvent::Typing(true),
            })
            .unwrap();

        assert!(matches!(
            &actions[0],
            ChatAction::SendToRoom {
                room,
                event: ServerEvent::UserTyping(notice),
                exclude: Some(1),
            } if room == LOBBY && notice.display_name == "alice" && notice.is_typing
        ));
    }

    #[test]
    fn event_from_unknown_session_is_an_error() {
        let mut driver = driver();

        let result = driver.process_event(ChatEvent::EventReceived {
            session_id: 9,
            event: ClientEvent::Typing(true),
        });

        assert!(matches!(result, Err(ChatError::SessionNotFound(9))));
    }

    #[test]
    fn disconnect_recomputes_presence_for_the_last_room() {
        let mut driver = driver();
        connect(&mut driver, 1, "user:alice");
        connect(&mut driver, 2, "user:bob");

        let actions =
            driver.process_event(ChatEvent::ConnectionClosed { session_id: 1 }).unwrap();

        assert!(driver.session(1).is_none());
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::SendToRoom { room, event: ServerEvent::Users(users), .. }
                if room == LOBBY && users.len() == 1
        )));
    }

    #[test]
    fn disconnect_of_unadmitted_connection_is_silent() {
        let mut driver = driver();

        let actions =
            driver.process_event(ChatEvent::ConnectionClosed { session_id: 7 }).unwrap();

        assert!(actions.is_empty());
    }
}

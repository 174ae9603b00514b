//! Client and server event envelopes.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Role};

/// Events a client may send after its session is admitted.
///
/// The `event` tag carries the event name, `data` the payload. Anything that
/// fails to decode into one of these variants is dropped by the transport
/// without a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join a room by name. Any admitted participant may join any name.
    JoinRoom(String),
    /// Send a chat message to the current room.
    Message {
        /// Message body as typed by the participant.
        content: String,
    },
    /// Start or stop the typing indicator.
    Typing(bool),
    /// Request a display-name change.
    ChangeNickname(String),
    /// Create a room (admin only; silently ignored otherwise).
    CreateRoom(String),
    /// Delete a room (admin only; silently ignored otherwise).
    DeleteRoom(String),
}

impl ClientEvent {
    /// Decode an inbound envelope.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events the server emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Current room directory, in insertion order. Sent to everyone when the
    /// directory changes and to a single connection on admission.
    RoomList(Vec<String>),
    /// Echo of a successful join, to the joining connection only.
    JoinedRoom(String),
    /// Occupant list of a room, ordered by arrival.
    Users(Vec<UserPresence>),
    /// A chat message, fanned out to every occupant of its room.
    Message(MessagePayload),
    /// Typing indicator relay, to the room excluding the typist.
    UserTyping(TypingNotice),
    /// Ack of a display-name change, to the renaming connection only.
    NicknameUpdated(String),
    /// Human-readable error, to the offending connection only.
    Error(String),
}

impl ServerEvent {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an envelope (client side).
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One entry of a room's occupant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    /// Current display name.
    pub display_name: String,
    /// Participant role.
    pub role: Role,
}

/// A chat message as delivered to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Display name of the sender at send time.
    pub sender: String,
    /// Sender role; `system` for server-originated notices.
    pub role: Role,
    /// Message body.
    pub content: String,
    /// Server-side send time, ISO-8601 UTC.
    pub timestamp: String,
    /// Room the message was delivered to.
    pub room: String,
}

/// Typing indicator payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Display name of the typist.
    pub display_name: String,
    /// True while the typist is composing.
    pub is_typing: bool,
}

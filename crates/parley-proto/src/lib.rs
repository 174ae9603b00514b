//! Wire event types for the Parley chat protocol.
//!
//! Every message on the wire is a JSON envelope `{"event": ..., "data": ...}`
//! where `event` names the message type and `data` carries its payload.
//! [`ClientEvent`] covers everything a client may send after the handshake;
//! [`ServerEvent`] covers everything the server emits. The handshake itself
//! (token exchange) happens at the transport layer and has no envelope.
//!
//! The envelope is self-describing JSON rather than a binary framing: the
//! server never routes on payload internals, payloads are small, and clients
//! in any language can speak it without code generation.
//!
//! # Invariants
//!
//! Each event name maps to exactly one variant (enforced by serde's tagged
//! representation). Encoding an event and decoding it back must produce an
//! equivalent value.

mod error;
mod event;
mod role;

pub use error::ProtocolError;
pub use event::{ClientEvent, MessagePayload, ServerEvent, TypingNotice, UserPresence};
pub use role::Role;

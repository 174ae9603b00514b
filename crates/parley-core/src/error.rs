//! Engine error types.

use crate::registry::SessionId;

/// Errors from engine operations.
///
/// Only the session-identity variants ever escape
/// [`ChatDriver::process_event`](crate::ChatDriver::process_event): they mark
/// programming-error conditions (a transport delivering events for a
/// connection the engine does not know, or admitting the same connection
/// twice) and the runtime logs them and carries on. `InvalidDisplayName` is
/// handled inside the driver and surfaces to the client as a private error
/// event.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Event received for a connection with no admitted session.
    ///
    /// Should not occur under correct transport semantics: events are only
    /// forwarded for connections that completed the handshake.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Admission attempted for an already-admitted connection ID.
    ///
    /// Connection IDs are assigned uniquely by the transport, so this is a
    /// logic bug in the caller.
    #[error("session already admitted: {0}")]
    SessionAlreadyAdmitted(SessionId),

    /// Requested display name is outside the 3-20 trimmed-character bounds.
    #[error("display name must be 3-20 characters after trimming, got {len}")]
    InvalidDisplayName {
        /// Trimmed character count of the rejected name.
        len: usize,
    },
}

//! Session registry: connection → participant state.
//!
//! One [`Session`] per live connection, owned exclusively by the registry.
//! There is no room → members map: a room's occupancy is derived by scanning
//! sessions whose `current_room` matches, so membership can never drift from
//! session state. Occupant lists are ordered by admission.

use std::collections::HashMap;

use parley_proto::{Role, UserPresence};

use crate::error::ChatError;

/// Opaque connection identifier assigned by the transport.
pub type SessionId = u64;

/// Display names must be 3-20 characters after trimming.
const DISPLAY_NAME_MIN: usize = 3;
const DISPLAY_NAME_MAX: usize = 20;

/// Per-connection participant state.
///
/// Created on successful authentication, destroyed on disconnect. The room
/// reference is a name only - a session never owns a room, and the name is
/// not required to appear in the room directory (join is deliberately
/// lenient).
#[derive(Debug, Clone)]
pub struct Session {
    display_name: String,
    role: Role,
    current_room: Option<String>,
    admitted_seq: u64,
}

impl Session {
    /// Current display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Role fixed at admission.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Room this session currently occupies, if any.
    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }
}

/// Registry of admitted sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    /// Admission counter; orders presence lists by arrival.
    next_seq: u64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a session for a freshly authenticated connection.
    ///
    /// Fails with [`ChatError::SessionAlreadyAdmitted`] if the connection ID
    /// is already present.
    pub fn admit(
        &mut self,
        session_id: SessionId,
        display_name: String,
        role: Role,
    ) -> Result<(), ChatError> {
        if self.sessions.contains_key(&session_id) {
            return Err(ChatError::SessionAlreadyAdmitted(session_id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.sessions.insert(
            session_id,
            Session { display_name, role, current_room: None, admitted_seq: seq },
        );
        Ok(())
    }

    /// Session state. `None` if the connection was never admitted.
    pub fn lookup(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    /// Whether a session is admitted.
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Remove a session, returning it so the caller can react to its last
    /// room.
    pub fn remove(&mut self, session_id: SessionId) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    /// Change a session's display name, enforcing the 3-20
    /// trimmed-character rule.
    ///
    /// Returns `(old, new)` names on success; the stored name is the trimmed
    /// form. Does not broadcast - presence updates are the caller's job.
    pub fn rename(
        &mut self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<(String, String), ChatError> {
        let session =
            self.sessions.get_mut(&session_id).ok_or(ChatError::SessionNotFound(session_id))?;

        let trimmed = new_name.trim();
        let len = trimmed.chars().count();
        if !(DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
            return Err(ChatError::InvalidDisplayName { len });
        }

        let old = std::mem::replace(&mut session.display_name, trimmed.to_string());
        Ok((old, trimmed.to_string()))
    }

    /// Reassign a session's current room. Returns `false` for unknown
    /// sessions.
    pub fn set_room(&mut self, session_id: SessionId, room: Option<String>) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(session) => {
                session.current_room = room;
                true
            },
            None => false,
        }
    }

    /// Session IDs currently occupying `room`, ordered by admission.
    ///
    /// Re-derived on every call; nothing is cached.
    pub fn occupants(&self, room: &str) -> Vec<SessionId> {
        let mut found: Vec<(u64, SessionId)> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.current_room.as_deref() == Some(room))
            .map(|(id, s)| (s.admitted_seq, *id))
            .collect();
        found.sort_unstable();
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Presence projection of `room`: `{displayName, role}` per occupant,
    /// ordered by admission.
    pub fn presence(&self, room: &str) -> Vec<UserPresence> {
        let mut found: Vec<(u64, UserPresence)> = self
            .sessions
            .values()
            .filter(|s| s.current_room.as_deref() == Some(room))
            .map(|s| {
                (s.admitted_seq, UserPresence {
                    display_name: s.display_name.clone(),
                    role: s.role,
                })
            })
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, p)| p).collect()
    }

    /// All admitted session IDs, ordered by admission. Used for global
    /// broadcasts.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut found: Vec<(u64, SessionId)> =
            self.sessions.iter().map(|(id, s)| (s.admitted_seq, *id)).collect();
        found.sort_unstable();
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of admitted sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are admitted.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

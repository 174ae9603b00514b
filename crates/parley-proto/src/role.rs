//! Participant roles.

use serde::{Deserialize, Serialize};

/// Role attached to a participant identity.
///
/// Roles are minted by the token authority and never change for the lifetime
/// of a session. `System` is the exception: it is never assigned to a
/// session and appears only as the stamped role of server-originated room
/// notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged participant; may create and delete rooms.
    Admin,
    /// Regular participant.
    User,
    /// Server-originated notices only.
    System,
}

impl Role {
    /// Whether this role may perform room administration.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

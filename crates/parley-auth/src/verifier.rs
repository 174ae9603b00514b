//! Identity verification contract consumed by the chat core.

use parley_proto::Role;

use crate::AuthError;

/// The identity embedded in a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Participant name; becomes the session's initial display name.
    pub name: String,
    /// Participant role.
    pub role: Role,
}

/// Verifies an opaque token presented at connection time.
///
/// One synchronous check, no retry: any error means the connection is
/// terminated without a session being admitted.
pub trait TokenVerifier {
    /// Validate `token` and extract the identity it embeds.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

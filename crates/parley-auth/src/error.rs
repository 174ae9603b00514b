//! Authentication error types.

/// Errors from token issuance and verification.
///
/// Any verification error is treated identically by the chat core: the
/// connection is closed without admitting a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token was presented in the connection handshake.
    #[error("no authentication token provided")]
    MissingToken,

    /// The token's lifetime has elapsed.
    #[error("token has expired")]
    Expired,

    /// The token failed signature or structural validation.
    #[error("token validation failed: {0}")]
    InvalidToken(String),

    /// Username/password pair did not match the configured administrator.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Requested guest name collides with the administrator name.
    #[error("name is reserved: {0}")]
    ReservedName(String),

    /// Requested guest name is shorter than 3 characters after trimming.
    #[error("name must be at least 3 characters")]
    NameTooShort,

    /// Token could not be signed.
    ///
    /// Indicates a malformed signing key; cannot occur with the default
    /// HS256 configuration.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

//! Token authority and identity verification for Parley.
//!
//! The chat core consumes tokens through the [`TokenVerifier`] trait: one
//! synchronous check at connection time that either yields an
//! [`Identity`] (name + role) or fails, terminating the connection. This
//! crate also implements the issuing half of that contract as a library -
//! [`JwtAuthority`] signs HS256 tokens with a 1-hour lifetime for the
//! configured administrator credential pair and for guests. The HTTP surface
//! that would expose issuance to browsers is out of scope; callers embed the
//! authority directly.

mod authority;
mod error;
mod verifier;

pub use authority::{AuthorityConfig, Claims, IssuedToken, JwtAuthority};
pub use error::AuthError;
pub use verifier::{Identity, TokenVerifier};

//! HS256 token authority.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parley_proto::Role;
use serde::{Deserialize, Serialize};

use crate::{AuthError, Identity, TokenVerifier};

/// Default token lifetime: one hour.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Configuration for the token authority.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// HMAC signing secret shared by issuance and verification.
    pub secret: String,
    /// Reserved administrator name; guests may not claim it.
    pub admin_username: String,
    /// Administrator password checked by [`JwtAuthority::login`].
    pub admin_password: String,
    /// How long issued tokens stay valid.
    pub token_lifetime: Duration,
}

impl AuthorityConfig {
    /// Config with the default one-hour token lifetime.
    pub fn new(
        secret: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            admin_username: admin_username.into(),
            admin_password: admin_password.into(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

/// Claims embedded in every Parley token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Participant name.
    pub sub: String,
    /// Participant role.
    pub role: Role,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// A freshly signed token together with the identity it embeds.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed compact token.
    pub token: String,
    /// Name embedded in the token.
    pub name: String,
    /// Role embedded in the token.
    pub role: Role,
}

/// Signs and verifies HS256 tokens.
///
/// The issuing side mirrors the credential-exchange contract: the configured
/// administrator pair yields an admin token, any other credentials are
/// rejected, and guests get user tokens under name rules that keep the
/// administrator name unclaimable.
pub struct JwtAuthority {
    config: AuthorityConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtAuthority {
    /// Create an authority from configuration.
    pub fn new(config: AuthorityConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self { config, encoding_key, decoding_key }
    }

    /// Authenticate the administrator credential pair.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        if username != self.config.admin_username || password != self.config.admin_password {
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(username, Role::Admin)
    }

    /// Issue a guest token for `username` with role `user`.
    ///
    /// Rejects names that collide (case-insensitively) with the reserved
    /// administrator name and names shorter than 3 trimmed characters.
    pub fn login_guest(&self, username: &str) -> Result<IssuedToken, AuthError> {
        let name = username.trim();
        let lowered = name.to_lowercase();
        if lowered == self.config.admin_username.to_lowercase() || lowered == "admin" {
            return Err(AuthError::ReservedName(name.to_string()));
        }
        if name.chars().count() < 3 {
            return Err(AuthError::NameTooShort);
        }
        self.issue(name, Role::User)
    }

    fn issue(&self, name: &str, role: Role) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: name.to_string(),
            role,
            iat: now,
            exp: now + self.config.token_lifetime.as_secs() as i64,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, name: name.to_string(), role })
    }
}

impl TokenVerifier for JwtAuthority {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(Identity { name: data.claims.sub, role: data.claims.role })
    }
}

impl std::fmt::Debug for JwtAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthority")
            .field("admin_username", &self.config.admin_username)
            .field("token_lifetime", &self.config.token_lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> JwtAuthority {
        JwtAuthority::new(AuthorityConfig::new("test-secret", "operator", "hunter2"))
    }

    #[test]
    fn admin_login_round_trips() {
        let authority = authority();

        let issued = authority.login("operator", "hunter2").unwrap();
        assert_eq!(issued.role, Role::Admin);

        let identity = authority.verify(&issued.token).unwrap();
        assert_eq!(identity.name, "operator");
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let authority = authority();
        assert!(matches!(
            authority.login("operator", "nope"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            authority.login("intruder", "hunter2"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn guest_login_round_trips() {
        let authority = authority();

        let issued = authority.login_guest("alice").unwrap();
        assert_eq!(issued.role, Role::User);

        let identity = authority.verify(&issued.token).unwrap();
        assert_eq!(identity.name, "alice");
        assert_eq!(identity.role, Role::User);
    }

    #[test]
    fn guest_name_is_trimmed_before_signing() {
        let authority = authority();
        let issued = authority.login_guest("  alice  ").unwrap();
        assert_eq!(issued.name, "alice");
    }

    #[test]
    fn reserved_names_are_rejected_case_insensitively() {
        let authority = authority();
        assert!(matches!(authority.login_guest("Operator"), Err(AuthError::ReservedName(_))));
        assert!(matches!(authority.login_guest("ADMIN"), Err(AuthError::ReservedName(_))));
    }

    #[test]
    fn short_guest_names_are_rejected() {
        let authority = authority();
        assert!(matches!(authority.login_guest("ab"), Err(AuthError::NameTooShort)));
        assert!(matches!(authority.login_guest("  ab  "), Err(AuthError::NameTooShort)));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let authority = authority();
        let issued = authority.login_guest("alice").unwrap();

        let mut tampered = issued.token;
        tampered.push_str("AAAA");

        assert!(matches!(authority.verify(&tampered), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn foreign_secret_fails_verification() {
        let issuer = JwtAuthority::new(AuthorityConfig::new("other", "operator", "hunter2"));
        let issued = issuer.login_guest("alice").unwrap();

        assert!(matches!(authority().verify(&issued.token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_fails_verification() {
        let authority = authority();

        // Hand-roll a token whose lifetime already elapsed.
        let now = Utc::now().timestamp();
        let claims =
            Claims { sub: "alice".to_string(), role: Role::User, iat: now - 7200, exp: now - 3600 };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .unwrap();

        assert!(matches!(authority.verify(&token), Err(AuthError::Expired)));
    }
}

//! HTTP Basic authentication of webhook deliveries.
//!
//! Spinnaker echo is configured with a username and password for the audit
//! webhook and sends them on every delivery as `Authorization: Basic ...`.
//! Verification is a plain equality check against the configured pair; there
//! is no rate limiting and no constant-time comparison.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::errors::AuthError;

/// The username/password pair echo must present.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Verifies `Authorization` header values against fixed [`Credentials`].
#[derive(Debug, Clone)]
pub struct BasicAuthenticator {
    credentials: Credentials,
}

impl BasicAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Succeeds iff `authorization` is `Basic <base64(user:pass)>` with the
    /// configured username and password.
    ///
    /// An absent header should be passed as the empty string.
    pub fn verify(&self, authorization: &str) -> Result<(), AuthError> {
        let (username, password) = decode_basic(authorization).map_err(|reason| {
            tracing::debug!(reason, "Rejecting malformed Authorization header");
            AuthError
        })?;

        if username == self.credentials.username && password == self.credentials.password {
            Ok(())
        } else {
            tracing::debug!(username = %username, "Rejecting unknown Basic credentials");
            Err(AuthError)
        }
    }
}

/// Splits a Basic header value into `(username, password)` on the first `:`.
fn decode_basic(header: &str) -> Result<(String, String), &'static str> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or("missing 'Basic ' prefix")?;
    let decoded = STANDARD.decode(encoded).map_err(|_| "invalid base64")?;
    let decoded = String::from_utf8(decoded).map_err(|_| "invalid UTF-8")?;
    let (username, password) = decoded.split_once(':').ok_or("missing ':' separator")?;
    Ok((username.to_string(), password.to_string()))
}

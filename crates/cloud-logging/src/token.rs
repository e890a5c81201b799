//! OAuth2 access tokens for the Cloud Logging API.
//!
//! Three sources are supported:
//!
//! - [`ServiceAccountTokenSource`]: a service-account key file, exchanged for
//!   a token with the JWT-bearer grant. Used when `CREDENTIALS_PATH` is set.
//! - [`MetadataServerTokenSource`]: the runtime service account of a Cloud
//!   Function / Cloud Run / GCE instance.
//! - [`StaticTokenSource`]: a fixed token, for local runs against a proxy.
//!
//! Fetching sources should be wrapped in [`CachedTokenSource`] so a token is
//! reused until shortly before it expires.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use audit::SinkError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// OAuth scope required to write log entries.
pub const LOGGING_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/logging.write";

/// Metadata-server endpoint for the default service account's token.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for service-account assertions (the maximum Google accepts).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// A bearer token and how long it remains valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Supplies bearer tokens for Cloud Logging requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<AccessToken, SinkError>;
}

/// Standard OAuth2 token response, shared by the metadata server and the
/// Google token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl From<TokenResponse> for AccessToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            value: response.access_token,
            expires_in: Duration::from_secs(response.expires_in),
        }
    }
}

async fn read_token_response(response: reqwest::Response) -> Result<AccessToken, SinkError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SinkError::Credentials(format!(
            "token endpoint returned {status}: {body}"
        )));
    }
    response
        .json::<TokenResponse>()
        .await
        .map(AccessToken::from)
        .map_err(|e| SinkError::Credentials(format!("invalid token response: {e}")))
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// Lifetime reported for static tokens.
const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<AccessToken, SinkError> {
        Ok(AccessToken {
            value: self.token.clone(),
            expires_in: STATIC_TOKEN_LIFETIME,
        })
    }
}

// ---------------------------------------------------------------------------
// Metadata server
// ---------------------------------------------------------------------------

/// Fetches the runtime service account's token from the metadata server.
#[derive(Debug, Clone)]
pub struct MetadataServerTokenSource {
    client: reqwest::Client,
    url: String,
}

impl MetadataServerTokenSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, METADATA_TOKEN_URL)
    }

    /// Uses a non-default metadata endpoint (emulators, tests).
    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataServerTokenSource {
    async fn token(&self) -> Result<AccessToken, SinkError> {
        tracing::debug!(url = %self.url, "Fetching access token from metadata server");
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SinkError::Credentials(format!("metadata server unreachable: {e}")))?;
        read_token_response(response).await
    }
}

// ---------------------------------------------------------------------------
// Service account key
// ---------------------------------------------------------------------------

/// The fields of a service-account JSON key file that are needed to mint tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Exchanges an RS256-signed assertion for an access token.
pub struct ServiceAccountTokenSource {
    client: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
}

impl ServiceAccountTokenSource {
    /// Parses a key and prepares its signing key.
    pub fn new(client: reqwest::Client, key: ServiceAccountKey) -> Result<Self, SinkError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SinkError::Credentials(format!("invalid service account private key: {e}")))?;
        Ok(Self {
            client,
            key,
            signing_key,
        })
    }

    /// Loads a key file as downloaded from the IAM console.
    pub fn from_file(client: reqwest::Client, path: &Path) -> Result<Self, SinkError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SinkError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            SinkError::Credentials(format!("{} is not a service account key: {e}", path.display()))
        })?;
        Self::new(client, key)
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self) -> Result<String, SinkError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: LOGGING_WRITE_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| SinkError::Credentials(format!("cannot sign assertion: {e}")))
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<AccessToken, SinkError> {
        let assertion = self.assertion()?;
        tracing::debug!(
            client_email = %self.key.client_email,
            token_uri = %self.key.token_uri,
            "Exchanging service account assertion for access token"
        );
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SinkError::Credentials(format!("token endpoint unreachable: {e}")))?;
        read_token_response(response).await
    }
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Reuses the inner source's token until [`EXPIRY_MARGIN`] before expiry.
pub struct CachedTokenSource<S> {
    inner: S,
    cached: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> CachedTokenSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for CachedTokenSource<S> {
    async fn token(&self) -> Result<AccessToken, SinkError> {
        let mut cached = self.cached.lock().await;
        let now = Instant::now();

        if let Some(token) = cached.as_ref().filter(|t| t.refresh_at > now) {
            return Ok(AccessToken {
                value: token.value.clone(),
                expires_in: token.refresh_at - now,
            });
        }

        let fresh = self.inner.token().await?;
        let lifetime = fresh.expires_in.saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: fresh.value.clone(),
            refresh_at: now.checked_add(lifetime).unwrap_or(now),
        });
        Ok(fresh)
    }
}

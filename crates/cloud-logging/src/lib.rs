//! Audit sink infrastructure adapters.
//!
//! Implements the [`audit::AuditSink`] port twice:
//!
//! - [`CloudLoggingSink`]: writes entries through the Cloud Logging REST API
//!   (`POST /v2/entries:write`) under the `cloud_function` monitored resource,
//!   authenticating with a [`TokenSource`].
//! - [`StdoutSink`]: prints JSON lines for runtimes that ingest structured
//!   stdout, and for local development.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, OAuth token minting and caching, and
//! the Cloud Logging wire format all live here. The [`audit`] crate sees only
//! [`audit::AuditSink`].

pub mod api;
pub mod stdout;
pub mod token;

pub use api::{CloudLoggingSettings, CloudLoggingSink, DEFAULT_ENDPOINT};
pub use stdout::StdoutSink;
pub use token::{
    AccessToken, CachedTokenSource, MetadataServerTokenSource, ServiceAccountKey,
    ServiceAccountTokenSource, StaticTokenSource, TokenSource, LOGGING_WRITE_SCOPE,
    METADATA_TOKEN_URL,
};

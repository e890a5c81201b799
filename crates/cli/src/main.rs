//! Spinnaker audit log entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: read `config.json` and validate it.
//! 2. **Wire observability**: JSON `tracing` output, plus OTLP export when
//!    `--otlp-endpoint` is set.
//! 3. **Construct the sink**: Cloud Logging (service-account key or metadata
//!    server credentials) or structured stdout.
//! 4. **Serve**: bind the webhook router and run until Ctrl-C or SIGTERM.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use audit::{AuditSink, BasicAuthenticator};
use clap::Parser;
use cloud_logging::{
    CachedTokenSource, CloudLoggingSettings, CloudLoggingSink, MetadataServerTokenSource,
    ServiceAccountTokenSource, StdoutSink, TokenSource,
};
use listener::WebhookState;
use tokio::net::TcpListener;

mod config;
mod observability;

use config::{AuditConfig, SinkKind, ValidatedConfig};

/// Receives Spinnaker echo webhooks and writes audit entries to Cloud Logging.
#[derive(Debug, Parser)]
#[command(name = "spinnaker-audit-log", version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "SPINNAKER_AUDIT_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// OTLP gRPC endpoint for span export (e.g. http://localhost:4317).
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = observability::init(args.otlp_endpoint.as_deref())?;

    let config = AuditConfig::load(&args.config)
        .and_then(AuditConfig::validate)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    tracing::info!(
        path = %args.config.display(),
        sink = ?config.sink,
        log_name = %config.log_name,
        timezone = %config.timezone,
        "Configuration loaded"
    );

    let sink = build_sink(&config)?;
    let state = WebhookState::new(
        BasicAuthenticator::new(config.credentials.clone()),
        config.timezone,
        sink,
    )
    .with_payload_logging(config.log_request_payloads);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let tcp = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    listener::serve(tcp, listener::router(state), shutdown_signal())
        .await
        .context("serving webhook listener")
}

fn build_sink(config: &ValidatedConfig) -> anyhow::Result<Arc<dyn AuditSink>> {
    match config.sink {
        SinkKind::Stdout => Ok(Arc::new(StdoutSink::new(config.log_name.clone()))),
        SinkKind::CloudLogging => {
            let project_id = config
                .project_id
                .clone()
                .context("PROJECT_ID is required for the cloud-logging sink")?;
            let client = reqwest::Client::builder()
                .user_agent(concat!("spinnaker-audit-log/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("building HTTP client")?;

            let tokens: Arc<dyn TokenSource> = match &config.credentials_path {
                Some(path) => {
                    let source = ServiceAccountTokenSource::from_file(client.clone(), path)
                        .context("loading service account credentials")?;
                    tracing::info!(client_email = source.client_email(), "Using service account key");
                    Arc::new(CachedTokenSource::new(source))
                }
                None => {
                    tracing::info!("Using metadata server credentials");
                    Arc::new(CachedTokenSource::new(MetadataServerTokenSource::new(
                        client.clone(),
                    )))
                }
            };

            let mut settings = CloudLoggingSettings::new(project_id, config.log_name.clone());
            if let Some(endpoint) = &config.logging_endpoint {
                settings.endpoint = endpoint.trim_end_matches('/').to_string();
            }
            let sink = CloudLoggingSink::new(client, settings, tokens);
            tracing::info!(
                log = %sink.settings().log_resource_name(),
                endpoint = %sink.settings().endpoint,
                "Writing audit entries to Cloud Logging"
            );
            Ok(Arc::new(sink))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

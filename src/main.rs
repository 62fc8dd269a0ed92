//! lxcfs admission webhook server
//!
//! Serves the Pod mutation endpoint over HTTPS, with a plain liveness
//! probe alongside. TLS material is provisioned externally and mounted at
//! the paths given on the command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lxcfs_admission_webhook::policy::PolicyConfig;
use lxcfs_admission_webhook::template::InjectionTemplate;
use lxcfs_admission_webhook::webhook::{self, WebhookState};

/// Mutating admission webhook that injects lxcfs volumes into Pods
#[derive(Parser, Debug)]
#[command(name = "lxcfs-admission-webhook", version, about, long_about = None)]
struct Cli {
    /// Webhook server port
    #[arg(long, default_value_t = 8443)]
    port: u16,

    /// File containing the x509 certificate for HTTPS
    #[arg(long, default_value = "/etc/webhook/certs/tls.crt")]
    tls_cert_file: PathBuf,

    /// File containing the x509 private key matching the certificate
    #[arg(long, default_value = "/etc/webhook/certs/tls.key")]
    tls_key_file: PathBuf,

    /// YAML file with the volumes and volume mounts to inject
    /// (defaults to the built-in lxcfs template)
    #[arg(long)]
    template_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let template = match &cli.template_file {
        Some(path) => {
            info!(path = %path.display(), "loading injection template");
            InjectionTemplate::from_yaml_file(path)?
        }
        None => InjectionTemplate::lxcfs(),
    };
    info!(
        mounts = template.volume_mounts.len(),
        volumes = template.volumes.len(),
        "injection template ready"
    );

    let state = Arc::new(WebhookState {
        policy: PolicyConfig::default(),
        template,
    });
    let app = webhook::router(state);

    let tls = RustlsConfig::from_pem_file(&cli.tls_cert_file, &cli.tls_key_file)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS key pair: {e}"))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!(%addr, "starting admission webhook server");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("webhook server stopped");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then drain in-flight admission requests.
async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight requests");
    handle.graceful_shutdown(Some(Duration::from_secs(30)));
}

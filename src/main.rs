//! contrail-init - node identity and certificate bootstrap

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use contrail_init::bootstrap::Bootstrapper;
use contrail_init::cluster::KubeClusterApi;
use contrail_init::config::BootstrapArgs;
use contrail_init::network::NetworkIdentityResolver;
use contrail_init::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let args = BootstrapArgs::parse();
    init_telemetry(&TelemetryConfig::with_format(args.log_format))?;

    if let Err(e) = run(args).await {
        error!(error = %e, "bootstrap failed");
        return Err(e);
    }
    Ok(())
}

async fn run(args: BootstrapArgs) -> anyhow::Result<()> {
    // Resolve the service kind first so a bad label fails before any work
    let config = args.bootstrap_config()?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let api = Arc::new(KubeClusterApi::new(client, args.namespace.clone()));

    let resolver = NetworkIdentityResolver::system()
        .with_route_table(args.route_table.clone())
        .with_gateway_override(args.gateway);

    let report = Bootstrapper::new(api, config)
        .run(&resolver, &cancel)
        .await?;

    info!(
        host = %report.identity.hostname,
        interface = %report.identity.interface_name,
        secret = %report.credentials.secret_name,
        config_map = report.config_map.as_deref().unwrap_or("-"),
        "node bootstrap finished"
    );
    Ok(())
}

/// Cancel `token` on ctrl-c or SIGTERM
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}

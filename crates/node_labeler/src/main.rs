//! Node resource labeler
//!
//! Usage:
//!     node-labeler --kubenode 0000e45f012a1f42.ws-rpi --manifest /etc/waggle/node-manifest-v2.json

use anyhow::Context;
use clap::Parser;
use node_labeler::{ClusterLabelSync, KubeNodeApi, LabelerArgs};
use node_labeler_logging::{init_logging, LogConfig};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = LabelerArgs::parse();

    let _log_guard = init_logging(LogConfig {
        app_name: "node-labeler",
        debug: args.debug,
        log_dir: args.log_dir.clone(),
    })?;

    let kube_config = args
        .kube_config()
        .context("Failed to resolve cluster API configuration")?;
    tracing::info!("Cluster API: {}", kube_config.server);
    let api = KubeNodeApi::new(kube_config).context("Failed to create cluster API client")?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        wait_for_termination().await;
        let _ = shutdown_tx.send(()).await;
    });

    let sync = ClusterLabelSync::new(args.sync_config(), api, args.probe_source());
    sync.run(shutdown_rx).await?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", err);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

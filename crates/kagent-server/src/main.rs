//! kagent-server: WebSocket tool server for Kubernetes diagnosis.
//!
//! Exposes a fixed catalog of read-only cluster-inspection tools over a
//! persistent streaming transport. Each connection gets its own session;
//! sessions share nothing but the immutable tool registry and the cluster
//! client's connection pool.

mod connection;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use kagent_cluster::{build_registry, ClusterAdapter};

use crate::connection::handle_connection;
use crate::session::SessionManager;

#[derive(Parser)]
#[command(name = "kagent-server", about = "Kubernetes diagnostic tool server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:5001")]
    listen: String,

    /// Path to a kubeconfig file. Defaults to in-cluster config or
    /// ~/.kube/config, whichever resolves.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Per-call timeout budget in seconds, cumulative across retries.
    #[arg(long, default_value_t = 30)]
    call_timeout: u64,

    /// How long to wait for a client's hello frame, in seconds.
    #[arg(long, default_value_t = 10)]
    hello_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kagent_server=info,kagent_cluster=info".into()),
        )
        .init();

    let args = Args::parse();

    let client = cluster_client(args.kubeconfig.as_ref()).await;
    let registry = build_registry(client).expect("tool registration failed");
    tracing::info!(tools = registry.len(), "Tool registry built");

    let manager = Arc::new(SessionManager::new(
        Arc::new(registry),
        Arc::new(ClusterAdapter::default()),
        Duration::from_secs(args.call_timeout),
    ));
    let hello_timeout = Duration::from_secs(args.hello_timeout);

    let listener = TcpListener::bind(&args.listen)
        .await
        .expect("failed to bind TCP listener");

    tracing::info!("kagent-server listening on {}", args.listen);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, manager, hello_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Build the cluster client from an explicit kubeconfig path or the ambient
/// default (in-cluster service account, then ~/.kube/config).
async fn cluster_client(kubeconfig: Option<&PathBuf>) -> Client {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).expect("failed to read kubeconfig");
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .expect("failed to load kubeconfig");
            Client::try_from(config).expect("failed to build cluster client")
        }
        None => Client::try_default()
            .await
            .expect("failed to build cluster client"),
    }
}

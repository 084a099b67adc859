//! kwait
//!
//! Blocks until Kubernetes resources reach a condition, then exits 0.
//! Exits non-zero on timeout, unknown kind, API failure or Ctrl-C.
//!
//! Examples:
//!   kwait pod -n web -l app=web --ready --timeout 2m
//!   kwait resource --group apps --kind Deployment --name api --field status.readyReplicas=3

mod command;
mod condition;
mod config;
mod error;

use crate::config::Args;
use crate::error::CliError;
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use kube_wait::ResourceWaiter;
use kube_wait::kubeconfig::{default_cache_dir, kubeconfig_path};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // kube's rustls transport needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting kwait");
    info!("Configuration:");
    info!("  Namespace: {}", args.namespace().unwrap_or("all namespaces"));
    info!("  Timeout: {}", humantime::format_duration(args.timeout));
    info!("  Kubeconfig: {}", if args.kubeconfig_content.is_some() { "KUBECONFIG_CONTENT" } else { "default" });

    let client = build_client(&args).await?;
    let waiter = ResourceWaiter::from_client(client);

    // Dropping the wait future on Ctrl-C closes the watch connection
    tokio::select! {
        result = command::run(&waiter, &args) => {
            println!("{}", result?);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before the condition was met");
            return Err(CliError::Interrupted);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Client from KUBECONFIG_CONTENT if given, otherwise the default kubeconfig/in-cluster config
async fn build_client(args: &Args) -> Result<Client, CliError> {
    let Some(content) = args.kubeconfig_content.as_deref() else {
        return Ok(Client::try_default().await?);
    };

    let cache_dir = default_cache_dir().ok_or_else(|| {
        CliError::Config("cannot locate home directory for the kubeconfig cache".to_string())
    })?;
    let path = kubeconfig_path(content, &cache_dir)?;
    info!("Using kubeconfig {:?}", path);

    let kubeconfig = Kubeconfig::read_from(&path)
        .map_err(|e| CliError::Config(format!("Failed to read kubeconfig: {}", e)))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| CliError::Config(format!("Failed to load kubeconfig: {}", e)))?;
    Ok(Client::try_from(config)?)
}

//! Service registrar binary
//!
//! Registers one service instance, keeps it alive until Ctrl+C or SIGTERM,
//! then removes it.

use anyhow::{Context, Result};
use clap::Parser;
use service_registrar::{
    MemoryStore, Registrar, RegistrarConfig, ServiceDescriptor, REGISTRAR_VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "service-registrar")]
#[command(about = "Register a service instance in etcd and keep it alive")]
#[command(version = REGISTRAR_VERSION)]
struct Cli {
    /// Service name
    #[arg(long)]
    name: String,

    /// Address to advertise; resolved from the local network when omitted
    #[arg(long, default_value = "")]
    address: String,

    /// Service port
    #[arg(long)]
    port: u16,

    /// Service metadata as key=value (repeatable)
    #[arg(long = "meta", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,

    /// Configuration file path
    #[arg(
        short,
        long,
        env = "REGISTRAR_CONFIG_PATH",
        default_value = "config/registrar.toml"
    )]
    config: PathBuf,

    /// etcd endpoints, comma separated
    #[arg(long, value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Lease TTL in seconds
    #[arg(long)]
    lease_ttl: Option<u64>,

    /// Renewal interval in seconds
    #[arg(long)]
    renewal_interval: Option<u64>,

    /// Key prefix
    #[arg(long)]
    key_prefix: Option<String>,

    /// Publish to an in-process store instead of etcd
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting service registrar v{}", REGISTRAR_VERSION);

    let config = load_config(&cli)?;
    info!(
        "Configuration loaded (endpoints: {:?}, lease ttl: {}s, renewal interval: {}s)",
        config.endpoints, config.lease_ttl_secs, config.renewal_interval_secs
    );

    let mut registrar = if cli.dry_run {
        warn!("Dry run: publishing to an in-process store");
        Registrar::with_store(config, Arc::new(MemoryStore::new()))?
    } else {
        Registrar::connect(config)
            .await
            .context("failed to connect to the coordination store")?
    };

    let mut descriptor = ServiceDescriptor::new(cli.name, cli.address, cli.port);
    for (key, value) in cli.metadata {
        descriptor = descriptor.with_metadata(key, value);
    }

    registrar
        .register(descriptor)
        .await
        .context("failed to register service")?;

    shutdown_signal().await;

    if let Err(e) = registrar.unregister().await {
        error!("Unregister failed: {}", e);
        return Err(e.into());
    }

    info!("Service registrar shutdown completed");
    Ok(())
}

/// Load configuration from file, then environment, then command line
fn load_config(cli: &Cli) -> Result<RegistrarConfig> {
    let mut config = read_config_file(&cli.config)?;

    if let Ok(endpoints) = std::env::var("REGISTRAR_ENDPOINTS") {
        config.endpoints = split_endpoints(&endpoints);
    }
    if let Ok(ttl) = std::env::var("REGISTRAR_LEASE_TTL_SECS") {
        config.lease_ttl_secs = ttl
            .parse()
            .with_context(|| format!("invalid REGISTRAR_LEASE_TTL_SECS: {}", ttl))?;
    }
    if let Ok(interval) = std::env::var("REGISTRAR_RENEWAL_INTERVAL_SECS") {
        config.renewal_interval_secs = interval
            .parse()
            .with_context(|| format!("invalid REGISTRAR_RENEWAL_INTERVAL_SECS: {}", interval))?;
    }
    if let Ok(prefix) = std::env::var("REGISTRAR_KEY_PREFIX") {
        config.key_prefix = prefix;
    }

    if !cli.endpoints.is_empty() {
        config.endpoints = cli.endpoints.clone();
    }
    if let Some(ttl) = cli.lease_ttl {
        config.lease_ttl_secs = ttl;
    }
    if let Some(interval) = cli.renewal_interval {
        config.renewal_interval_secs = interval;
    }
    if let Some(prefix) = &cli.key_prefix {
        config.key_prefix = prefix.clone();
    }

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<RegistrarConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display())),
        Err(_) => {
            info!("No config file at {}, using defaults", path.display());
            Ok(RegistrarConfig::default())
        }
    }
}

fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("zone=eu-1").unwrap(),
            ("zone".to_string(), "eu-1".to_string())
        );
        assert_eq!(
            parse_key_value("url=http://a/b?c=d").unwrap(),
            ("url".to_string(), "http://a/b?c=d".to_string())
        );
        assert!(parse_key_value("zone").is_err());
        assert!(parse_key_value("=eu-1").is_err());
    }

    #[test]
    fn test_split_endpoints() {
        assert_eq!(
            split_endpoints("http://etcd-0:2379, http://etcd-1:2379,"),
            vec!["http://etcd-0:2379", "http://etcd-1:2379"]
        );
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "service-registrar",
            "--name",
            "order-svc",
            "--port",
            "8080",
            "--config",
            "/nonexistent/registrar.toml",
            "--endpoints",
            "http://etcd-0:2379,http://etcd-1:2379",
            "--lease-ttl",
            "30",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.lease_ttl_secs, 30);
        assert_eq!(cli.address, "");
        assert!(cli.metadata.is_empty());
    }
}

//! `notifyd` binary: loads configuration and a zones file, spawns the
//! dispatcher worker, exposes its metrics/health endpoints, and runs until
//! interrupted.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use notifyd::config::NotifyConfig;
use notifyd::dispatch::{
    CounterStore, Dispatcher, InMemoryCounterStore, SystemClock, TokioSocketFactory, ZoneKey,
};
use notifyd::http_server::HttpServer;
use notifyd::metrics::NotifyMetrics;
use notifyd::wire::RRClass;
use notifyd::zone::{InMemoryZoneDataSource, SecondaryEndpoint};

/// Outbound DNS NOTIFY dispatcher.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the notifyd TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the zones TOML file describing served zones and their
    /// statically configured secondaries.
    #[arg(short, long, default_value = "zones.toml")]
    zones: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ZonesFile {
    #[serde(default, rename = "zone")]
    zones: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    name: String,
    #[serde(default = "default_class")]
    class: String,
    /// `also-notify`-style statically configured secondaries, as `ip` or
    /// `ip:port` (bracketed for IPv6, e.g. `[2001:db8::1]:5353`).
    #[serde(default)]
    secondaries: Vec<String>,
}

fn default_class() -> String {
    "IN".to_string()
}

/// Parses a secondary address of the form `ip`, `ip:port`, or the bracketed
/// IPv6 forms `[ip]` / `[ip]:port`. Port defaults to 53.
fn parse_secondary(raw: &str) -> Option<SecondaryEndpoint> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (ip, remainder) = rest.split_once(']')?;
        return match remainder.strip_prefix(':') {
            Some(port) => Some(SecondaryEndpoint::with_port(ip, port.parse().ok()?)),
            None => Some(SecondaryEndpoint::new(ip)),
        };
    }

    // A bare (unbracketed) address with exactly one colon is `ip:port`;
    // zero or more-than-one colons mean a plain IPv4 or IPv6 literal.
    match raw.matches(':').count() {
        1 => {
            let (ip, port) = raw.split_once(':')?;
            Some(SecondaryEndpoint::with_port(ip, port.parse().ok()?))
        }
        _ => Some(SecondaryEndpoint::new(raw)),
    }
}

/// Loads the zones file, returning the data source fed with statically
/// configured secondaries and the set of zone keys notifyd will accept
/// `send_notify` calls for. A missing or malformed file degrades to an
/// empty configuration rather than failing the binary (operators can still
/// bring it up and fix the file without a restart loop).
fn load_zones(path: &std::path::Path) -> (InMemoryZoneDataSource, HashSet<ZoneKey>) {
    let source = InMemoryZoneDataSource::new();
    let mut configured = HashSet::new();

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            error!(path = %path.display(), %err, "failed to read zones file, serving zero zones");
            return (source, configured);
        }
    };

    let file: ZonesFile = match toml::from_str(&contents) {
        Ok(file) => file,
        Err(err) => {
            error!(path = %path.display(), %err, "failed to parse zones file, serving zero zones");
            return (source, configured);
        }
    };

    for entry in file.zones {
        let class: RRClass = entry.class.parse().unwrap_or_else(|_| {
            error!(zone = %entry.name, class = %entry.class, "unknown class, defaulting to IN");
            RRClass::IN
        });

        for raw in &entry.secondaries {
            match parse_secondary(raw) {
                Some(secondary) => source.add_configured_secondary(&entry.name, class, secondary),
                None => {
                    error!(zone = %entry.name, secondary = %raw, "unparseable secondary address, skipping")
                }
            }
        }

        configured.insert(ZoneKey::new(&entry.name, class));
    }

    (source, configured)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match NotifyConfig::from_env_and_file(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let (data_source, configured_zones) = load_zones(&args.zones);
    info!(zones = configured_zones.len(), "loaded zone configuration");

    let metrics = match NotifyMetrics::new() {
        Ok(metrics) => Some(Arc::new(metrics)),
        Err(err) => {
            error!(%err, "failed to initialize metrics registry, continuing without it");
            None
        }
    };

    if let (Some(metrics), Some(bind_addr)) = (metrics.clone(), config.http_bind_addr) {
        let server = HttpServer::new(metrics, bind_addr);
        tokio::spawn(async move {
            if let Err(err) = server.run().await {
                error!(%err, "metrics HTTP server exited");
            }
        });
    }

    let sockets = Arc::new(TokioSocketFactory::new(config.source_port_range));
    let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());

    let handle = Dispatcher::spawn(
        config,
        configured_zones,
        Arc::new(data_source),
        counters,
        Arc::new(SystemClock),
        sockets,
        metrics,
    );

    info!("notifyd dispatcher running, send SIGINT to shut down");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for ctrl-c, shutting down immediately");
    }

    info!("shutdown requested");
    if let Err(err) = handle.shutdown().await {
        error!(%err, "error during dispatcher shutdown");
    }
}

//! peercache CLI: advertise this node and find page caches on the LAN.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use peercache_daemon::{setup, Config, Daemon, DaemonEvent};
use peercache_discovery::{Engine, ProbeOutcome, ResolvedService};
use peercache_protocol::{CLASS_IN, TYPE_ANY};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

#[derive(Parser)]
#[command(
    name = "peercache",
    about = "Advertise and discover page caches over multicast DNS",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this node and answer for it until interrupted.
    Advertise,

    /// List every instance of a service type that resolves.
    Browse {
        /// Service type, e.g. `_pagecache._tcp`.
        #[arg(default_value = "_pagecache._tcp")]
        service_type: String,
        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Resolve one instance to an address and port.
    Resolve {
        /// Full instance name, e.g. `attic._pagecache._tcp.local`.
        instance: String,
        #[arg(long)]
        json: bool,
    },

    /// Check whether a name is already claimed on the network.
    Probe {
        /// Name to probe, e.g. `attic.local`.
        name: String,
    },

    /// Print the effective configuration.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise start at info and switch to the configured level
    let from_env = EnvFilter::try_from_default_env().ok();
    let use_config_level = from_env.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = setup::load_config(cli.config.as_deref())?;
    if use_config_level {
        filter_handle
            .reload(EnvFilter::new(&config.log.level))
            .context("failed to apply log level")?;
    }

    match cli.command {
        Commands::Advertise => advertise(&config, cli.config.as_deref()).await,
        Commands::Browse { service_type, json } => {
            let mut engine = started_engine(&config)?;
            let found = engine.browse_service_instances(&service_type).await;
            engine.stop();
            let found = found?;
            if found.is_empty() && !json {
                println!("no instances of {service_type} found");
            }
            for service in &found {
                print_service(service, json)?;
            }
            Ok(())
        }
        Commands::Resolve { instance, json } => {
            let mut engine = started_engine(&config)?;
            let resolved = engine.resolve_service(&instance).await;
            engine.stop();
            print_service(&resolved?, json)
        }
        Commands::Probe { name } => {
            let mut engine = started_engine(&config)?;
            let outcome = engine.issue_probe(&name, TYPE_ANY, CLASS_IN).await;
            engine.stop();
            match outcome? {
                ProbeOutcome::Free => println!("{name} is free"),
                ProbeOutcome::Taken => println!("{name} is taken"),
            }
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn started_engine(config: &Config) -> anyhow::Result<Engine> {
    let mut engine = Engine::new(config.discovery.clone());
    engine.start().context("failed to start discovery")?;
    Ok(engine)
}

async fn advertise(config: &Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config_dir = config_path
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(setup::config_dir, Path::to_path_buf);
    let node_id = setup::load_or_create_node_id(&config_dir)?;

    let mut daemon = Daemon::new(config, node_id);
    let events = daemon.event_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            let _ = events.send(DaemonEvent::Shutdown).await;
        }
    });

    let advert = daemon.advert();
    println!(
        "advertising {} on {}:{}",
        advert.srv_name(),
        advert.host,
        advert.port
    );
    daemon.run().await?;
    Ok(())
}

fn print_service(service: &ResolvedService, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(service)?);
    } else {
        println!(
            "{}\t{}:{}\t({})",
            service.friendly_name, service.ip_address, service.port, service.domain_name
        );
    }
    Ok(())
}

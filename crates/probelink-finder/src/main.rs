//! Probelink CLI entry point.
//!
//! Wires the real UDP transport into the application use cases and prints
//! results as text or JSON.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ UdpTransport          -- real sockets (infrastructure)
//!       ├─ find      -- ProbeFinder pipeline, TCP-confirmed when speculative
//!       ├─ identify  -- unicast wildcard query
//!       ├─ discover  -- broadcast sweep, streamed as replies arrive
//!       └─ listen    -- responder thread until Ctrl-C
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use probelink_core::{Identifier, DISCOVERY_PORT};
use probelink_finder::application::discover::discover;
use probelink_finder::application::find::ProbeFinder;
use probelink_finder::application::identify::identify;
use probelink_finder::application::{FoundProbe, Protocol};
use probelink_finder::infrastructure::network::responder::Responder;
use probelink_finder::infrastructure::network::tcp::confirm_tcp;
use probelink_finder::infrastructure::network::transport::UdpTransport;
use probelink_finder::FinderConfig;

#[derive(Parser)]
#[command(name = "probelink", about = "Locate hardware debug probes on the network")]
struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Overall time budget in seconds.
    #[arg(long, global = true, default_value_t = 3.0)]
    timeout: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an identifier (e.g. "sp71", "DA-net 35") to an address.
    Find {
        identifier: Identifier,
        /// Address or hostname to try first.
        #[arg(long)]
        hint: Option<String>,
    },
    /// Ask the device at an address who it is.
    Identify { ip: Ipv4Addr },
    /// List every probe answering a broadcast query.
    Discover,
    /// Advertise a probe from this host until interrupted.
    Listen {
        identifier: Identifier,
        /// UDP port to answer on.
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs_f64(cli.timeout);
    let config = FinderConfig { default_timeout: timeout, ..FinderConfig::default() };
    let transport = Arc::new(UdpTransport::new(config.clone()));

    match cli.command {
        Command::Find { identifier, hint } => {
            let finder = ProbeFinder::new(Arc::clone(&transport), config.clone());
            let found = finder.find(&identifier, hint.as_deref(), timeout).await?;
            if found.protocol == Protocol::Tcp {
                // Speculative result: prove something listens before
                // reporting it.
                let ok = confirm_tcp(found.ip, config.control_port, timeout).await;
                if !ok {
                    bail!("device {identifier} not found: silent on UDP and port {} closed at {}",
                        config.control_port, found.ip);
                }
            }
            print_probe(&found, cli.json)?;
        }
        Command::Identify { ip } => {
            let identifier = identify(transport.as_ref(), &config, ip, timeout).await?;
            if cli.json {
                println!("{}", serde_json::to_string(&identifier)?);
            } else {
                println!("{identifier}");
            }
        }
        Command::Discover => {
            let mut rx = discover(transport, timeout);
            let mut count = 0usize;
            while let Some(probe) = rx.recv().await {
                print_probe(&probe, cli.json)?;
                count += 1;
            }
            info!("discovery finished: {count} probe(s)");
        }
        Command::Listen { identifier, port } => {
            let running = Arc::new(AtomicBool::new(true));
            let responder = Responder::start(
                identifier,
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
                Arc::clone(&running),
            )
            .context("failed to start responder")?;
            println!(
                "advertising {} on UDP {} (Ctrl-C to stop)",
                responder.identifier(),
                responder.local_addr()
            );
            tokio::signal::ctrl_c().await?;
            running.store(false, Ordering::Relaxed);
        }
    }

    Ok(())
}

fn print_probe(probe: &FoundProbe, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(probe)?);
    } else {
        println!("{} at {} ({})", probe.identifier, probe.ip, probe.protocol);
    }
    Ok(())
}

//! SIP load balancer.
//!
//! A dialog-aware UDP load balancer built with Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌───────────────────────────────────────────────────────┐
//!                          │                     SIP BALANCER                       │
//!                          │                                                        │
//!     Access peer          │  ┌──────────┐   ┌─────────┐   ┌──────────────────┐     │
//!     ─────────────────────┼─▶│   net    │──▶│ workers │──▶│   sip parser     │     │
//!                          │  │ listener │   │ (shard  │   └────────┬─────────┘     │
//!                          │  └──────────┘   │ by id)  │            │               │
//!                          │                 └─────────┘            ▼               │
//!                          │                               ┌──────────────────┐     │
//!                          │        ┌──────────────┐       │   dialog cache   │     │
//!                          │        │ load_balancer│◀──────│  (timers, Via    │     │
//!                          │        │  + limiter   │       │   rewrite)       │     │
//!                          │        └──────────────┘       └────────┬─────────┘     │
//!                          │                                        │               │
//!     Access peer          │                                        ▼               │
//!     ◀────────────────────┼────────────── next hop (symmetric) ────┴───────────────┼──▶ Core node
//!                          │                                                        │
//!                          │  ┌──────────────────────────────────────────────────┐  │
//!                          │  │              Cross-Cutting Concerns               │  │
//!                          │  │  ┌────────┐ ┌─────────┐ ┌────────────┐ ┌───────┐  │  │
//!                          │  │  │ config │ │ health  │ │observabil- │ │ admin │  │  │
//!                          │  │  │        │ │ probes  │ │ity         │ │ (RO)  │  │  │
//!                          │  │  └────────┘ └─────────┘ └────────────┘ └───────┘  │  │
//!                          │  └──────────────────────────────────────────────────┘  │
//!                          └───────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use sip_balancer::admin::{self, AdminState};
use sip_balancer::config::load_config;
use sip_balancer::lifecycle::{signals, Balancer, Shutdown};
use sip_balancer::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "sip-balancer", version, about = "Dialog-aware SIP UDP load balancer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "SLB_CONFIG", default_value = "sip-balancer.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging("info");
            tracing::error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability.log_level);
    logging::install_panic_hook();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "sip-balancer starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let balancer = Balancer::start(config, &shutdown).await?;

    let admin_config = &balancer.config().admin;
    let admin_task = if admin_config.enabled {
        match admin_config.bind_address.parse::<SocketAddr>() {
            Ok(addr) => {
                let state = AdminState::from_balancer(&balancer);
                let rx = shutdown.subscribe();
                Some(tokio::spawn(async move {
                    if let Err(e) = admin::serve(state, addr, rx).await {
                        tracing::error!(error = %e, "Admin API failed");
                    }
                }))
            }
            Err(_) => {
                tracing::error!(bind_address = %admin_config.bind_address, "Failed to parse admin address");
                None
            }
        }
    } else {
        None
    };

    signals::wait_for_signal(shutdown.clone()).await;

    balancer.join().await;
    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

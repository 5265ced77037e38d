use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;

use overnet_node::config::RouterConfig;
use overnet_node::substrate::UdpLinkSubstrate;
use overnet_node::logging;
use overnet_router::{Forwarder, Router, RouterState, SharedTable};

#[derive(Parser)]
#[command(name = "overnet-node", about = "Overlay router node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/overnet/node.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_auto("info");

    let config = match RouterConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("node failed: {e}");
        std::process::exit(1);
    }
}

async fn run(config: RouterConfig) -> Result<(), overnet_node::NodeError> {
    let my_adr = config.my_adr()?;
    let prefixes = config.prefixes()?;
    let neighbor_links = config.neighbor_links()?;
    let substrate = UdpLinkSubstrate::bind(config.bind_addr()?, config.neighbor_addrs()?).await?;

    let table = SharedTable::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (forwarder, source, router_link) =
        Forwarder::new(my_adr, substrate, table.clone(), shutdown_rx.clone());
    let state = RouterState::new(my_adr, prefixes, neighbor_links, config.node.failure_adverts);
    let router = Router::new(state, router_link, table, shutdown_rx);

    let forwarder_task = tokio::spawn(forwarder.run());
    let router_task = tokio::spawn(router.run());

    // Source/sink: print everything delivered, and optionally emit
    // periodic test traffic from the [source] section.
    let source = Arc::new(source);
    let sink = Arc::clone(&source);
    tokio::spawn(async move {
        while let Ok((payload, from)) = sink.receive().await {
            tracing::info!(%from, payload, "delivered");
        }
    });
    if let Some(src_cfg) = &config.source {
        let source = Arc::clone(&source);
        let dest = src_cfg.dest.clone();
        let payload = src_cfg.payload.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(src_cfg.interval_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if let Err(e) = source.send(&payload, &dest).await {
                    tracing::warn!(error = %e, "test source send failed");
                    return;
                }
            }
        });
    }

    // Run until a termination signal arrives.
    shutdown_signal().await;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = router_task.await;
    let _ = forwarder_task.await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

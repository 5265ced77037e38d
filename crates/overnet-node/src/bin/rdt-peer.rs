use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use overnet_node::logging;
use overnet_node::substrate::UdpSubstrate;
use overnet_rdt::Rdt;

#[derive(Parser)]
#[command(
    name = "rdt-peer",
    about = "Reliable transport peer: sends stdin lines, prints received lines"
)]
struct Cli {
    /// Local socket address to bind
    #[arg(long)]
    bind: SocketAddr,
    /// Peer socket address
    #[arg(long)]
    peer: SocketAddr,
    /// Sliding window size
    #[arg(long, default_value_t = 4)]
    window: u16,
    /// Retransmission timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_auto("info");

    let substrate = match UdpSubstrate::bind(cli.bind, cli.peer).await {
        Ok(sub) => sub,
        Err(e) => {
            eprintln!("failed to bind {}: {e}", cli.bind);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (rdt, handle) = Rdt::new(
        cli.window,
        Duration::from_millis(cli.timeout_ms),
        substrate,
        shutdown_rx,
    );
    let transport = tokio::spawn(rdt.run());
    let handle = Arc::new(handle);

    // Print everything the peer delivers.
    let receiver = Arc::clone(&handle);
    tokio::spawn(async move {
        while let Ok(line) = receiver.receive().await {
            println!("{line}");
        }
    });

    // Send stdin line by line until EOF or interrupt.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle.send(line).await.is_err() {
                        break;
                    }
                }
                _ => break,
            },
        }
    }

    // Ask the transport to stop; it drains the window first.
    let _ = shutdown_tx.send(true);
    let _ = transport.await;
}

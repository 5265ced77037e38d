use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use overnet_dht::{DhtServer, DhtServerConfig};
use overnet_node::logging;

#[derive(Parser)]
#[command(name = "dht-server", about = "Distributed hash table server")]
struct Cli {
    /// IP address to bind the server socket to
    my_ip: IpAddr,
    /// Maximum routing table size, typically lg of the ring size
    num_routes: usize,
    /// File the server writes its "<ip> <port>" line to
    cfg_file: PathBuf,
    /// Optional literals `cache` and `debug`, or a predecessor's
    /// configuration file to join through
    options: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            eprintln!("usage: dht-server myIp numRoutes cfgFile [ cache ] [ debug ] [ predFile ]");
            std::process::exit(1);
        }
    };

    let mut cache = false;
    let mut debug = false;
    let mut pred_file = None;
    for opt in &cli.options {
        match opt.as_str() {
            "cache" => cache = true,
            "debug" => debug = true,
            other => pred_file = Some(PathBuf::from(other)),
        }
    }
    logging::init_auto(if debug { "debug" } else { "info" });

    let config = DhtServerConfig {
        my_ip: cli.my_ip,
        num_routes: cli.num_routes,
        cfg_file: cli.cfg_file,
        cache,
        pred_file,
    };
    let server = match DhtServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to start dht server: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = server.run().await {
        tracing::error!("server failed: {e}");
        std::process::exit(1);
    }
}

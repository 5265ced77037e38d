use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use overnet_dht::client;
use overnet_node::logging;

#[derive(Parser)]
#[command(name = "dht-client", about = "One-shot distributed hash table client")]
struct Cli {
    /// IP address to bind the client socket to
    my_ip: IpAddr,
    /// Server configuration file containing "<ip> <port>"
    cfg_file: PathBuf,
    /// Operation: `get` or `put`
    operation: String,
    /// Key to look up or store
    key: String,
    /// Value to store; omit to remove the pair
    value: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            eprintln!("usage: dht-client myIp cfgFile <get|put> key [ value ]");
            std::process::exit(1);
        }
    };
    if cli.operation != "get" && cli.operation != "put" {
        eprintln!("usage: dht-client myIp cfgFile <get|put> key [ value ]");
        std::process::exit(1);
    }
    logging::init_auto("warn");

    let result = async {
        let server = client::server_addr(&cli.cfg_file)?;
        client::request(
            cli.my_ip,
            server,
            &cli.operation,
            &cli.key,
            cli.value.as_deref(),
        )
        .await
    }
    .await;

    match result {
        Ok(reply) => print!("{}", reply.emit()),
        Err(e) => {
            eprintln!("request failed: {e}");
            std::process::exit(1);
        }
    }
}

//! The `serve` command — synthetic servers driven interactively from stdin.

use std::collections::BTreeMap;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use vigil_mock::{MockServer, Mode};

pub async fn run(ports: Vec<u16>) -> anyhow::Result<()> {
    let mut servers: BTreeMap<u16, MockServer> = BTreeMap::new();
    for port in ports {
        let server = MockServer::start(port)
            .await
            .with_context(|| format!("failed to listen on port {port}"))?;
        servers.insert(server.port(), server);
    }

    print_commands();
    print_status(&servers);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(port) = args.first().and_then(|s| s.parse::<u16>().ok()) else {
            print_commands();
            continue;
        };
        let mode = match args.get(1) {
            None => Mode::Up,
            Some(s) => match s.parse::<Mode>() {
                Ok(mode) => mode,
                Err(e) => {
                    println!("{e}");
                    print_commands();
                    continue;
                }
            },
        };

        if !servers.contains_key(&port) {
            match MockServer::start(port).await {
                Ok(server) => {
                    servers.insert(port, server);
                }
                Err(e) => {
                    println!("failed to listen on port {port}: {e}");
                    continue;
                }
            }
        }
        if let Some(server) = servers.get(&port) {
            server.set_mode(mode);
        }

        print_status(&servers);
    }
    Ok(())
}

fn print_commands() {
    println!("Commands:");
    println!("  <port> [up] - handle requests to the port");
    println!("  <port> down - stop handling requests to the port");
    println!("  <port> hang - hang requests to the port");
    println!("  <port> error - fail requests to the port");
}

fn print_status(servers: &BTreeMap<u16, MockServer>) {
    println!("Server status:");
    for (port, server) in servers {
        println!("  {port} {}", server.mode());
    }
}

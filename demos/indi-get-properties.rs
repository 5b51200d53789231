//! Connect to an INDI server, send `getProperties`, and print every
//! definition that comes back for a fixed window.

use clap::Parser;
use indi_client_core::connection::ConnectionConfig;
use indi_client_core::gateway::Gateway;
use std::time::Duration;
use tracing::{debug, info};

/// INDI getProperties command line tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// INDI server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// INDI server port
    #[arg(short = 'p', long, default_value_t = indi_client_core::connection::DEFAULT_PORT)]
    port: u16,

    /// Device name to scope the request to (optional)
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// Seconds to wait for responses before exiting
    #[arg(short = 'w', long, default_value_t = 2)]
    wait: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let server_addr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ConnectionConfig {
        server_addr,
        ..Default::default()
    };

    info!(host = %args.host, port = args.port, "connecting to INDI server");
    let gateway = Gateway::start(config);
    gateway.connection(Some(Duration::from_secs(5))).await?;

    debug!(device = ?args.device, "sending getProperties");
    gateway.get_properties(args.device.as_deref()).await?;

    info!(seconds = args.wait, "waiting for responses");
    tokio::time::sleep(Duration::from_secs(args.wait)).await;

    for (device, props) in gateway.snapshot().await {
        println!("{device}");
        for (name, vec) in props {
            println!("  {name} [{:?}] state={}", vec.kind, vec.state);
        }
    }

    Ok(())
}

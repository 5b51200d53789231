//! Connect to an INDI server and print every device's current
//! properties, colorized by state.

use clap::Parser;
use colored::*;
use indi_client_core::connection::ConnectionConfig;
use indi_client_core::gateway::Gateway;
use indi_client_core::property::{PropertyState, TypedValue, VectorProperty};
use std::time::Duration;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// INDI server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// INDI server port
    #[arg(short = 'P', long, default_value_t = indi_client_core::connection::DEFAULT_PORT)]
    port: u16,

    /// Enable debug output
    #[arg(short = 'd', long)]
    debug: bool,

    /// Seconds to wait for definitions before printing
    #[arg(short = 'w', long, default_value_t = 3)]
    wait: u64,
}

fn format_state(state: PropertyState) -> ColoredString {
    match state {
        PropertyState::Idle => "Idle".yellow(),
        PropertyState::Ok => "Ok".green(),
        PropertyState::Busy => "Busy".blue(),
        PropertyState::Alert => "Alert".red(),
    }
}

fn format_value(value: &TypedValue) -> String {
    match value {
        TypedValue::Text(s) => s.clone(),
        TypedValue::Number(n) => n.to_string(),
        TypedValue::Switch(s) => s.to_string(),
        TypedValue::Light(s) => format_state(*s).to_string(),
        TypedValue::Blob { format, size, .. } => format!("[BLOB format={format} size={size}]"),
    }
}

fn print_vector(name: &str, vec: &VectorProperty) {
    println!("  {}", name.bold());
    println!("    State: {}", format_state(vec.state));
    println!("    Permissions: {}", vec.perm.to_string().cyan());
    for (item_name, value) in vec.items.iter() {
        println!("    {item_name} = {}", format_value(value));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let server_addr = format!("{}:{}", args.host, args.port).parse()?;
    info!(host = %args.host, port = args.port, "connecting to INDI server");

    let gateway = Gateway::start(ConnectionConfig {
        server_addr,
        ..Default::default()
    });
    gateway.connection(Some(Duration::from_secs(5))).await?;

    debug!("requesting all properties");
    gateway.get_properties(None).await?;
    tokio::time::sleep(Duration::from_secs(args.wait)).await;

    let snapshot = gateway.snapshot().await;
    if snapshot.is_empty() {
        println!("{}", "no devices reported".yellow());
        return Ok(());
    }

    for (device, props) in snapshot {
        println!("\n{}", format!("Device: {device}").bold());
        for (name, vec) in props {
            print_vector(&name, &vec);
        }
    }

    Ok(())
}

use std::env;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ground_station::CommandClient;
use skylink_shared::{wire, CommandType, Envelope};

fn usage() {
    println!("commands:");
    println!("  ping                  liveness check");
    println!("  guided                set the vehicle to GUIDED mode");
    println!("  abort                 land now, overriding any mission");
    println!("  demo LAT LON ALT      takeoff, fly to position, land");
    println!("  updown ALT            takeoff, land");
    println!("  scan ALT LEG J        expanding-square target sweep");
    println!("  quit");
}

/// Map one operator line onto a command envelope
fn envelope_for(line: &str) -> Result<Envelope> {
    let mut words = line.split_whitespace();
    let verb = words.next().context("empty line")?;
    let mut arg = || -> Result<f64> {
        words
            .next()
            .with_context(|| format!("`{verb}` needs more arguments"))?
            .parse::<f64>()
            .context("argument is not a number")
    };

    match verb {
        "ping" => Ok(Envelope::empty(CommandType::Ping)),
        "guided" => Ok(Envelope::empty(CommandType::SetToGuided)),
        "abort" => Ok(Envelope::empty(CommandType::AbortMission)),
        "demo" => Ok(Envelope::new(
            CommandType::DemoMission,
            json!({"lat": arg()?, "lon": arg()?, "alt": arg()?}),
        )),
        "updown" => Ok(Envelope::new(
            CommandType::UpDownMission,
            json!({"alt": arg()?}),
        )),
        "scan" => Ok(Envelope::new(
            CommandType::CoarseScanMission,
            json!({"alt": arg()?, "distance": arg()?, "j": arg()?}),
        )),
        other => anyhow::bail!("unknown command: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let host = env::var("SKYLINK_VEHICLE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let client = CommandClient::new(&host, wire::COMMAND_PORT);
    client.set_on_message(|frame| println!("<- {frame}"));
    client.set_on_close(|| warn!("Command server closed the connection"));
    client.set_on_error(|reason| warn!("Command link error: {reason}"));

    client
        .connect(true)
        .await
        .with_context(|| format!("connecting to vehicle at {host}"))?;
    println!("Connected to vehicle at {host}");
    usage();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match envelope_for(line) {
            Ok(envelope) => {
                if let Err(e) = client.send(&envelope) {
                    warn!("Send failed: {e}");
                }
            }
            Err(e) => {
                println!("{e:#}");
                usage();
            }
        }
    }

    client.close();
    Ok(())
}

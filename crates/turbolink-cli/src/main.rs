//! Command line front end for pump controllers on an RS-485 line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use turbolink_core::prelude::*;
use turbolink_core::protocol::{list_ports, SerialChannel};

#[derive(Debug, Parser)]
#[command(
    name = "turbolink",
    version,
    about = "Control turbomolecular pump controllers over RS-485",
    long_about = None
)]
struct Cli {
    /// Serial port (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long, global = true, env = "TURBOLINK_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Response timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// JSON file with port settings; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pump controller address (1-99, 99 answers from any controller)
    #[arg(short, long, global = true, default_value = "1", value_parser = parse_endpoint)]
    address: Endpoint,

    /// Talk to a simulated pump instead of a serial port
    #[arg(long, global = true)]
    demo: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show pump type, DSP version and full speed
    Info,
    /// Start the pump
    Start,
    /// Stop the pump
    Stop,
    /// Show the current rotational speed
    Speed,
    /// Show the status flags
    Status,
    /// Show or set the vent mode
    Vent {
        /// New vent mode (0-7)
        #[arg(conflicts_with = "default", value_parser = clap::value_parser!(u8).range(0..=7))]
        mode: Option<u8>,
        /// Restore the factory vent mode
        #[arg(long)]
        default: bool,
    },
    /// Show or set the timer in minutes
    Timer {
        /// New timer setting (1-30 minutes)
        #[arg(conflicts_with = "default", value_parser = clap::value_parser!(u64).range(1..=30))]
        minutes: Option<u64>,
        /// Restore the factory timer setting
        #[arg(long)]
        default: bool,
    },
    /// Show or set the power limit in watts
    Power {
        /// New power limit (50-200 W)
        #[arg(conflicts_with = "default", value_parser = clap::value_parser!(u32).range(50..=200))]
        watts: Option<u32>,
        /// Restore the factory power limit
        #[arg(long)]
        default: bool,
    },
    /// Show motor and controller temperatures
    Temp,
    /// Restore every factory setting
    Reset,
    /// Close the vent valve
    CloseVent,
    /// Poll speed and status at a fixed interval
    Monitor {
        /// Number of samples
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u32,
        /// Time between samples in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
        /// Start the pump before polling
        #[arg(long)]
        start: bool,
    },
    /// List serial ports
    ListPorts,
}

fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    let address: u8 = s.parse().map_err(|e| format!("{}", e))?;
    Endpoint::try_from(address)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn network_config(cli: &Cli) -> Result<NetworkConfig> {
    let mut config = match &cli.config {
        Some(path) => NetworkConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NetworkConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port_name = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Commands::ListPorts = cli.command {
        return list(cli.json);
    }

    let config = network_config(&cli)?;
    debug!(?config, demo = cli.demo, "starting");

    if cli.demo {
        let pump = if cli.address.is_wildcard() {
            Endpoint::new(1)
        } else {
            cli.address
        };
        let line = DemoBus::new().with_pump(DemoPump::new(pump)).spawn();
        let mut network = MultidropNetwork::new(line).with_timeout(config.timeout());
        return run(&mut network, &cli).await;
    }

    if config.port_name.is_empty() {
        bail!("no serial port given; use --port, --config or --demo");
    }
    let mut network = MultidropNetwork::open(&config)
        .with_context(|| format!("opening {}", config.port_name))?;
    run(&mut network, &cli).await
}

fn list(as_json: bool) -> Result<()> {
    let ports = list_ports();
    if as_json {
        let ports: Vec<_> = ports
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (&port.product, port.vid, port.pid) {
            (Some(product), Some(vid), Some(pid)) => {
                println!("{}  {} [{:04x}:{:04x}]", port.name, product, vid, pid)
            }
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

fn emit(as_json: bool, value: serde_json::Value, text: String) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

async fn run<C: SerialChannel>(network: &mut MultidropNetwork<C>, cli: &Cli) -> Result<()> {
    let pump = cli.address;
    let as_json = cli.json;

    match &cli.command {
        Commands::Info => {
            let info = network.pump_info(pump).await?;
            let text = format!(
                "Pump type:   {}\nDSP version: {}\nFull speed:  {} ({} rpm)",
                info.pump_type,
                info.dsp_version,
                info.max_speed,
                info.max_speed.to_rpm()
            );
            emit(as_json, serde_json::to_value(&info)?, text)?;
        }
        Commands::Start => {
            network.start_pump(pump).await?;
            emit(as_json, json!({ "started": pump }), format!("Pump {} started", pump))?;
        }
        Commands::Stop => {
            network.stop_pump(pump).await?;
            emit(as_json, json!({ "stopped": pump }), format!("Pump {} stopped", pump))?;
        }
        Commands::Speed => {
            let speed = network.pump_current_speed(pump).await?;
            emit(
                as_json,
                json!({ "hz": speed.0, "rpm": speed.to_rpm() }),
                format!("{} ({} rpm)", speed, speed.to_rpm()),
            )?;
        }
        Commands::Status => {
            let status = network.pump_status(pump).await?;
            emit(
                as_json,
                json!({ "bits": status.bits(), "flags": status.flag_names() }),
                status.to_string(),
            )?;
        }
        Commands::Vent { mode, default } => {
            if *default {
                network.reset_pump_vent_mode(pump).await?;
            } else if let Some(digit) = mode {
                let mode = VentMode::try_from(*digit).map_err(anyhow::Error::msg)?;
                network.set_pump_vent_mode(pump, mode).await?;
            }
            let mode = network.pump_vent_mode(pump).await?;
            emit(as_json, json!({ "vent_mode": mode }), format!("Vent {}", mode))?;
        }
        Commands::Timer { minutes, default } => {
            if *default {
                network.reset_pump_timer(pump).await?;
            } else if let Some(minutes) = minutes {
                network
                    .set_pump_timer(pump, Duration::from_secs(minutes * 60))
                    .await?;
            }
            let minutes = network.pump_timer(pump).await?.as_secs() / 60;
            emit(
                as_json,
                json!({ "timer_minutes": minutes }),
                format!("Timer {} min", minutes),
            )?;
        }
        Commands::Power { watts, default } => {
            if *default {
                network.reset_pump_power_limit(pump).await?;
            } else if let Some(watts) = watts {
                network.set_pump_power_limit(pump, Watts(*watts)).await?;
            }
            let limit = network.pump_power_limit(pump).await?;
            emit(
                as_json,
                json!({ "power_limit_w": limit.0 }),
                format!("Power limit {}", limit),
            )?;
        }
        Commands::Temp => {
            let temp = network.pump_temperature(pump).await?;
            let text = format!(
                "Motor:      {} ({:.1} °F)\nController: {} ({:.1} °F)",
                temp.motor,
                temp.motor.to_fahrenheit(),
                temp.controller,
                temp.controller.to_fahrenheit()
            );
            emit(as_json, serde_json::to_value(temp)?, text)?;
        }
        Commands::Reset => {
            network.factory_reset_pump(pump).await?;
            emit(as_json, json!({ "reset": pump }), format!("Pump {} reset", pump))?;
        }
        Commands::CloseVent => {
            network.close_vent_valve(pump).await?;
            emit(
                as_json,
                json!({ "vent_closed": pump }),
                format!("Pump {} vent valve closed", pump),
            )?;
        }
        Commands::Monitor {
            count,
            interval_ms,
            start,
        } => {
            if *start {
                network.start_pump(pump).await?;
            }
            let mut ticker = tokio::time::interval(Duration::from_millis(*interval_ms));
            for _ in 0..*count {
                ticker.tick().await;
                let speed = network.pump_current_speed(pump).await?;
                let status = network.pump_status(pump).await?;
                emit(
                    as_json,
                    json!({ "hz": speed.0, "bits": status.bits(), "flags": status.flag_names() }),
                    format!("{:>8}  {}", speed.to_string(), status),
                )?;
            }
        }
        Commands::ListPorts => list(as_json)?,
    }
    Ok(())
}

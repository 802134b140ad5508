use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use litra_core::catalog;
use litra_core::device::{self, DeviceFilter, DiscoveredDevice};
use litra_core::session::{CancelToken, LitraSession, SessionConfig};
use litra_core::transport::NusbTransport;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Logitech Litra Glow/Beam control (Pure Rust)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Only act on the device with this serial number
    #[arg(long, global = true)]
    serial: Option<String>,

    /// Only act on this product (glow or beam)
    #[arg(long, global = true)]
    product: Option<String>,

    /// Session configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached lights
    List,
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Set brightness (20-250)
    Brightness { value: u16 },
    /// Set color temperature in Kelvin (2700-6500)
    Temperature { kelvin: u16 },
    /// Query whether the light is on
    Status,
    /// Print state reports until Ctrl-C
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let filter = DeviceFilter {
        product: args
            .product
            .as_deref()
            .map(|name| {
                catalog::find_by_name(name)
                    .ok_or_else(|| anyhow!("Unknown product '{}' (expected glow or beam)", name))
            })
            .transpose()?,
        serial: args.serial.clone(),
    };

    let devices = device::discover_matching(&filter).context("Failed to enumerate USB devices")?;

    if let Command::List = args.command {
        if devices.is_empty() {
            println!("No Litra devices found");
        }
        for found in &devices {
            println!("{}", found);
        }
        return Ok(());
    }

    if devices.is_empty() {
        anyhow::bail!("No matching Litra device found");
    }

    if let Command::Watch { duration } = args.command {
        return watch(&devices, &config, duration.map(Duration::from_secs));
    }

    // Every selected device gets its own session.
    for found in &devices {
        let session = open_session(found, &config)?;
        match &args.command {
            Command::On => session.turn_on()?,
            Command::Off => session.turn_off()?,
            Command::Brightness { value } => {
                if !session.set_brightness(*value)? {
                    warn!(device = %found, value, "Brightness not applied");
                }
            }
            Command::Temperature { kelvin } => session.set_color_temperature(*kelvin)?,
            Command::Status => {
                let power = match session.query_power()? {
                    Some(true) => "on",
                    Some(false) => "off",
                    None => "unknown",
                };
                println!("{}: {}", found, power);
            }
            Command::List | Command::Watch { .. } => unreachable!(),
        }
        session.close()?;
    }

    Ok(())
}

fn open_session(found: &DiscoveredDevice, config: &SessionConfig) -> Result<LitraSession<NusbTransport>> {
    let transport = found
        .open()
        .with_context(|| format!("Failed to open {}", found))?;
    LitraSession::new(transport, config.clone()).with_context(|| format!("Failed to claim {}", found))
}

fn watch(devices: &[DiscoveredDevice], config: &SessionConfig, duration: Option<Duration>) -> Result<()> {
    let cancel = CancelToken::new();

    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    if let Some(duration) = duration {
        let timer_token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(duration);
            timer_token.cancel();
        });
    }

    info!(devices = devices.len(), "Watching for state reports (Ctrl-C to stop)");

    let sessions = devices
        .iter()
        .map(|found| open_session(found, config).map(|s| (found, s)))
        .collect::<Result<Vec<_>>>()?;

    thread::scope(|scope| {
        let handles: Vec<_> = sessions
            .iter()
            .map(|(found, session)| {
                let cancel = &cancel;
                scope.spawn(move || {
                    let result = session.run_report_loop(cancel);
                    println!("{}: {}", found, session.state());
                    result.with_context(|| format!("Polling {} failed", found))
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(anyhow!("Polling thread panicked"))))
            .collect::<Result<Vec<_>>>()
    })?;

    for (_, session) in &sessions {
        session.close()?;
    }
    Ok(())
}

//! fmem - read and write memory-mapped bridge devices by name
//!
//! Commands:
//! - `fmem list` - Devices per bus domain
//! - `fmem read <device> <offset>` - Read one value
//! - `fmem write <device> <offset> <value>` - Write one value
//! - `fmem dump <device> <offset> <count>` - Consecutive reads
//! - `fmem info` - Bus domain parameters
//!
//! Requests run against a simulated fabric started in-process on the
//! configured ports directory; its memory lives only as long as the command.

mod fabric;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fmem_core::{AccessWidth, BusDomain, BusMux, FmemConfig, ResponsePolicy};
use std::path::PathBuf;

use crate::fabric::SimFabric;

#[derive(Parser)]
#[command(name = "fmem")]
#[command(author = "fmem Contributors")]
#[command(version)]
#[command(about = "Access FPGA bridge devices as named resources", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the ports directory
    #[arg(long)]
    ports_dir: Option<PathBuf>,

    /// Fail on error responses instead of ignoring them
    #[arg(long)]
    check_responses: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices per bus domain
    List,

    /// Read from a device
    ///
    /// The simulated fabric starts empty for every command, so values
    /// written by an earlier `fmem write` are not visible here.
    Read {
        /// Device name
        device: String,
        /// Byte offset (hex with 0x, or decimal)
        offset: String,
        /// Access width in bytes (1, 2 or 4)
        #[arg(short, long, default_value_t = 4)]
        width: u8,
    },

    /// Write to a device
    ///
    /// The simulated fabric lives only for this command: the write is
    /// checked end to end but does not persist.
    Write {
        /// Device name
        device: String,
        /// Byte offset (hex with 0x, or decimal)
        offset: String,
        /// Value (hex with 0x, or decimal); must fit the access width
        value: String,
        /// Access width in bytes (1, 2 or 4)
        #[arg(short, long, default_value_t = 4)]
        width: u8,
    },

    /// Read consecutive values from a device
    ///
    /// Reads a freshly started simulated fabric, so every value is zero.
    Dump {
        /// Device name
        device: String,
        /// Byte offset of the first value
        offset: String,
        /// Number of values
        count: String,
        /// Access width in bytes (1, 2 or 4)
        #[arg(short, long, default_value_t = 4)]
        width: u8,
    },

    /// Show bus domain parameters
    Info,
}

fn parse_hex_or_dec(s: &str) -> Result<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).with_context(|| format!("Invalid hex number '{}'", s))
    } else {
        s.parse::<u32>()
            .with_context(|| format!("Invalid decimal number '{}'", s))
    }
}

/// Reject values with bits above the access width
fn check_fits(value: u32, width: u8) -> Result<u32> {
    let mask = AccessWidth::try_from(width)?.value_mask();
    if value & !mask != 0 {
        bail!(
            "Value {:#x} does not fit a {}-byte access (max {:#x})",
            value,
            width,
            mask
        );
    }
    Ok(value)
}

fn load_config(cli: &Cli) -> Result<FmemConfig> {
    let mut config = match &cli.config {
        Some(path) => FmemConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FmemConfig::default(),
    };
    if let Some(dir) = &cli.ports_dir {
        config.ports_dir = dir.clone();
    }
    if cli.check_responses {
        config.engine.response = ResponsePolicy::Check;
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::List => list_devices(),
        Commands::Info => show_info(&config),
        command => {
            let fabric = SimFabric::start(&config)?;
            let result = fabric
                .connect(&config)
                .and_then(|mux| run(&mux, command));
            fabric.shutdown();
            result?;
        }
    }

    Ok(())
}

fn run(mux: &BusMux, command: &Commands) -> Result<()> {
    match command {
        Commands::Read {
            device,
            offset,
            width,
        } => {
            let offset = parse_hex_or_dec(offset)?;
            let value = mux
                .read(device, offset, *width)
                .with_context(|| format!("Read of {}+{:#x} failed", device, offset))?;
            println!("{}", format_value(value, *width));
        }

        Commands::Write {
            device,
            offset,
            value,
            width,
        } => {
            let offset = parse_hex_or_dec(offset)?;
            let value = check_fits(parse_hex_or_dec(value)?, *width)?;
            mux.write(device, offset, *width, value)
                .with_context(|| format!("Write of {}+{:#x} failed", device, offset))?;
            println!(
                "{} {}+{:#x} <- {}",
                "✓".green(),
                device.bold(),
                offset,
                format_value(value, *width)
            );
        }

        Commands::Dump {
            device,
            offset,
            count,
            width,
        } => {
            let start = parse_hex_or_dec(offset)?;
            let count = parse_hex_or_dec(count)?;
            let (_, dev) = mux.locate(device)?;
            for i in 0..count {
                let offset = start.saturating_add(i.saturating_mul(u32::from(*width)));
                let value = mux
                    .read(device, offset, *width)
                    .with_context(|| format!("Read of {}+{:#x} failed", device, offset))?;
                println!(
                    "{}  {}",
                    format!("{:#010x}", dev.base_addr.wrapping_add(offset)).dimmed(),
                    format_value(value, *width)
                );
            }
        }

        Commands::List | Commands::Info => {}
    }

    Ok(())
}

/// Hex with as many digits as the access width
fn format_value(value: u32, width: u8) -> String {
    let digits = usize::from(width) * 2;
    format!("0x{:0digits$x}", value, digits = digits)
}

fn list_devices() {
    for domain in BusDomain::PRIORITY {
        println!("{} ({})", domain.name().bold().green(), describe(domain));
        for dev in domain.registry().list() {
            println!("  {}", dev);
        }
    }
}

fn describe(domain: BusDomain) -> &'static str {
    match domain {
        BusDomain::Control => "control bus",
        BusDomain::Data => "data bus",
    }
}

fn show_info(config: &FmemConfig) {
    println!("{}", "fmem - bus transaction translation".bold().green());
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Ports:   {}", config.ports_dir.display());
    println!(
        "Widths:  {}",
        AccessWidth::ALL
            .iter()
            .map(|w| w.bytes().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    for domain in BusDomain::PRIORITY {
        let params = domain.params();
        println!("\n{} ({})", params.name.bold(), describe(domain));
        println!("  port:         {}", config.port_path(domain).display());
        println!("  id bits:      {}", params.id_bits);
        println!(
            "  address bits: {} ({}-bit field)",
            params.addr_bits, params.addr_field_bits
        );
        println!("  data bits:    {}", params.data_bits);
        println!("  lane mask:    {:#x}", params.offset_mask());
        println!("  devices:      {}", domain.registry().len());
    }
}

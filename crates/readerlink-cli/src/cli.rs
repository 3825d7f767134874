use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use readerlink_core::Region;
use readerlink_session::ReaderConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "UHF RFID reader session tool", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a session against the simulated reader, driven by JSON lines on stdin
    Run(RunArgs),

    /// List serial ports and report GPIO support
    Ports,

    /// List the supported region codes
    Regions,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to a TOML reader configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Reader port, overriding the configuration file
    #[arg(long)]
    pub port: Option<String>,

    /// Region code (NA, IN, JP, CN, EU, KR, AU, NZ)
    #[arg(long)]
    pub region: Option<Region>,

    /// Transmit power in centi-dBm
    #[arg(long)]
    pub power: Option<i32>,

    /// Attach a simulated GPIO port
    #[arg(long)]
    pub simulate_gpio: bool,
}

impl RunArgs {
    /// The configuration file (or defaults) with flag overrides applied.
    pub fn reader_config(&self) -> anyhow::Result<ReaderConfig> {
        let mut config = match &self.config {
            Some(path) => ReaderConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ReaderConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(region) = self.region {
            config.region = Some(region);
        }
        if let Some(power) = self.power {
            config.power = power;
        }
        Ok(config)
    }
}

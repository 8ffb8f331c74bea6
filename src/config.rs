use std::{
    fs::read_to_string,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::exit,
    str::FromStr,
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

use service::{NodeClass, round2};

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    ///
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    ///
    #[serde(default)]
    pub level: LogLevel,
}

/// Mobility step applied on every tick to a satellite's position.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub struct Drift {
    #[serde(default = "Drift::x")]
    pub x: f64,
    #[serde(default = "Drift::y")]
    pub y: f64,
}

impl Drift {
    fn x() -> f64 {
        0.05
    }

    fn y() -> f64 {
        0.075
    }
}

impl Default for Drift {
    fn default() -> Self {
        Self {
            x: Self::x(),
            y: Self::y(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    ///
    /// directory address
    ///
    /// The TCP address of the membership directory this peer registers
    /// with and polls.
    ///
    #[serde(default = "Settings::registry")]
    pub registry: SocketAddr,
    ///
    /// Seconds between membership pulls. Every pull replaces the local
    /// snapshot and rebuilds the routing table.
    ///
    #[serde(default = "Settings::poll_interval")]
    pub poll_interval: u64,
    ///
    /// Seconds between mobility ticks (satellites only).
    ///
    #[serde(default = "Settings::move_interval")]
    pub move_interval: u64,
    #[serde(default)]
    pub drift: Drift,
    ///
    /// Directory connect timeout, in seconds.
    ///
    #[serde(default = "Settings::connect_timeout")]
    pub connect_timeout: u64,
    ///
    /// Total directory request timeout, in seconds.
    ///
    #[serde(default = "Settings::request_timeout")]
    pub request_timeout: u64,
    ///
    /// Milliseconds to pause between outbound file fragments so a burst
    /// cannot overrun the local socket buffer.
    ///
    #[serde(default = "Settings::fragment_interval")]
    pub fragment_interval: u64,
    ///
    /// Seconds an unfinished inbound transfer may sit idle before its
    /// scratch fragments are reaped.
    ///
    #[serde(default = "Settings::assembly_ttl")]
    pub assembly_ttl: u64,
    ///
    /// Directory for reassembly scratch artefacts and final files.
    ///
    #[serde(default = "Settings::scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default)]
    pub log: Log,
}

impl Settings {
    fn registry() -> SocketAddr {
        "127.0.0.1:5001".parse().unwrap()
    }

    fn poll_interval() -> u64 {
        2
    }

    fn move_interval() -> u64 {
        2
    }

    fn connect_timeout() -> u64 {
        5
    }

    fn request_timeout() -> u64 {
        10
    }

    fn fragment_interval() -> u64 {
        100
    }

    fn assembly_ttl() -> u64 {
        600
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry: Self::registry(),
            poll_interval: Self::poll_interval(),
            move_interval: Self::move_interval(),
            drift: Drift::default(),
            connect_timeout: Self::connect_timeout(),
            request_timeout: Self::request_timeout(),
            fragment_interval: Self::fragment_interval(),
            assembly_ttl: Self::assembly_ttl(),
            scratch_dir: Self::scratch_dir(),
            log: Log::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Node class: "ground" (stationary) or "satellite" (mobile relay).
    ///
    #[arg(long)]
    node: String,
    ///
    /// Unique logical name within the fleet.
    ///
    #[arg(long)]
    name: String,
    ///
    /// IPv4 address to bind for datagram traffic.
    ///
    #[arg(long)]
    ip: Ipv4Addr,
    ///
    /// UDP port to bind.
    ///
    #[arg(long)]
    port: u16,
    ///
    /// Initial x coordinate.
    ///
    #[arg(long)]
    x: f64,
    ///
    /// Initial y coordinate.
    ///
    #[arg(long)]
    y: f64,
    ///
    /// Directory address, overriding the settings file.
    ///
    #[arg(long)]
    registry: Option<SocketAddr>,
    ///
    /// Optional settings file (JSON5).
    ///
    /// Example: skymesh --node ground --name g1 --ip 127.0.0.1 --port 4000
    ///          --x 0 --y 0 --config /etc/skymesh/settings.json5
    ///
    #[arg(long)]
    config: Option<String>,
}

/// Everything a peer process needs to run: its identity from the command
/// line, runtime knobs from the optional settings file.
#[derive(Debug)]
pub struct Config {
    pub class: NodeClass,
    pub name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub x: f64,
    pub y: f64,
    pub settings: Settings,
}

impl Config {
    ///
    /// Load configure from command line parameters and the optional
    /// settings file.
    ///
    /// Flag errors exit with code 1 and an unknown node class with code 3,
    /// so shells driving a fleet can tell the two apart.
    ///
    pub fn load() -> Result<Self> {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                exit(match e.kind() {
                    clap::error::ErrorKind::DisplayHelp
                    | clap::error::ErrorKind::DisplayVersion => 0,
                    _ => 1,
                });
            }
        };

        let class = match cli.node.as_str() {
            "ground" | "Ground" => NodeClass::Ground,
            "satellite" | "Satellite" => NodeClass::Satellite,
            other => {
                eprintln!("invalid node class: {other} (expected ground or satellite)");
                exit(3);
            }
        };

        if !cli.x.is_finite() || !cli.y.is_finite() {
            eprintln!("coordinates must be finite");
            exit(1);
        }

        let mut settings = match &cli.config {
            Some(path) => serde_json5::from_str(&read_to_string(path)?)?,
            None => Settings::default(),
        };

        if let Some(registry) = cli.registry {
            settings.registry = registry;
        }

        Ok(Self {
            class,
            name: cli.name,
            ip: cli.ip,
            port: cli.port,
            x: round2(cli.x),
            y: round2(cli.y),
            settings,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.settings.poll_interval)
    }

    pub fn move_interval(&self) -> Duration {
        Duration::from_secs(self.settings.move_interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout)
    }

    pub fn fragment_interval(&self) -> Duration {
        Duration::from_millis(self.settings.fragment_interval)
    }

    pub fn assembly_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.assembly_ttl)
    }
}

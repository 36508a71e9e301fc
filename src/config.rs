//! Configuration management for ovpn-scout.
//!
//! Configuration is applied in order: defaults → TOML file → command-line
//! arguments, with later sources overriding earlier ones.
//!
//! # Configuration Flow
//!
//! ```text
//!     ┌─────────────────┐
//!     │ Config::default │ ◄── per-user paths from the home directory
//!     └────────┬────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐     ┌──────────────────────┐
//!     │ Config file     │ ◄───│ ovpn-scout.toml      │
//!     │ exists?         │     │ --config / env var   │
//!     └────────┬────────┘     └──────────────────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐     ┌──────────────────────┐
//!     │ Apply CLI args  │ ◄───│ --loglevel, --url,   │
//!     │ (override)      │     │ --timeout, ...       │
//!     └────────┬────────┘     └──────────────────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐
//!     │ Validate        │ ◄── durations, URLs, echo services
//!     └─────────────────┘
//! ```
//!
//! # Example Configuration File
//!
//! ```toml
//! listing_url = "https://ipspeed.info/freevpn_openvpn.php?language=en"
//! config_root = "/home/me/OpenVPN/config"
//! log_dir = "/home/me/OpenVPN/log"
//! blacklist_file = "/home/me/OpenVPN/blacklist.txt"
//! flag_file = "/tmp/vpn_condition.flag"
//! openvpn_binary = "openvpn"
//! loglevel = "notice"
//! # logfile = "/var/log/ovpn-scout.log"
//! # logfile = ":syslog:"
//! request_timeout_secs = 10
//! echo_timeout_secs = 2
//! ip_services = [
//!     "https://ident.me",
//!     "https://api.ipify.org",
//!     "https://api4.ipify.org",
//!     "https://ifconfig.me/ip",
//! ]
//!
//! [connectivity]
//! host = "8.8.8.8"
//! port = 53
//! timeout_secs = 3
//!
//! [supervision]
//! timeout = "2h"
//! timestep = "2s"
//! # connect_watchdog = "5m"
//! ```
//!
//! # What This Module Does NOT Do
//!
//! - **Runtime reconfiguration**: Config is loaded once at startup
//! - **Credential storage**: Configs with `auth-user-pass` are used as downloaded

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::window::{parse_compact_duration, SupervisionWindow};

/// Default listing page.
pub const DEFAULT_LISTING_URL: &str = "https://ipspeed.info/freevpn_openvpn.php?language=en";

/// Default country policy for `list` and `connect`.
pub const DEFAULT_COUNTRIES: &str = "!RU";

/// Log level for ovpn-scout output.
///
/// From most to least verbose: [`Debug`](LogLevel::Debug) >
/// [`Info`](LogLevel::Info) > [`Notice`](LogLevel::Notice) >
/// [`Warn`](LogLevel::Warn) > [`Error`](LogLevel::Error).
///
/// ```rust
/// use ovpn_scout::LogLevel;
///
/// assert!(LogLevel::Notice < LogLevel::Warn);
/// assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Low-level debugging information.
    Debug,
    /// Informational messages about normal operation.
    Info,
    /// State transitions and other notable events.
    #[default]
    Notice,
    /// Warning conditions that don't stop the run.
    Warn,
    /// Error conditions.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Notice => write!(f, "NOTICE"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "NOTICE" => Ok(LogLevel::Notice),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "ERR" => Ok(LogLevel::Error),
            _ => Err(Error::Config(format!("invalid log level: {}", s))),
        }
    }
}

/// Settings for the bare reachability check.
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `host` | `8.8.8.8` | Well-known reachable address |
/// | `port` | 53 | TCP port to connect to |
/// | `timeout_secs` | 3 | Connect timeout |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectivityConfig {
    /// Address to connect to.
    #[serde(default = "default_connectivity_host")]
    pub host: String,
    /// TCP port to connect to.
    #[serde(default = "default_connectivity_port")]
    pub port: u16,
    /// Connect timeout in seconds.
    #[serde(default = "default_connectivity_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_connectivity_host() -> String {
    "8.8.8.8".to_string()
}
fn default_connectivity_port() -> u16 {
    53
}
fn default_connectivity_timeout_secs() -> u64 {
    3
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            host: default_connectivity_host(),
            port: default_connectivity_port(),
            timeout_secs: default_connectivity_timeout_secs(),
        }
    }
}

impl ConnectivityConfig {
    /// Connect timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timing of a supervised attempt, in compact duration form.
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `timeout` | `2h` | How long a healthy tunnel is monitored |
/// | `timestep` | `2s` | Delay between public-address checks |
/// | `connect_watchdog` | unset | Give up on a client that never logs a marker |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisionConfig {
    /// Monitoring window, e.g. `"2h"`.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Poll interval while monitoring, e.g. `"2s"`.
    #[serde(default = "default_timestep")]
    pub timestep: String,
    /// Optional bound on the connecting phase. Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_watchdog: Option<String>,
}

fn default_timeout() -> String {
    "2h".to_string()
}
fn default_timestep() -> String {
    "2s".to_string()
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            timestep: default_timestep(),
            connect_watchdog: None,
        }
    }
}

/// Main configuration struct for ovpn-scout.
///
/// # Fields Overview
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `listing_url` | ipspeed.info free list | Page listing public endpoints |
/// | `user_agent` | desktop browser | User-Agent for listing/config requests |
/// | `config_root` | `~/OpenVPN/config` | Downloaded `.ovpn` files |
/// | `log_dir` | `~/OpenVPN/log` | Client logs (`openvpn_<basename>.log`) |
/// | `blacklist_file` | `~/OpenVPN/blacklist.txt` | Failed URLs |
/// | `flag_file` | `$TMP/vpn_condition.flag` | Status flag for other processes |
/// | `openvpn_binary` | `openvpn` | Client executable |
/// | `ip_services` | four echo services | Ordered public-address sources |
///
/// # Example
///
/// ```rust
/// use ovpn_scout::Config;
///
/// let mut config = Config::default();
/// config.supervision.timeout = "30m".to_string();
/// config.validate().expect("valid configuration");
/// assert_eq!(config.window().unwrap().timeout.as_secs(), 1800);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Listing page URL.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    /// User-Agent header for listing and download requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Root directory of downloaded configurations.
    #[serde(default = "default_config_root")]
    pub config_root: PathBuf,
    /// Directory the client writes its logs to.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Blacklist file.
    #[serde(default = "default_blacklist_file")]
    pub blacklist_file: PathBuf,
    /// Status flag file.
    #[serde(default = "default_flag_file")]
    pub flag_file: PathBuf,
    /// OpenVPN executable.
    #[serde(default = "default_openvpn_binary")]
    pub openvpn_binary: PathBuf,
    /// Log level for output.
    #[serde(default)]
    pub loglevel: LogLevel,
    /// Log file path. None for stdout, ":syslog:" for syslog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logfile: Option<String>,
    /// Timeout for listing and download requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for each address-echo request, in seconds.
    #[serde(default = "default_echo_timeout_secs")]
    pub echo_timeout_secs: u64,
    /// Address-echo services, queried in order.
    #[serde(default = "default_ip_services")]
    pub ip_services: Vec<String>,
    /// Reachability check settings.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    /// Supervision timing.
    #[serde(default)]
    pub supervision: SupervisionConfig,
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
        .to_string()
}
fn openvpn_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("OpenVPN")
}
fn default_config_root() -> PathBuf {
    openvpn_home().join("config")
}
fn default_log_dir() -> PathBuf {
    openvpn_home().join("log")
}
fn default_blacklist_file() -> PathBuf {
    openvpn_home().join("blacklist.txt")
}
fn default_flag_file() -> PathBuf {
    std::env::temp_dir().join("vpn_condition.flag")
}
fn default_openvpn_binary() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\OpenVPN\bin\openvpn.exe")
    } else {
        PathBuf::from("openvpn")
    }
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_echo_timeout_secs() -> u64 {
    2
}
fn default_ip_services() -> Vec<String> {
    [
        "https://ident.me",
        "https://api.ipify.org",
        "https://api4.ipify.org",
        "https://ifconfig.me/ip",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            user_agent: default_user_agent(),
            config_root: default_config_root(),
            log_dir: default_log_dir(),
            blacklist_file: default_blacklist_file(),
            flag_file: default_flag_file(),
            openvpn_binary: default_openvpn_binary(),
            loglevel: LogLevel::default(),
            logfile: None,
            request_timeout_secs: default_request_timeout_secs(),
            echo_timeout_secs: default_echo_timeout_secs(),
            ip_services: default_ip_services(),
            connectivity: ConnectivityConfig::default(),
            supervision: SupervisionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    /// Returns [`Error::Config`] if the TOML is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate configuration values.
    ///
    /// Duration strings are parsed here so a malformed value stops the run
    /// before any network or process activity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.window()?;
        self.connect_watchdog()?;
        Url::parse(&self.listing_url)
            .map_err(|e| Error::Config(format!("invalid listing_url: {}", e)))?;
        if self.ip_services.is_empty() {
            return Err(Error::Config(
                "ip_services must list at least one service".to_string(),
            ));
        }
        if self.connectivity.timeout_secs == 0 {
            return Err(Error::Config(
                "connectivity.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The monitoring window built from `supervision.timeout`/`timestep`.
    pub fn window(&self) -> Result<SupervisionWindow> {
        SupervisionWindow::parse(&self.supervision.timeout, &self.supervision.timestep)
    }

    /// The optional bound on the connecting phase.
    pub fn connect_watchdog(&self) -> Result<Option<Duration>> {
        self.supervision
            .connect_watchdog
            .as_deref()
            .map(parse_compact_duration)
            .transpose()
    }

    /// Timeout for listing and download requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout for a single address-echo request.
    pub fn echo_timeout(&self) -> Duration {
        Duration::from_secs(self.echo_timeout_secs)
    }
}

/// Command-line arguments for ovpn-scout.
///
/// # Usage
///
/// ```text
/// ovpn-scout [OPTIONS] <COMMAND>
/// ```
///
/// | Command | Description |
/// |---------|-------------|
/// | `list` | Print ranked `.ovpn` URLs |
/// | `countries` | Print countries and their config URLs |
/// | `download <url>` | Download one config |
/// | `run <basename>` | Launch OpenVPN on a downloaded config |
/// | `kill` | Stop every running OpenVPN client |
/// | `check <basename> <url>` | Supervise a launched client |
/// | `connect` | Rank, download, launch and supervise until one works |
///
/// # Environment Variables
///
/// - `OVPN_SCOUT_CONFIG`: Path to configuration file (equivalent to `--config`)
#[derive(Parser, Debug)]
#[command(name = "ovpn-scout")]
#[command(about = "Discover, rank and supervise public OpenVPN endpoints")]
#[command(version)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(
        long = "config",
        env = "OVPN_SCOUT_CONFIG",
        default_value = "ovpn-scout.toml",
        global = true
    )]
    pub config_file: PathBuf,

    /// Write default config to file and exit.
    #[arg(long = "generate-config")]
    pub generate_config: Option<PathBuf>,

    /// Log verbosity (DEBUG, INFO, NOTICE, WARN, ERROR).
    #[arg(long, global = true)]
    pub loglevel: Option<String>,

    /// Log to file instead of stdout (use ":syslog:" for syslog).
    #[arg(long, global = true)]
    pub logfile: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List all .ovpn URLs, fastest first.
    List {
        /// Page URL (default: the free OpenVPN list).
        #[arg(long)]
        url: Option<String>,
        /// Countries to keep, e.g. "US,jp,!RU", "!ge" or "*".
        #[arg(long, default_value = DEFAULT_COUNTRIES)]
        countries: String,
        /// Show the ping and country of each server.
        #[arg(long)]
        showping: bool,
        /// Print only the status lines, not the list.
        #[arg(long)]
        silent: bool,
        /// Keep URLs that are already on the blacklist.
        #[arg(long)]
        include_blacklisted: bool,
    },
    /// List countries and their .ovpn config URLs.
    Countries {
        /// Page URL (default: the free OpenVPN list).
        #[arg(long)]
        url: Option<String>,
    },
    /// Download a single .ovpn file.
    Download {
        /// Full URL of the .ovpn file.
        url: String,
    },
    /// Run OpenVPN on a downloaded config.
    Run {
        /// Base name (no .ovpn) of the config.
        basename: String,
    },
    /// Kill running OpenVPN processes.
    Kill,
    /// Supervise a launched config until success or failure.
    Check {
        /// Base name (no .ovpn) of the config.
        basename: String,
        /// URL the config was downloaded from (recorded on failure).
        url: String,
        /// Monitoring window: days (1d), hours (8h), minutes (15m) or seconds (30s).
        #[arg(long)]
        timeout: Option<String>,
        /// Poll interval: days (1d), hours (8h), minutes (15m) or seconds (30s).
        #[arg(long)]
        timestep: Option<String>,
    },
    /// Try ranked candidates one after another until one connects.
    Connect {
        /// Page URL (default: the free OpenVPN list).
        #[arg(long)]
        url: Option<String>,
        /// Countries to keep, e.g. "US,jp,!RU", "!ge" or "*".
        #[arg(long, default_value = DEFAULT_COUNTRIES)]
        countries: String,
        /// Monitoring window for the successful attempt.
        #[arg(long)]
        timeout: Option<String>,
        /// Poll interval while monitoring.
        #[arg(long)]
        timestep: Option<String>,
        /// Stop after this many attempts.
        #[arg(long)]
        max_attempts: Option<usize>,
    },
}

impl CliArgs {
    /// Apply CLI arguments to a configuration, overriding values.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref loglevel) = self.loglevel {
            if let Ok(level) = loglevel.parse() {
                config.loglevel = level;
            }
        }
        if let Some(ref logfile) = self.logfile {
            config.logfile = Some(logfile.clone());
        }

        let (url, timeout, timestep) = match &self.command {
            Some(Command::List { url, .. }) | Some(Command::Countries { url }) => {
                (url.as_ref(), None, None)
            }
            Some(Command::Check {
                timeout, timestep, ..
            }) => (None, timeout.as_ref(), timestep.as_ref()),
            Some(Command::Connect {
                url,
                timeout,
                timestep,
                ..
            }) => (url.as_ref(), timeout.as_ref(), timestep.as_ref()),
            _ => (None, None, None),
        };
        if let Some(url) = url {
            config.listing_url = url.clone();
        }
        if let Some(timeout) = timeout {
            config.supervision.timeout = timeout.clone();
        }
        if let Some(timestep) = timestep {
            config.supervision.timestep = timestep.clone();
        }
    }
}

/// Load configuration from file and CLI arguments.
///
/// # Errors
///
/// Returns [`Error::Config`] if configuration is invalid.
pub fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = Config::default();

    if args.config_file.exists() {
        config = Config::from_file(&args.config_file)?;
    }

    args.apply_to(&mut config);
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.listing_url, DEFAULT_LISTING_URL);
        assert_eq!(config.ip_services.len(), 4);
        assert_eq!(config.window().unwrap().timeout, Duration::from_secs(7200));
        assert_eq!(config.connect_watchdog().unwrap(), None);
        assert!(config.blacklist_file.ends_with("OpenVPN/blacklist.txt"));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("ERR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_toml_round_trip_preserves_values() {
        let mut config = Config::default();
        config.supervision.connect_watchdog = Some("5m".to_string());
        config.loglevel = LogLevel::Debug;
        let toml = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "openvpn_binary = \"/usr/sbin/openvpn\"\n\n[supervision]\ntimeout = \"30m\""
        )
        .unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.openvpn_binary, PathBuf::from("/usr/sbin/openvpn"));
        assert_eq!(config.supervision.timeout, "30m");
        assert_eq!(config.supervision.timestep, "2s");
        assert_eq!(config.connectivity.port, 53);
    }

    #[test]
    fn test_validate_rejects_bad_duration() {
        let mut config = Config::default();
        config.supervision.timeout = "two hours".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.supervision.connect_watchdog = Some("5x".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_services() {
        let mut config = Config::default();
        config.ip_services.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_check_overrides() {
        let args = CliArgs::parse_from([
            "ovpn-scout",
            "--loglevel",
            "debug",
            "check",
            "jp1",
            "https://a.example/jp1.ovpn",
            "--timeout",
            "15m",
        ]);
        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.loglevel, LogLevel::Debug);
        assert_eq!(config.supervision.timeout, "15m");
        assert_eq!(config.supervision.timestep, "2s");
    }

    #[test]
    fn test_cli_list_defaults() {
        let args = CliArgs::parse_from(["ovpn-scout", "list", "--url", "https://b.example/"]);
        match &args.command {
            Some(Command::List {
                countries,
                showping,
                silent,
                ..
            }) => {
                assert_eq!(countries, "!RU");
                assert!(!showping);
                assert!(!silent);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.listing_url, "https://b.example/");
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let args = CliArgs::parse_from(["ovpn-scout", "--config", "/nonexistent/ovpn.toml", "kill"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.supervision, SupervisionConfig::default());
    }
}

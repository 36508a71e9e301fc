//! Command handlers and the main application entry.
//!
//! Each subcommand maps to one `cmd_*` function. Handlers receive their
//! collaborators ([`Services`], a [`VpnClient`], an output writer) explicitly
//! so they can run against local fakes.
//!
//! # Connect Loop
//!
//! ```text
//!   establish baseline public IP (before any client runs)
//!              │
//!              ▼
//!   fetch listing (retry every 1 s) ──▶ rank ──▶ drop blacklisted
//!              │
//!              ▼
//!   ┌─────────────────────────────────────────────┐
//!   │ for each candidate (up to --max-attempts):  │
//!   │   download .ovpn → clear old log → start    │
//!   │   supervise ──▶ Succeeded ──▶ return        │◀──┐
//!   │            └──▶ Failed ──▶ stop client ─────┼───┘
//!   └─────────────────────────────────────────────┘
//!              │ exhausted
//!              ▼
//!   Error::Listing
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use ovpn_scout::config::{Command, Config};
//! use ovpn_scout::control::run_main;
//!
//! # async fn example() -> ovpn_scout::Result<()> {
//! let config = Config::default();
//! let completion = run_main(config, Command::Kill).await?;
//! assert!(completion.is_success());
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::{self, basename_from_url, log_path, Blacklist};
use crate::client::{kill_all, OpenVpnProcess, VpnClient};
use crate::config::{Command, Config, LogLevel};
use crate::country::{CountryPolicy, StaticCountryTable};
use crate::error::{Error, Result};
use crate::listing::{country_links, ListingClient, UNREACHABLE_NOTICE};
use crate::logger::plog;
use crate::plog_fmt;
use crate::probe::{ConnectivityProbe, NetProbe};
use crate::ranker::{demote_failed, rank, without_blacklisted, Candidate};
use crate::supervisor::{
    ConnectionAttempt, ConsoleStatusSink, FailureReason, Outcome, StatusSink, Supervisor,
};

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A one-shot command finished.
    Done,
    /// A supervised attempt reached an outcome.
    Attempt(Outcome),
    /// CTRL+C was received.
    Interrupted,
}

impl Completion {
    /// Whether the process should exit with status 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Done | Completion::Attempt(Outcome::Succeeded))
    }
}

/// Collaborators shared by the command handlers.
pub struct Services {
    /// Listing page and config download client.
    pub listing: ListingClient,
    /// Reachability and public-address probe.
    pub probe: Arc<dyn ConnectivityProbe>,
    /// Receiver of supervision status lines.
    pub sink: Arc<dyn StatusSink>,
}

impl Services {
    /// Builds the real network-backed services.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            listing: ListingClient::from_config(config)?,
            probe: Arc::new(NetProbe::from_config(config)?),
            sink: Arc::new(ConsoleStatusSink::default()),
        })
    }
}

/// Options of the `list` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Country policy expression.
    pub countries: String,
    /// Print `"<ping> ms - <url> (<country>)"` instead of bare URLs.
    pub showping: bool,
    /// Print only status lines.
    pub silent: bool,
    /// Keep blacklisted URLs.
    pub include_blacklisted: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            countries: crate::config::DEFAULT_COUNTRIES.to_string(),
            showping: false,
            silent: false,
            include_blacklisted: false,
        }
    }
}

/// Prints the ranked candidates and returns them.
///
/// The listing is refetched every second until it loads. Blacklisted URLs
/// are dropped, or with `include_blacklisted` moved behind the rest by how
/// often they failed.
/// In silent mode only the waiting notice and the baseline address are
/// printed; otherwise only the list is.
pub async fn cmd_list(
    config: &Config,
    services: &Services,
    options: &ListOptions,
    out: &mut dyn Write,
) -> Result<Vec<Candidate>> {
    let policy = CountryPolicy::parse(&options.countries, &StaticCountryTable)?;

    if !services.probe.has_internet().await {
        plog(LogLevel::Warn, UNREACHABLE_NOTICE);
        if options.silent {
            writeln!(out, "{}", UNREACHABLE_NOTICE)?;
        }
    }
    let entries = services.listing.fetch_entries_retrying().await;

    if let Some(baseline) = services.probe.public_address().await {
        plog_fmt!(LogLevel::Info, "Baseline public IP: {}", baseline);
        if options.silent {
            writeln!(out, "Baseline public IP: {}", baseline)?;
        }
    }

    let ranked = rank(&entries, &policy, &StaticCountryTable, services.listing.url());
    let blacklist = Blacklist::new(&config.blacklist_file);
    let candidates = if options.include_blacklisted {
        demote_failed(ranked, &blacklist.failure_counts()?)
    } else {
        without_blacklisted(ranked, &blacklist.load()?)
    };

    if !options.silent {
        for candidate in &candidates {
            if options.showping {
                writeln!(out, "{}", candidate)?;
            } else {
                writeln!(out, "{}", candidate.config_url)?;
            }
        }
    }
    Ok(candidates)
}

/// Prints `"<country>: <url>"` for each entry whose first link is a config.
///
/// # Errors
///
/// Returns [`Error::Http`] if the listing cannot be fetched and
/// [`Error::Listing`] if the page has no recognizable entries.
pub async fn cmd_countries(services: &Services, out: &mut dyn Write) -> Result<usize> {
    let entries = services.listing.fetch_entries().await?;
    if entries.is_empty() {
        return Err(Error::Listing(
            "No server entries found. The structure may have changed.".to_string(),
        ));
    }
    let pairs = country_links(&entries, services.listing.url());
    for (country, url) in &pairs {
        writeln!(out, "{}: {}", country, url)?;
    }
    Ok(pairs.len())
}

/// Downloads one configuration into `<config_root>/<basename>/<basename>.ovpn`.
pub async fn cmd_download(
    config: &Config,
    services: &Services,
    url: &str,
    out: &mut dyn Write,
) -> Result<PathBuf> {
    let path = download(config, services, url).await?;
    writeln!(out, "Downloaded: {}", path.display())?;
    Ok(path)
}

async fn download(config: &Config, services: &Services, url: &str) -> Result<PathBuf> {
    let basename = basename_from_url(url)
        .ok_or_else(|| Error::Config(format!("cannot derive a config name from {}", url)))?;
    let body = services.listing.fetch_config(url).await?;
    let path = artifacts::save_config(&config.config_root, &basename, &body)?;
    plog_fmt!(LogLevel::Info, "Saved {} bytes to {}", body.len(), path.display());
    Ok(path)
}

/// Launches the client on a downloaded configuration.
pub async fn cmd_run(basename: &str, client: &mut dyn VpnClient, out: &mut dyn Write) -> Result<()> {
    client.start(basename).await?;
    writeln!(out, "Launched OpenVPN for: {}", basename)?;
    Ok(())
}

/// Stops every running client process.
pub async fn cmd_kill(config: &Config) -> Result<()> {
    kill_all(&OpenVpnProcess::from_config(config).process_name()).await
}

/// Supervises a client that was launched separately.
///
/// A client whose tunnel dropped while monitored is stopped; one that never
/// got through its log markers is left alone.
pub async fn cmd_check(
    config: &Config,
    services: &Services,
    basename: &str,
    url: &str,
    client: &mut dyn VpnClient,
) -> Result<Outcome> {
    artifacts::touch(&log_path(&config.log_dir, basename))?;
    let mut supervisor =
        Supervisor::from_config(config, services.probe.clone(), services.sink.clone())?;
    let mut attempt = ConnectionAttempt::new(url, basename);
    let outcome = supervisor.supervise(&mut attempt, client).await?;
    if outcome == Outcome::Failed(FailureReason::TunnelLost) {
        client.stop().await?;
    }
    Ok(outcome)
}

/// Options of the `connect` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Country policy expression.
    pub countries: String,
    /// Upper bound on attempts. `None` tries every candidate.
    pub max_attempts: Option<usize>,
}

/// Tries ranked candidates in order until one holds for the whole window.
///
/// # Errors
///
/// Returns [`Error::Listing`] when every candidate failed or none was
/// available, and [`Error::Launch`] if the client cannot be started at all.
pub async fn cmd_connect(
    config: &Config,
    services: &Services,
    options: &ConnectOptions,
    client: &mut dyn VpnClient,
) -> Result<Outcome> {
    let policy = CountryPolicy::parse(&options.countries, &StaticCountryTable)?;
    let mut supervisor =
        Supervisor::from_config(config, services.probe.clone(), services.sink.clone())?;
    supervisor.establish_baseline().await;

    let entries = services.listing.fetch_entries_retrying().await;
    let ranked = rank(&entries, &policy, &StaticCountryTable, services.listing.url());
    let blacklist = supervisor.blacklist().load()?;
    let candidates = without_blacklisted(ranked, &blacklist);
    if candidates.is_empty() {
        return Err(Error::Listing(
            "no candidates left after country and blacklist filtering".to_string(),
        ));
    }

    let limit = options.max_attempts.unwrap_or(usize::MAX).min(candidates.len());
    plog_fmt!(LogLevel::Notice, "{} candidates, trying up to {}", candidates.len(), limit);

    for (index, candidate) in candidates.iter().take(limit).enumerate() {
        let Some(basename) = candidate.basename() else {
            continue;
        };
        plog_fmt!(LogLevel::Notice, "Attempt {}/{}: {}", index + 1, limit, candidate);

        if let Err(e) = download(config, services, &candidate.config_url).await {
            plog_fmt!(LogLevel::Warn, "Skipping {}: {}", candidate.config_url, e);
            continue;
        }

        artifacts::truncate(&log_path(&config.log_dir, &basename))?;
        client.start(&basename).await?;

        let mut attempt = ConnectionAttempt::new(&candidate.config_url, &basename);
        match supervisor.supervise(&mut attempt, client).await? {
            Outcome::Succeeded => return Ok(Outcome::Succeeded),
            Outcome::Failed(reason) => {
                plog_fmt!(LogLevel::Warn, "{} failed: {}", basename, reason);
                client.stop().await?;
            }
        }
    }

    Err(Error::Listing(format!(
        "none of {} attempted candidates connected",
        limit
    )))
}

async fn dispatch(config: &Config, command: Command) -> Result<Completion> {
    let services = Services::from_config(config)?;
    let mut out = std::io::stdout();

    match command {
        Command::List {
            countries,
            showping,
            silent,
            include_blacklisted,
            ..
        } => {
            let options = ListOptions {
                countries,
                showping,
                silent,
                include_blacklisted,
            };
            cmd_list(config, &services, &options, &mut out).await?;
            Ok(Completion::Done)
        }
        Command::Countries { .. } => {
            cmd_countries(&services, &mut out).await?;
            Ok(Completion::Done)
        }
        Command::Download { url } => {
            cmd_download(config, &services, &url, &mut out).await?;
            Ok(Completion::Done)
        }
        Command::Run { basename } => {
            let mut client = OpenVpnProcess::from_config(config);
            cmd_run(&basename, &mut client, &mut out).await?;
            Ok(Completion::Done)
        }
        Command::Kill => {
            cmd_kill(config).await?;
            Ok(Completion::Done)
        }
        Command::Check { basename, url, .. } => {
            let mut client = OpenVpnProcess::from_config(config);
            let outcome = cmd_check(config, &services, &basename, &url, &mut client).await?;
            Ok(Completion::Attempt(outcome))
        }
        Command::Connect {
            countries,
            max_attempts,
            ..
        } => {
            let mut client = OpenVpnProcess::from_config(config);
            let options = ConnectOptions {
                countries,
                max_attempts,
            };
            let result = cmd_connect(config, &services, &options, &mut client).await;
            if result.is_err() {
                client.stop().await.ok();
            }
            Ok(Completion::Attempt(result?))
        }
    }
}

/// Runs one command until it completes or CTRL+C is received.
///
/// Per-command overrides (`--url`, `--timeout`, ...) must already be applied
/// to `config`; see [`CliArgs::apply_to`](crate::CliArgs::apply_to).
pub async fn run_main(config: Config, command: Command) -> Result<Completion> {
    tokio::select! {
        result = dispatch(&config, command) => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            plog(LogLevel::Notice, "Got CTRL+C. Exiting.");
            Ok(Completion::Interrupted)
        }
    }
}

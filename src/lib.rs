//! # ovpn-scout
//!
//! Discover, rank and supervise public OpenVPN endpoints.
//!
//! # Overview
//!
//! ovpn-scout reads a public listing of free OpenVPN configurations, ranks the
//! endpoints by advertised latency under a country policy, and supervises a
//! connection attempt by watching the OpenVPN client's log and the machine's
//! public address:
//!
//! - **Country policy** ([`country`]): `"US,jp,!RU"`-style allow/deny lists
//! - **Ranking** ([`ranker`]): latency-ordered, stable, blacklist-aware
//! - **Probing** ([`probe`]): internet reachability and public-address echo
//! - **Supervision** ([`supervisor`]): log-marker state machine with a
//!   timeout-bounded health window
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Configuration management (TOML, CLI, environment) |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`logger`] | Logging infrastructure using tracing |
//! | [`country`] | Country name normalization and allow/deny policy |
//! | [`ranker`] | Candidate parsing and latency ranking |
//! | [`listing`] | Listing fetch and entry extraction |
//! | [`probe`] | Reachability and public-address probes |
//! | [`window`] | Compact durations and the supervision window |
//! | [`artifacts`] | Blacklist, status flag, logs and downloaded configs |
//! | [`client`] | OpenVPN process control |
//! | [`supervisor`] | Connection supervision state machine |
//! | [`control`] | Command handlers and the connect loop |
//!
//! # What This Library Does NOT Do
//!
//! - **Implement a VPN**: OpenVPN does the tunneling; ovpn-scout only starts,
//!   watches and stops it
//! - **Manage credentials**: configurations are used exactly as downloaded
//! - **Run attempts concurrently**: one candidate at a time, sequential polling
//!
//! # Quick Start
//!
//! ## As a Library
//!
//! ```rust,no_run
//! use ovpn_scout::control::{cmd_list, ListOptions, Services};
//! use ovpn_scout::Config;
//!
//! #[tokio::main]
//! async fn main() -> ovpn_scout::Result<()> {
//!     let config = Config::default();
//!     let services = Services::from_config(&config)?;
//!     let options = ListOptions { showping: true, ..ListOptions::default() };
//!     let ranked = cmd_list(&config, &services, &options, &mut std::io::stdout()).await?;
//!     println!("{} candidates", ranked.len());
//!     Ok(())
//! }
//! ```
//!
//! ## As a CLI Application
//!
//! ```bash
//! # Ranked configs with their latency, Russia excluded (default)
//! ovpn-scout list --showping
//!
//! # Only Japan or the US
//! ovpn-scout list --countries US,jp
//!
//! # Launch and supervise one config for 30 minutes
//! ovpn-scout download https://ipspeed.info/ovpn/jp1.ovpn
//! ovpn-scout run jp1
//! ovpn-scout check jp1 https://ipspeed.info/ovpn/jp1.ovpn --timeout 30m
//!
//! # Or let ovpn-scout walk the ranked list until one connection holds
//! ovpn-scout connect --countries '!RU,!CN' --timeout 2h
//! ```
//!
//! # Configuration
//!
//! ```text
//! ┌─────────────────┐
//! │   CLI Arguments │ ◄── Highest priority (overrides all)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Config File   │ ◄── TOML (--config / OVPN_SCOUT_CONFIG / ovpn-scout.toml)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │    Defaults     │ ◄── ~/OpenVPN/{config,log,blacklist.txt}
//! └─────────────────┘
//! ```
//!
//! See [`Config`] for all available options.

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod artifacts;
pub mod client;
pub mod config;
pub mod control;
pub mod country;
pub mod error;
pub mod listing;
pub mod logger;
pub mod probe;
pub mod ranker;
pub mod supervisor;
pub mod window;

pub use artifacts::{Blacklist, StatusFlag};
pub use client::{OpenVpnProcess, VpnClient};
pub use config::{CliArgs, Command, Config, ConnectivityConfig, LogLevel, SupervisionConfig};
pub use control::{Completion, Services};
pub use country::{CountryLookup, CountryPolicy, StaticCountryTable};
pub use error::{Error, Result};
pub use listing::ListingClient;
pub use probe::{ConnectivityProbe, NetProbe};
pub use ranker::{Candidate, RawEntry};
pub use supervisor::{
    ConnectionAttempt, FailureReason, LogStatusSink, Outcome, StatusSink, Supervisor,
    SupervisorState,
};
pub use window::{CompactDuration, SupervisionWindow};

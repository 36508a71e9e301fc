//! Connection supervision state machine.
//!
//! A [`Supervisor`] watches one connection attempt from "is there internet at
//! all?" to a final [`Outcome`]. It never launches the client itself; it
//! reads the client's log, queries a [`ConnectivityProbe`] and, once a tunnel
//! has been held for the whole [`SupervisionWindow`], stops the client through
//! the [`VpnClient`] primitive.
//!
//! # State Machine
//!
//! ```text
//!                  has_internet?
//!        ┌────────── no ─────────┐
//!        │                       ▼
//!        │              ┌──────────────────┐
//!        │              │ AwaitingInternet │ ◄── poll every 1 s, unbounded
//!        │              └────────┬─────────┘
//!        │ yes                   │ internet back
//!        ▼                       ▼
//!   ┌────────────────────────────────────┐
//!   │ Connecting                         │ ◄── read log every 1 s
//!   │  "Initialization Sequence          │
//!   │   Completed" ──────────────────────┼──▶ Monitoring
//!   │  "fatal error" / "process exiting" │
//!   │  / "...connect-retry-max" ─────────┼──▶ Failed
//!   │  watchdog expired (optional) ──────┼──▶ Failed
//!   └────────────────────────────────────┘
//!
//!   ┌────────────────────────────────────┐
//!   │ Monitoring                         │
//!   │  fresh address (retry every 1 s)   │
//!   │  loop: sleep step, elapsed += step │
//!   │   address empty or == baseline ────┼──▶ Failed (tunnel lost)
//!   │   elapsed >= timeout ──────────────┼──▶ Succeeded
//!   └────────────────────────────────────┘
//!
//!   Succeeded: stop client, write "false" to the status flag
//!   Failed:    append the URL to the blacklist
//! ```
//!
//! Failure is a normal result, not an [`Error`](crate::Error): the caller
//! decides whether to move on to another candidate.
//!
//! # Unbounded Waits
//!
//! Waiting for internet, waiting for a log marker and waiting for a fresh
//! public address all loop forever unless something changes. Each emits a
//! status line on entry and every [`STATUS_EVERY`] polls after that. Set
//! `supervision.connect_watchdog` to bound the connecting phase.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::artifacts::{log_path, read_log, Blacklist, StatusFlag};
use crate::client::VpnClient;
use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::logger::plog;
use crate::plog_fmt;
use crate::probe::ConnectivityProbe;
use crate::window::SupervisionWindow;

/// Log line written by OpenVPN once the tunnel is up.
pub const SUCCESS_MARKER: &str = "Initialization Sequence Completed";

/// Log fragments that mean the attempt is over.
pub const FAILURE_MARKERS: [&str; 3] = [
    "fatal error",
    "process exiting",
    "All connections have been connect-retry-max",
];

/// Delay between reachability checks while waiting for internet.
pub const INTERNET_POLL: Duration = Duration::from_secs(1);

/// Delay between two reads of the client log.
pub const LOG_POLL: Duration = Duration::from_secs(1);

/// Delay between attempts to learn the tunnel's public address.
pub const ADDRESS_RETRY: Duration = Duration::from_secs(1);

/// Unbounded waits repeat their status line every this many polls.
pub const STATUS_EVERY: u32 = 30;

/// Supervisor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// No internet reachability; waiting for it to come back.
    AwaitingInternet,
    /// Client launched; waiting for a log marker.
    Connecting,
    /// Tunnel established; checking it stays up.
    Monitoring,
    /// Tunnel held for the whole window.
    Succeeded,
    /// Attempt rejected.
    Failed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SupervisorState::AwaitingInternet => "awaiting-internet",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Monitoring => "monitoring",
            SupervisorState::Succeeded => "succeeded",
            SupervisorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why an attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The client log contained this failure marker.
    LogMarker(String),
    /// The public address became empty or reverted to the baseline.
    TunnelLost,
    /// The connecting phase exceeded the configured watchdog.
    Watchdog,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::LogMarker(marker) => write!(f, "client log reported {:?}", marker),
            FailureReason::TunnelLost => write!(f, "tunnel lost"),
            FailureReason::Watchdog => write!(f, "connect watchdog expired"),
        }
    }
}

/// Final result of a supervised attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tunnel stayed up for the whole window.
    Succeeded,
    /// The attempt failed; its URL has been blacklisted.
    Failed(FailureReason),
}

impl Outcome {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

/// Receiver of human-readable status lines, one per state transition.
pub trait StatusSink: Send + Sync {
    /// Reports `line` while in `state`.
    fn status(&self, state: SupervisorState, line: &str);
}

/// Sends status lines to the logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl LogStatusSink {
    /// Level a status line is logged at.
    pub fn level(state: SupervisorState) -> LogLevel {
        match state {
            SupervisorState::Failed => LogLevel::Warn,
            _ => LogLevel::Notice,
        }
    }
}

impl StatusSink for LogStatusSink {
    fn status(&self, state: SupervisorState, line: &str) {
        plog(Self::level(state), line);
    }
}

/// Prints status lines to stdout and forwards them to [`LogStatusSink`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleStatusSink {
    log: LogStatusSink,
}

impl StatusSink for ConsoleStatusSink {
    fn status(&self, state: SupervisorState, line: &str) {
        println!("{}", line);
        self.log.status(state, line);
    }
}

/// Progress of a single attempt as seen from its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// No marker seen yet.
    Connecting,
    /// Success marker seen.
    Established,
    /// Failure marker seen, watchdog expired, or tunnel lost.
    Failed,
}

/// One candidate being tried.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    /// URL the configuration was downloaded from.
    pub candidate_url: String,
    /// Configuration name, also used for the log file name.
    pub basename: String,
    /// When supervision began.
    pub started_at: DateTime<Local>,
    /// Current progress.
    pub state: AttemptState,
    /// Last NUL-stripped log content read.
    pub log_snapshot: String,
}

impl ConnectionAttempt {
    /// Starts tracking an attempt.
    pub fn new(candidate_url: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            candidate_url: candidate_url.into(),
            basename: basename.into(),
            started_at: Local::now(),
            state: AttemptState::Connecting,
            log_snapshot: String::new(),
        }
    }
}

/// State that outlives a single attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorContext {
    /// Public address seen before any tunnel was up.
    pub baseline: Option<String>,
    /// Whether the baseline has been looked up (it may legitimately be `None`).
    pub baseline_checked: bool,
    /// Whether the supervisor is currently waiting for internet.
    pub waiting_for_internet: bool,
}

/// Drives connection attempts to an [`Outcome`].
pub struct Supervisor {
    probe: Arc<dyn ConnectivityProbe>,
    sink: Arc<dyn StatusSink>,
    window: SupervisionWindow,
    connect_watchdog: Option<Duration>,
    log_dir: PathBuf,
    blacklist: Blacklist,
    flag: StatusFlag,
    context: SupervisorContext,
}

impl Supervisor {
    /// Creates a supervisor without a connect watchdog.
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        sink: Arc<dyn StatusSink>,
        window: SupervisionWindow,
        log_dir: impl Into<PathBuf>,
        blacklist: Blacklist,
        flag: StatusFlag,
    ) -> Self {
        Self {
            probe,
            sink,
            window,
            connect_watchdog: None,
            log_dir: log_dir.into(),
            blacklist,
            flag,
            context: SupervisorContext::default(),
        }
    }

    /// Creates a supervisor from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the supervision
    /// durations are malformed.
    pub fn from_config(
        config: &Config,
        probe: Arc<dyn ConnectivityProbe>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        Ok(Self::new(
            probe,
            sink,
            config.window()?,
            &config.log_dir,
            Blacklist::new(&config.blacklist_file),
            StatusFlag::new(&config.flag_file),
        )
        .with_connect_watchdog(config.connect_watchdog()?))
    }

    /// Bounds the connecting phase. `None` waits forever.
    pub fn with_connect_watchdog(mut self, watchdog: Option<Duration>) -> Self {
        self.connect_watchdog = watchdog;
        self
    }

    /// Uses `address` as the baseline instead of looking it up.
    pub fn with_baseline(mut self, address: impl Into<String>) -> Self {
        self.context.baseline = Some(address.into());
        self.context.baseline_checked = true;
        self
    }

    /// Shared state kept across attempts.
    pub fn context(&self) -> &SupervisorContext {
        &self.context
    }

    /// The blacklist failed attempts are appended to.
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Looks up the pre-tunnel public address once, waiting for internet first.
    ///
    /// Later calls return the cached value.
    pub async fn establish_baseline(&mut self) -> Option<String> {
        if !self.context.baseline_checked {
            self.await_internet().await;
            self.context.baseline = self.probe.public_address().await;
            self.context.baseline_checked = true;
            plog_fmt!(
                LogLevel::Info,
                "Baseline public IP: {}",
                self.context.baseline.as_deref().unwrap_or("unknown")
            );
        }
        self.context.baseline.clone()
    }

    /// Blocks until the reachability check passes.
    pub async fn await_internet(&mut self) {
        if self.probe.has_internet().await {
            return;
        }
        self.context.waiting_for_internet = true;
        self.sink.status(
            SupervisorState::AwaitingInternet,
            "Waiting for internet connection...",
        );
        let mut polls: u32 = 0;
        loop {
            tokio::time::sleep(INTERNET_POLL).await;
            polls += 1;
            if self.probe.has_internet().await {
                break;
            }
            if polls % STATUS_EVERY == 0 {
                self.sink.status(
                    SupervisorState::AwaitingInternet,
                    &format!("Still waiting for internet connection ({}s)", polls),
                );
            }
        }
        self.context.waiting_for_internet = false;
        plog(LogLevel::Info, "Internet connection is back");
    }

    /// Supervises `attempt` until it succeeds or fails.
    ///
    /// On success `client` is stopped and the status flag is set to `false`.
    /// On failure the attempt's URL is appended to the blacklist and the
    /// client is left for the caller to stop.
    ///
    /// # Errors
    ///
    /// Only artifact writes and stopping the client can fail.
    pub async fn supervise(
        &mut self,
        attempt: &mut ConnectionAttempt,
        client: &mut dyn VpnClient,
    ) -> Result<Outcome> {
        self.establish_baseline().await;
        self.await_internet().await;

        if let Some(reason) = self.await_marker(attempt).await {
            return self.fail(attempt, reason);
        }
        attempt.state = AttemptState::Established;

        self.sink.status(
            SupervisorState::Monitoring,
            &format!(
                "VPN connection for {} established successfully for {} (at {}).",
                attempt.basename,
                self.window.timeout_spec,
                Local::now().format("%H:%M:%S")
            ),
        );

        if let Some(reason) = self.monitor().await {
            return self.fail(attempt, reason);
        }

        client.stop().await?;
        self.flag.write_inactive()?;
        self.sink.status(
            SupervisorState::Succeeded,
            &format!(
                "VPN connection for {} held for {}.",
                attempt.basename, self.window.timeout_spec
            ),
        );
        Ok(Outcome::Succeeded)
    }

    async fn await_marker(&mut self, attempt: &mut ConnectionAttempt) -> Option<FailureReason> {
        let log = log_path(&self.log_dir, &attempt.basename);
        let started = Instant::now();
        let mut polls: u32 = 0;

        self.sink.status(
            SupervisorState::Connecting,
            &format!("Setting up the connection to {}", attempt.basename),
        );

        loop {
            attempt.log_snapshot = read_log(&log);
            if attempt.log_snapshot.contains(SUCCESS_MARKER) {
                return None;
            }
            if let Some(marker) = FAILURE_MARKERS
                .iter()
                .find(|m| attempt.log_snapshot.contains(*m))
            {
                return Some(FailureReason::LogMarker(marker.to_string()));
            }
            if let Some(limit) = self.connect_watchdog {
                if started.elapsed() >= limit {
                    return Some(FailureReason::Watchdog);
                }
            }

            tokio::time::sleep(LOG_POLL).await;
            polls += 1;
            if polls % STATUS_EVERY == 0 {
                self.sink.status(
                    SupervisorState::Connecting,
                    &format!(
                        "Still setting up the connection to {} ({}s)",
                        attempt.basename, polls
                    ),
                );
            }
        }
    }

    async fn monitor(&mut self) -> Option<FailureReason> {
        let mut retries: u32 = 0;
        let tunnel_address = loop {
            match self.probe.public_address().await {
                Some(address) if !address.is_empty() => break address,
                _ => {
                    retries += 1;
                    if retries % STATUS_EVERY == 0 {
                        self.sink.status(
                            SupervisorState::Monitoring,
                            "Still waiting for the tunnel's public IP",
                        );
                    }
                    tokio::time::sleep(ADDRESS_RETRY).await;
                }
            }
        };
        self.sink.status(
            SupervisorState::Monitoring,
            &format!("VPN is enabled: {}", tunnel_address),
        );

        let mut elapsed = Duration::ZERO;
        while elapsed < self.window.timeout {
            tokio::time::sleep(self.window.poll_interval).await;
            elapsed += self.window.poll_interval;

            let current = self.probe.public_address().await.unwrap_or_default();
            plog_fmt!(LogLevel::Debug, "public IP after {:?}: {:?}", elapsed, current);
            if current.is_empty() || self.context.baseline.as_deref() == Some(current.as_str()) {
                self.sink.status(
                    SupervisorState::Failed,
                    "The connection was terminated. Reinitializing...",
                );
                return Some(FailureReason::TunnelLost);
            }
        }
        None
    }

    fn fail(&mut self, attempt: &mut ConnectionAttempt, reason: FailureReason) -> Result<Outcome> {
        attempt.state = AttemptState::Failed;
        self.blacklist.append(&attempt.candidate_url)?;
        plog_fmt!(LogLevel::Info, "{} blacklisted: {}", attempt.candidate_url, reason);
        self.sink.status(
            SupervisorState::Failed,
            &format!(
                "VPN connection for {} failed. Trying next configuration...",
                attempt.basename
            ),
        );
        Ok(Outcome::Failed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers from fixed scripts; the last answer repeats forever.
    struct ScriptedProbe {
        internet: Vec<bool>,
        addresses: Vec<Option<&'static str>>,
        internet_calls: AtomicUsize,
        address_calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(internet: Vec<bool>, addresses: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                internet,
                addresses,
                internet_calls: AtomicUsize::new(0),
                address_calls: AtomicUsize::new(0),
            })
        }

        fn online(addresses: Vec<Option<&'static str>>) -> Arc<Self> {
            Self::new(vec![true], addresses)
        }
    }

    fn pick<T: Clone>(script: &[T], counter: &AtomicUsize) -> T {
        let i = counter.fetch_add(1, Ordering::SeqCst);
        script[i.min(script.len() - 1)].clone()
    }

    #[async_trait]
    impl ConnectivityProbe for ScriptedProbe {
        async fn has_internet(&self) -> bool {
            pick(&self.internet, &self.internet_calls)
        }

        async fn public_address(&self) -> Option<String> {
            pick(&self.addresses, &self.address_calls).map(str::to_string)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(SupervisorState, String)>>,
    }

    impl RecordingSink {
        fn states(&self) -> Vec<SupervisorState> {
            self.lines.lock().unwrap().iter().map(|(s, _)| *s).collect()
        }

        fn contains(&self, needle: &str) -> bool {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .any(|(_, line)| line.contains(needle))
        }
    }

    impl StatusSink for RecordingSink {
        fn status(&self, state: SupervisorState, line: &str) {
            self.lines.lock().unwrap().push((state, line.to_string()));
        }
    }

    #[derive(Default)]
    struct FakeClient {
        stops: usize,
    }

    #[async_trait]
    impl VpnClient for FakeClient {
        async fn start(&mut self, _basename: &str) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.stops += 1;
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                sink: Arc::new(RecordingSink::default()),
            }
        }

        fn supervisor(&self, probe: Arc<ScriptedProbe>, timeout: &str, step: &str) -> Supervisor {
            Supervisor::new(
                probe,
                self.sink.clone(),
                SupervisionWindow::parse(timeout, step).unwrap(),
                self.dir.path().join("log"),
                Blacklist::new(self.dir.path().join("blacklist.txt")),
                StatusFlag::new(self.dir.path().join("vpn_condition.flag")),
            )
        }

        fn write_log(&self, basename: &str, content: &[u8]) {
            let path = log_path(&self.dir.path().join("log"), basename);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn flag(&self) -> Option<String> {
            std::fs::read_to_string(self.dir.path().join("vpn_condition.flag")).ok()
        }

        fn blacklist(&self) -> Vec<String> {
            Blacklist::new(self.dir.path().join("blacklist.txt"))
                .entries()
                .unwrap()
        }
    }

    #[test]
    fn test_log_sink_levels() {
        assert_eq!(LogStatusSink::level(SupervisorState::Failed), LogLevel::Warn);
        assert_eq!(LogStatusSink::level(SupervisorState::Monitoring), LogLevel::Notice);
        assert_eq!(LogStatusSink::level(SupervisorState::Succeeded), LogLevel::Notice);
        ConsoleStatusSink::default().status(SupervisorState::Connecting, "Setting up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversion_to_baseline_fails_on_third_poll() {
        let h = Harness::new();
        h.write_log("jp1", b"... Initialization Sequence Completed\n");
        let probe = ScriptedProbe::online(vec![
            Some("5.6.7.8"),
            Some("5.6.7.8"),
            Some("5.6.7.8"),
            Some("1.2.3.4"),
        ]);
        let mut supervisor = h
            .supervisor(probe.clone(), "1h", "2s")
            .with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/jp1.ovpn", "jp1");
        let mut client = FakeClient::default();

        let start = Instant::now();
        let outcome = supervisor.supervise(&mut attempt, &mut client).await.unwrap();

        assert_eq!(outcome, Outcome::Failed(FailureReason::TunnelLost));
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        // One fresh-address lookup plus three polls.
        assert_eq!(probe.address_calls.load(Ordering::SeqCst), 4);
        assert_eq!(attempt.state, AttemptState::Failed);
        assert_eq!(client.stops, 0);
        assert_eq!(h.blacklist(), vec!["https://a.example/jp1.ovpn"]);
        assert!(h.sink.contains("The connection was terminated. Reinitializing..."));
        assert_eq!(h.flag(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_address_fails() {
        let h = Harness::new();
        h.write_log("jp1", b"Initialization Sequence Completed");
        let probe = ScriptedProbe::online(vec![Some("5.6.7.8"), None]);
        let mut supervisor = h.supervisor(probe, "1h", "2s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/jp1.ovpn", "jp1");

        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failed(FailureReason::TunnelLost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_succeeds_at_timeout() {
        let h = Harness::new();
        h.write_log("de1", b"Initialization Sequence Completed\n");
        let probe = ScriptedProbe::online(vec![Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe.clone(), "10s", "2s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/de1.ovpn", "de1");
        let mut client = FakeClient::default();

        let start = Instant::now();
        let outcome = supervisor.supervise(&mut attempt, &mut client).await.unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(probe.address_calls.load(Ordering::SeqCst), 6);
        assert_eq!(client.stops, 1);
        assert_eq!(h.flag().as_deref(), Some("false"));
        assert!(h.blacklist().is_empty());
        assert!(h
            .sink
            .contains("VPN connection for de1 established successfully for 10 seconds"));
        assert_eq!(h.sink.states().last(), Some(&SupervisorState::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_succeeds_after_establishment() {
        let h = Harness::new();
        h.write_log("de1", b"Initialization Sequence Completed\n");
        let probe = ScriptedProbe::online(vec![Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe.clone(), "0", "2s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/de1.ovpn", "de1");
        let mut client = FakeClient::default();

        let start = Instant::now();
        let outcome = supervisor.supervise(&mut attempt, &mut client).await.unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(probe.address_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stops, 1);
        assert_eq!(h.flag().as_deref(), Some("false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nul_padded_success_marker() {
        let h = Harness::new();
        let padded: Vec<u8> = SUCCESS_MARKER
            .bytes()
            .flat_map(|b| [b, 0u8])
            .collect();
        h.write_log("us1", &padded);
        let probe = ScriptedProbe::online(vec![Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe, "0", "1s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/us1.ovpn", "us1");

        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(attempt.state, AttemptState::Established);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_markers_blacklist_each_attempt() {
        let h = Harness::new();
        h.write_log("a", b"Options error\nExiting due to fatal error\n");
        h.write_log(
            "b",
            b"All connections have been connect-retry-max (1) times unsuccessful, exiting\n",
        );
        let probe = ScriptedProbe::online(vec![Some("1.2.3.4")]);
        let mut supervisor = h.supervisor(probe, "2h", "2s").with_baseline("1.2.3.4");

        let mut first = ConnectionAttempt::new("https://a.example/a.ovpn", "a");
        let outcome = supervisor
            .supervise(&mut first, &mut FakeClient::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed(FailureReason::LogMarker("fatal error".to_string()))
        );

        let mut second = ConnectionAttempt::new("https://a.example/b.ovpn", "b");
        let outcome = supervisor
            .supervise(&mut second, &mut FakeClient::default())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Failed(FailureReason::LogMarker(_))));

        assert_eq!(
            h.blacklist(),
            vec!["https://a.example/a.ovpn", "https://a.example/b.ovpn"]
        );
        assert!(h.sink.contains("VPN connection for b failed. Trying next configuration..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_polling_until_marker_appears() {
        let h = Harness::new();
        let log = log_path(&h.dir.path().join("log"), "late");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            std::fs::create_dir_all(log.parent().unwrap()).unwrap();
            std::fs::write(&log, "Initialization Sequence Completed").unwrap();
        });
        let probe = ScriptedProbe::online(vec![Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe, "0", "1s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/late.ovpn", "late");

        let start = Instant::now();
        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_watchdog() {
        let h = Harness::new();
        h.write_log("slow", b"TCP connection established\n");
        let probe = ScriptedProbe::online(vec![Some("1.2.3.4")]);
        let mut supervisor = h
            .supervisor(probe, "2h", "2s")
            .with_baseline("1.2.3.4")
            .with_connect_watchdog(Some(Duration::from_secs(5)));
        let mut attempt = ConnectionAttempt::new("https://a.example/slow.ovpn", "slow");

        let start = Instant::now();
        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failed(FailureReason::Watchdog));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(attempt.log_snapshot.contains("TCP connection established"));
        assert_eq!(h.blacklist().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_awaits_internet_before_connecting() {
        let h = Harness::new();
        h.write_log("jp1", b"Initialization Sequence Completed");
        let probe = ScriptedProbe::new(vec![false, false, false, true], vec![Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe, "0", "1s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/jp1.ovpn", "jp1");

        let start = Instant::now();
        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(!supervisor.context().waiting_for_internet);
        assert_eq!(
            h.sink.states().first(),
            Some(&SupervisorState::AwaitingInternet)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_looked_up_once() {
        let h = Harness::new();
        let probe = ScriptedProbe::online(vec![Some("1.2.3.4"), Some("9.9.9.9")]);
        let mut supervisor = h.supervisor(probe.clone(), "2h", "2s");

        assert_eq!(supervisor.establish_baseline().await.as_deref(), Some("1.2.3.4"));
        assert_eq!(supervisor.establish_baseline().await.as_deref(), Some("1.2.3.4"));
        assert_eq!(probe.address_calls.load(Ordering::SeqCst), 1);
        assert!(supervisor.context().baseline_checked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_fresh_tunnel_address() {
        let h = Harness::new();
        h.write_log("jp1", b"Initialization Sequence Completed");
        let probe = ScriptedProbe::online(vec![None, None, Some("5.6.7.8")]);
        let mut supervisor = h.supervisor(probe, "0", "1s").with_baseline("1.2.3.4");
        let mut attempt = ConnectionAttempt::new("https://a.example/jp1.ovpn", "jp1");

        let start = Instant::now();
        let outcome = supervisor
            .supervise(&mut attempt, &mut FakeClient::default())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(h.sink.contains("VPN is enabled: 5.6.7.8"));
    }
}

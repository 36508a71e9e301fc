//! Supervision window and compact duration parsing.
//!
//! Durations on the command line and in the configuration file use a compact
//! unit-suffixed form: an integer followed by at most one unit letter.
//!
//! | Suffix | Unit | Seconds |
//! |--------|------|---------|
//! | `d` | days | 86400 |
//! | `h` | hours | 3600 |
//! | `m` | minutes | 60 |
//! | `s` or none | seconds | 1 |
//!
//! ```rust
//! use ovpn_scout::window::parse_compact_duration;
//! use std::time::Duration;
//!
//! assert_eq!(parse_compact_duration("2h").unwrap(), Duration::from_secs(7200));
//! assert_eq!(parse_compact_duration("45").unwrap(), Duration::from_secs(45));
//! assert!(parse_compact_duration("soon").is_err());
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// A parsed compact duration together with the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactDuration {
    /// The integer the user wrote.
    pub amount: u64,
    /// The unit letter (`'d'`, `'h'`, `'m'` or `'s'`).
    pub unit: char,
}

impl CompactDuration {
    /// Parses `"<integer>[d|h|m|s]"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the numeric part is not a non-negative integer.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (digits, unit) = match s.chars().last() {
            Some(c @ ('d' | 'h' | 'm' | 's')) => (&s[..s.len() - 1], c),
            _ => (s, 's'),
        };
        let amount = digits
            .parse::<u64>()
            .map_err(|_| Error::Config(format!("invalid duration: {:?}", s)))?;
        Ok(Self { amount, unit })
    }

    /// Total length in seconds.
    pub fn as_secs(&self) -> u64 {
        let scale = match self.unit {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            _ => 1,
        };
        self.amount.saturating_mul(scale)
    }

    /// Converts to a [`Duration`].
    pub fn to_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl std::fmt::Display for CompactDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            'd' => "days",
            'h' => "hours",
            'm' => "minutes",
            _ => "seconds",
        };
        write!(f, "{} {}", self.amount, unit)
    }
}

/// Parses a compact duration string straight into a [`Duration`].
///
/// # Errors
///
/// Returns [`Error::Config`] for anything that is not an integer with an
/// optional `d`/`h`/`m`/`s` suffix.
pub fn parse_compact_duration(s: &str) -> Result<Duration> {
    CompactDuration::parse(s).map(CompactDuration::to_duration)
}

/// Timing policy for the post-success health monitoring loop.
///
/// `poll_interval` is always positive. A zero `timeout` ends monitoring right
/// after the tunnel is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionWindow {
    /// How long a healthy tunnel is kept before the run ends successfully.
    pub timeout: Duration,
    /// Delay between two public-address checks.
    pub poll_interval: Duration,
    /// The timeout as written by the user, kept for status lines.
    pub timeout_spec: CompactDuration,
}

impl SupervisionWindow {
    /// Builds a window from the `--timeout` and `--timestep` strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either string is malformed or the poll
    /// interval is zero.
    pub fn parse(timeout: &str, timestep: &str) -> Result<Self> {
        let timeout_spec = CompactDuration::parse(timeout)?;
        let poll_interval = parse_compact_duration(timestep)?;
        if poll_interval.is_zero() {
            return Err(Error::Config("timestep must be greater than zero".to_string()));
        }
        Ok(Self {
            timeout: timeout_spec.to_duration(),
            poll_interval,
            timeout_spec,
        })
    }
}

//! Error types for ovpn-scout.
//!
//! This module defines the [`enum@Error`] enum representing the fatal error
//! conditions of the crate. A failed connection attempt is *not* an error: the
//! supervisor reports it as [`Outcome::Failed`](crate::supervisor::Outcome::Failed)
//! so the caller can move on to the next candidate.
//!
//! # Error Categories
//!
//! ```text
//!   Error
//!   ├── Io        ◄── Blacklist/flag/config file failures
//!   ├── Config    ◄── Malformed durations, bad TOML, missing values
//!   ├── Http      ◄── Listing fetch or config download failed
//!   ├── Url       ◄── Unparseable listing or download URL
//!   ├── Listing   ◄── Listing page yielded no usable entries
//!   └── Launch    ◄── OpenVPN could not be started or stopped
//! ```
//!
//! # Recovery Guide
//!
//! | Error | Recoverable | Retry | Recommended Action |
//! |-------|-------------|-------|-------------------|
//! | [`Io`](Error::Io) | Sometimes | No | Check permissions and disk space |
//! | [`Config`](Error::Config) | No | No | Fix the configuration file or flags |
//! | [`Http`](Error::Http) | Sometimes | Yes | Check connectivity, try another listing URL |
//! | [`Url`](Error::Url) | No | No | Fix the URL |
//! | [`Listing`](Error::Listing) | Sometimes | Yes | The page structure may have changed |
//! | [`Launch`](Error::Launch) | No | No | Check the OpenVPN binary path and config |
//!
//! # Example
//!
//! ```rust
//! use ovpn_scout::{Error, SupervisionWindow};
//!
//! match SupervisionWindow::parse("2x", "2s") {
//!     Err(Error::Config(msg)) => eprintln!("bad window: {}", msg),
//!     Err(e) => eprintln!("other error: {}", e),
//!     Ok(window) => println!("monitoring for {:?}", window.timeout),
//! }
//! ```

use thiserror::Error;

/// Errors that can occur during ovpn-scout operations.
///
/// Every variant is fatal for the operation that produced it. Transient
/// network trouble inside the polling loops never surfaces here; those loops
/// absorb it and keep polling.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing an artifact.
    ///
    /// Writing the blacklist or the status flag must not fail silently, so
    /// these errors are propagated to the caller.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    ///
    /// Raised for malformed duration strings, invalid TOML and missing
    /// required values. Not recoverable without user intervention.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP error while fetching the listing page or a configuration file.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The listing page produced no usable entries, or every candidate
    /// has been exhausted.
    #[error("listing error: {0}")]
    Listing(String),

    /// The external VPN client could not be launched or stopped.
    #[error("launch error: {0}")]
    Launch(String),
}

/// Result type alias for ovpn-scout operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_url_error_conversion() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::Config("bad duration".to_string()).to_string(),
            "configuration error: bad duration"
        );
        assert_eq!(
            Error::Listing("no entries".to_string()).to_string(),
            "listing error: no entries"
        );
    }
}

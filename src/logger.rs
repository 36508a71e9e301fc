//! Logging infrastructure for ovpn-scout.
//!
//! Built on the tracing ecosystem. Output goes to stdout, a file, or syslog,
//! filtered by a [`LogLevel`](crate::LogLevel) that `RUST_LOG` can override.
//!
//! Log lines are diagnostics. The status lines a user (or a wrapping UI)
//! reads, such as the ranked URL list, are printed separately by
//! [`crate::control`] and [`crate::supervisor::StatusSink`].
//!
//! # Log Levels
//!
//! | Level | Use Case |
//! |-------|----------|
//! | [`Debug`](crate::LogLevel::Debug) | Every poll, every echo-service failure |
//! | [`Info`](crate::LogLevel::Info) | Downloads, launches, baseline address |
//! | [`Notice`](crate::LogLevel::Notice) | State transitions (default) |
//! | [`Warn`](crate::LogLevel::Warn) | Failed attempts, lost tunnels |
//! | [`Error`](crate::LogLevel::Error) | Fatal conditions |
//!
//! # Example
//!
//! ```rust,no_run
//! use ovpn_scout::{LogLevel, logger};
//!
//! logger::init(LogLevel::Notice, None).unwrap();
//! logger::plog(LogLevel::Notice, "ovpn-scout started");
//!
//! // Or to a file / syslog:
//! // logger::init(LogLevel::Debug, Some("/var/log/ovpn-scout.log")).unwrap();
//! // logger::init(LogLevel::Notice, Some(":syslog:")).unwrap();
//! ```
//!
//! # What This Module Does NOT Do
//!
//! - **Log rotation**: File output is a single never-rotated file
//! - **Client logs**: OpenVPN's own logs are read by [`crate::artifacts::read_log`]

use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;
use crate::error::{Error, Result};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the logging system.
///
/// Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - The minimum log level to output
/// * `logfile` - Output destination:
///   - `None` - Log to stdout with ANSI colors
///   - `Some(":syslog:")` - Log to system syslog (Unix only)
///   - `Some(path)` - Append to the file at `path`
///
/// # Errors
///
/// Returns [`Error::Io`] if the log file's directory cannot be created.
/// Returns [`Error::Config`] if no syslog socket exists or the subscriber
/// cannot be installed.
pub fn init(level: LogLevel, logfile: Option<&str>) -> Result<()> {
    if LOGGER_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Notice => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match logfile {
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_span_events(FmtSpan::NONE)
                .with_ansi(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;
        }
        Some(":syslog:") => {
            init_syslog(env_filter)?;
        }
        Some(path) => {
            init_file_logger(Path::new(path), env_filter)?;
        }
    }

    LOGGER_INITIALIZED.get_or_init(|| ());
    Ok(())
}

#[cfg(unix)]
fn init_syslog(env_filter: EnvFilter) -> Result<()> {
    use std::os::unix::net::UnixDatagram;

    let syslog_path = if Path::new("/dev/log").exists() {
        "/dev/log"
    } else if Path::new("/var/run/syslog").exists() {
        "/var/run/syslog"
    } else {
        return Err(Error::Config("no syslog socket found".to_string()));
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(move || SyslogWriter {
            socket: UnixDatagram::unbound()
                .and_then(|sock| sock.connect(syslog_path).map(|()| sock))
                .ok(),
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;

    Ok(())
}

#[cfg(not(unix))]
fn init_syslog(_env_filter: EnvFilter) -> Result<()> {
    Err(Error::Config(
        "syslog output is only available on Unix".to_string(),
    ))
}

#[cfg(unix)]
struct SyslogWriter {
    socket: Option<std::os::unix::net::UnixDatagram>,
}

#[cfg(unix)]
impl std::io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(ref socket) = self.socket {
            let msg = format!("ovpn-scout: {}", String::from_utf8_lossy(buf));
            socket.send(msg.as_bytes())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn init_file_logger(path: &Path, env_filter: EnvFilter) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("invalid log file: {}", path.display())))?;
    std::fs::create_dir_all(directory)?;

    let appender = tracing_appender::rolling::never(directory, file_name);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(appender)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;

    Ok(())
}

/// Log a message at the specified level.
///
/// | LogLevel | tracing macro |
/// |----------|---------------|
/// | Debug | `debug!` |
/// | Info | `info!` |
/// | Notice | `info!` |
/// | Warn | `warn!` |
/// | Error | `error!` |
///
/// ```rust
/// use ovpn_scout::{LogLevel, logger};
///
/// logger::plog(LogLevel::Notice, "Waiting for internet connection...");
/// logger::plog(LogLevel::Warn, "VPN attempt failed");
/// ```
pub fn plog(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => debug!("{}", message),
        LogLevel::Info => info!("{}", message),
        LogLevel::Notice => info!("{}", message),
        LogLevel::Warn => warn!("{}", message),
        LogLevel::Error => error!("{}", message),
    }
}

/// Log a formatted message at the specified level.
///
/// ```rust
/// use ovpn_scout::{LogLevel, plog_fmt};
///
/// plog_fmt!(LogLevel::Info, "Downloaded {} bytes", 4096);
/// plog_fmt!(LogLevel::Notice, "Trying candidate {} of {}", 1, 12);
/// ```
#[macro_export]
macro_rules! plog_fmt {
    ($level:expr, $($arg:tt)*) => {
        $crate::logger::plog($level, &format!($($arg)*))
    };
}

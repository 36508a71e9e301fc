//! External OpenVPN client control.
//!
//! The client is a black box: it is started on a configuration, writes its
//! progress to a log file, and is stopped by killing it. [`VpnClient`]
//! captures exactly that surface so the supervisor can be exercised with a
//! scripted fake.
//!
//! # Lifecycle
//!
//! ```text
//! OpenVpnProcess::start(basename)
//!   → <config_root>/<basename>/<basename>.ovpn must exist
//!   → spawn `<openvpn> --config <path> --log <log_dir>/openvpn_<basename>.log`
//!   → child keeps running after ovpn-scout exits
//!
//! OpenVpnProcess::stop()
//!   → kill the spawned child, if any
//!   → kill every other client process by name
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::artifacts::{config_path, log_path};
use crate::config::{Config, LogLevel};
use crate::error::{Error, Result};
use crate::plog_fmt;

/// How long [`OpenVpnProcess::stop`] waits for a killed child to exit.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Start/stop primitive for the external VPN client.
#[async_trait]
pub trait VpnClient: Send {
    /// Launches the client on the configuration named `basename`.
    async fn start(&mut self, basename: &str) -> Result<()>;

    /// Stops the client. Stopping a client that is not running succeeds.
    async fn stop(&mut self) -> Result<()>;
}

/// The OpenVPN binary driven as a child process.
#[derive(Debug)]
pub struct OpenVpnProcess {
    binary: PathBuf,
    config_root: PathBuf,
    log_dir: PathBuf,
    child: Option<Child>,
}

impl OpenVpnProcess {
    /// Creates a handle; nothing is spawned yet.
    pub fn new(
        binary: impl Into<PathBuf>,
        config_root: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            config_root: config_root.into(),
            log_dir: log_dir.into(),
            child: None,
        }
    }

    /// Creates a handle using the configured binary and directories.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.openvpn_binary, &config.config_root, &config.log_dir)
    }

    /// The process name used when stopping clients this handle did not spawn.
    pub fn process_name(&self) -> String {
        process_name(&self.binary)
    }

    /// Whether a child spawned by this handle is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }
}

#[async_trait]
impl VpnClient for OpenVpnProcess {
    async fn start(&mut self, basename: &str) -> Result<()> {
        let config = config_path(&self.config_root, basename);
        if !config.is_file() {
            return Err(Error::Launch(format!(
                "Config not found: {}",
                config.display()
            )));
        }
        let log = log_path(&self.log_dir, basename);
        std::fs::create_dir_all(&self.log_dir)?;

        let child = Command::new(&self.binary)
            .arg("--config")
            .arg(&config)
            .arg("--log")
            .arg(&log)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                Error::Launch(format!(
                    "Error launching {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        plog_fmt!(
            LogLevel::Info,
            "Started {} (pid {:?}) on {}",
            self.binary.display(),
            child.id(),
            config.display()
        );
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child.kill().await.ok();
            if tokio::time::timeout(STOP_WAIT, child.wait()).await.is_err() {
                plog_fmt!(
                    LogLevel::Debug,
                    "{} did not exit within {:?} after kill",
                    self.binary.display(),
                    STOP_WAIT
                );
            }
        }
        kill_all(&self.process_name()).await
    }
}

fn process_name(binary: &Path) -> String {
    binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| {
            if cfg!(windows) {
                "openvpn.exe".to_string()
            } else {
                "openvpn".to_string()
            }
        })
}

/// Kills every running process named `name`.
///
/// Finding no such process is not an error.
///
/// # Errors
///
/// Returns [`Error::Launch`] if the kill utility itself cannot be run.
pub async fn kill_all(name: &str) -> Result<()> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("taskkill");
        c.args(["/f", "/im", name]);
        c
    } else {
        let mut c = Command::new("pkill");
        c.args(["-x", name]);
        c
    };

    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Launch(format!("cannot stop {}: {}", name, e)))?;

    plog_fmt!(LogLevel::Debug, "stop {} exited with {}", name, status);
    Ok(())
}

//! On-disk artifacts shared with the OpenVPN client and other processes.
//!
//! | Artifact | Default location | Access |
//! |----------|------------------|--------|
//! | Config files | `~/OpenVPN/config/<basename>/<basename>.ovpn` | written by `download` |
//! | Client log | `~/OpenVPN/log/openvpn_<basename>.log` | read-only, polled |
//! | Blacklist | `~/OpenVPN/blacklist.txt` | append-only, one URL per line |
//! | Status flag | `$TMP/vpn_condition.flag` | overwritten with `false` |
//!
//! The blacklist is never truncated: separate runs append to the same file and
//! a URL may appear more than once.
//!
//! The client log may contain NUL bytes (OpenVPN on Windows writes UTF-16
//! fragments); [`read_log`] strips them before any marker matching.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use url::Url;

use crate::config::LogLevel;
use crate::error::Result;
use crate::plog_fmt;

/// Extension of downloaded client configurations.
pub const CONFIG_EXTENSION: &str = "ovpn";

/// Returns the final path segment of `url` without its extension.
///
/// ```rust
/// use ovpn_scout::artifacts::basename_from_url;
///
/// assert_eq!(
///     basename_from_url("https://listing.example/ovpn/jp-tcp-443.ovpn").as_deref(),
///     Some("jp-tcp-443")
/// );
/// assert_eq!(basename_from_url("https://listing.example/"), None);
/// ```
pub fn basename_from_url(url: &str) -> Option<String> {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed.path_segments()?.last()?.to_string(),
        Err(_) => url.rsplit('/').next()?.to_string(),
    };
    let stem = Path::new(&segment).file_stem()?.to_string_lossy().into_owned();
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Path of the configuration file for `basename` under `config_root`.
pub fn config_path(config_root: &Path, basename: &str) -> PathBuf {
    config_root
        .join(basename)
        .join(format!("{}.{}", basename, CONFIG_EXTENSION))
}

/// Path of the client log for `basename` under `log_dir`.
pub fn log_path(log_dir: &Path, basename: &str) -> PathBuf {
    log_dir.join(format!("openvpn_{}.log", basename))
}

/// Removes every NUL character.
pub fn strip_nul(text: &str) -> String {
    text.replace('\0', "")
}

/// Reads the whole client log as text.
///
/// Invalid UTF-8 is replaced and NUL bytes are removed. A log that cannot be
/// read yields an empty string: the caller treats that as "no marker yet".
pub fn read_log(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => strip_nul(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            plog_fmt!(LogLevel::Debug, "cannot read client log {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Creates `path` (and its parent directories) if it does not exist yet.
///
/// Existing content is left untouched.
pub fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Creates `path` empty, discarding any previous content.
pub fn truncate(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)?;
    Ok(())
}

/// Stores a downloaded configuration under `config_root` and returns its path.
pub fn save_config(config_root: &Path, basename: &str, body: &[u8]) -> Result<PathBuf> {
    let path = config_path(config_root, basename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&path)?;
    file.write_all(body)?;
    file.flush()?;
    Ok(path)
}

/// Append-only record of configuration URLs whose attempts failed.
///
/// # Example
///
/// ```rust,no_run
/// use ovpn_scout::artifacts::Blacklist;
///
/// let blacklist = Blacklist::new("/home/me/OpenVPN/blacklist.txt");
/// blacklist.append("https://listing.example/jp.ovpn")?;
/// assert!(blacklist.load()?.contains("https://listing.example/jp.ovpn"));
/// # Ok::<(), ovpn_scout::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Blacklist {
    path: PathBuf,
}

impl Blacklist {
    /// Creates a handle for the blacklist at `path`. Nothing is touched yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the blacklist file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `url` as one line.
    ///
    /// The file is opened in append mode so concurrent or later runs never
    /// truncate each other's entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be opened or written.
    pub fn append(&self, url: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", url.trim())?;
        file.flush()?;
        Ok(())
    }

    /// Returns every line recorded so far, in file order.
    ///
    /// A missing file is an empty blacklist.
    pub fn entries(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the distinct blacklisted URLs.
    pub fn load(&self) -> Result<HashSet<String>> {
        Ok(self.entries()?.into_iter().collect())
    }

    /// How many times each URL has been recorded.
    pub fn failure_counts(&self) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        for entry in self.entries()? {
            *counts.entry(entry).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Flag file telling other processes whether the tunnel is the active one.
#[derive(Debug, Clone)]
pub struct StatusFlag {
    path: PathBuf,
}

impl StatusFlag {
    /// Creates a handle for the flag at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the flag file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the literal `false`, replacing any previous content.
    ///
    /// The value is written to a sibling temporary file and renamed into
    /// place so readers never observe a half-written flag.
    pub fn write_inactive(&self) -> Result<()> {
        self.write("false")
    }

    fn write(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.flush()?;
        }
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

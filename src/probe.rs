//! Connectivity and public-address probes.
//!
//! Two questions drive supervision: "is there any internet at all?" and
//! "which address does the outside world see?". Both sit behind the
//! [`ConnectivityProbe`] trait so the supervisor can be driven by scripted
//! answers in tests.
//!
//! [`NetProbe`] answers them over the real network:
//!
//! - **Reachability**: a TCP connect to a well-known address (default
//!   `8.8.8.8:53`) within a short timeout.
//! - **Public address**: a plain-text GET against each configured echo
//!   service in order; the first body that parses as an IP address wins.
//!
//! The echo client is built with `no_proxy()` so system proxy settings never
//! mask the address the tunnel actually exposes.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::{Config, ConnectivityConfig, LogLevel};
use crate::error::Result;
use crate::plog_fmt;

/// Source of reachability and public-address observations.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether a well-known external address accepts a TCP connection.
    async fn has_internet(&self) -> bool;

    /// The public address seen by an external echo service.
    ///
    /// Returns `None` when no service answered; callers treat that the same
    /// as an empty address.
    async fn public_address(&self) -> Option<String>;
}

/// Probe backed by real sockets and HTTP requests.
#[derive(Debug, Clone)]
pub struct NetProbe {
    connectivity: ConnectivityConfig,
    services: Vec<String>,
    client: reqwest::Client,
}

impl NetProbe {
    /// Builds a probe from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`](crate::Error::Http) if the HTTP client cannot
    /// be built.
    pub fn new(
        connectivity: ConnectivityConfig,
        services: Vec<String>,
        echo_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(echo_timeout)
            .connect_timeout(echo_timeout)
            .build()?;
        Ok(Self {
            connectivity,
            services,
            client,
        })
    }

    /// Builds a probe from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.connectivity.clone(),
            config.ip_services.clone(),
            config.echo_timeout(),
        )
    }

    async fn query(&self, service: &str) -> Option<String> {
        let response = match self.client.get(service).send().await {
            Ok(response) => response,
            Err(e) => {
                plog_fmt!(LogLevel::Debug, "{} unreachable: {}", service, e);
                return None;
            }
        };
        if !response.status().is_success() {
            plog_fmt!(LogLevel::Debug, "{} answered HTTP {}", service, response.status());
            return None;
        }
        let body = response.text().await.ok()?;
        parse_echo_body(&body)
    }
}

#[async_trait]
impl ConnectivityProbe for NetProbe {
    async fn has_internet(&self) -> bool {
        let target = (self.connectivity.host.as_str(), self.connectivity.port);
        matches!(
            tokio::time::timeout(self.connectivity.timeout(), TcpStream::connect(target)).await,
            Ok(Ok(_))
        )
    }

    async fn public_address(&self) -> Option<String> {
        for service in &self.services {
            if let Some(address) = self.query(service).await {
                return Some(address);
            }
        }
        None
    }
}

/// Extracts the address from an echo-service body.
///
/// The body must be a bare IPv4 or IPv6 address, optionally surrounded by
/// whitespace. Anything else, such as an HTML error page, is rejected.
pub fn parse_echo_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    trimmed.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local(port: u16) -> ConnectivityConfig {
        ConnectivityConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_secs: 1,
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    /// Serves a single plain-text HTTP response per connection.
    async fn echo_server(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/", addr)
    }

    #[test]
    fn test_parse_echo_body() {
        assert_eq!(parse_echo_body("203.0.113.7\n").as_deref(), Some("203.0.113.7"));
        assert_eq!(parse_echo_body(" 2001:db8::1 ").as_deref(), Some("2001:db8::1"));
        assert_eq!(parse_echo_body(""), None);
        assert_eq!(parse_echo_body("<html>rate limited</html>"), None);
    }

    #[tokio::test]
    async fn test_has_internet_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = NetProbe::new(local(port), vec![], Duration::from_secs(1)).unwrap();
        assert!(probe.has_internet().await);
    }

    #[tokio::test]
    async fn test_has_internet_closed_port() {
        let port = closed_port().await;
        let probe = NetProbe::new(local(port), vec![], Duration::from_secs(1)).unwrap();
        assert!(!probe.has_internet().await);
    }

    #[tokio::test]
    async fn test_public_address_falls_through_services() {
        let dead = format!("http://127.0.0.1:{}/", closed_port().await);
        let garbage = echo_server("not an address").await;
        let good = echo_server("198.51.100.23\n").await;
        let probe = NetProbe::new(
            local(closed_port().await),
            vec![dead, garbage, good],
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(probe.public_address().await.as_deref(), Some("198.51.100.23"));
    }

    #[tokio::test]
    async fn test_public_address_none_when_all_fail() {
        let dead = format!("http://127.0.0.1:{}/", closed_port().await);
        let probe =
            NetProbe::new(local(closed_port().await), vec![dead], Duration::from_secs(1)).unwrap();
        assert_eq!(probe.public_address().await, None);
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_real_echo_services() {
        let probe = NetProbe::from_config(&Config::default()).unwrap();
        if probe.has_internet().await {
            assert!(probe.public_address().await.is_some());
        }
    }
}

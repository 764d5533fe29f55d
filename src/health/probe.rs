//! Liveness probes.
//!
//! The checker wraps every probe in its own timeout, so implementations do
//! not need one.

use crate::backend::EndpointId;
use crate::config::{HealthCheckConfig, HealthCheckType};
use std::future::Future;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Reasons a probe can fail.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe timed out")]
    Timeout,

    #[error("empty response")]
    EmptyResponse,

    #[error("invalid HTTP response")]
    InvalidResponse,

    #[error("unexpected status: {status} (expected {expected})")]
    UnexpectedStatus { status: u16, expected: u16 },
}

/// Checks whether an endpoint is alive.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, address: EndpointId) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// Succeeds when a TCP connection can be established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl Probe for TcpProbe {
    async fn probe(&self, address: EndpointId) -> Result<(), ProbeError> {
        TcpStream::connect(address)
            .await
            .map(drop)
            .map_err(ProbeError::Connect)
    }
}

/// Issues `GET path` and expects a given status code.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
    expected_status: u16,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, expected_status: u16) -> Self {
        Self {
            path: path.into(),
            expected_status,
        }
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, address: EndpointId) -> Result<(), ProbeError> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(ProbeError::Connect)?;

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, address
        );
        stream.write_all(request.as_bytes()).await?;

        // Only the status line matters
        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ProbeError::EmptyResponse);
        }

        let status = parse_http_status(&String::from_utf8_lossy(&buf[..n]))?;
        if status == self.expected_status {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus {
                status,
                expected: self.expected_status,
            })
        }
    }
}

/// The probe selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredProbe {
    Tcp(TcpProbe),
    Http(HttpProbe),
}

impl From<&HealthCheckConfig> for ConfiguredProbe {
    fn from(config: &HealthCheckConfig) -> Self {
        match config.check_type {
            HealthCheckType::Tcp => ConfiguredProbe::Tcp(TcpProbe),
            HealthCheckType::Http => ConfiguredProbe::Http(HttpProbe::new(
                config.path.as_deref().unwrap_or("/"),
                config.expected_status,
            )),
        }
    }
}

impl Probe for ConfiguredProbe {
    async fn probe(&self, address: EndpointId) -> Result<(), ProbeError> {
        match self {
            ConfiguredProbe::Tcp(p) => p.probe(address).await,
            ConfiguredProbe::Http(p) => p.probe(address).await,
        }
    }
}

/// Parse HTTP status code from response.
fn parse_http_status(response: &str) -> Result<u16, ProbeError> {
    // Format: "HTTP/1.1 200 OK\r\n..."
    let mut parts = response.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => {
            code.parse().map_err(|_| ProbeError::InvalidResponse)
        }
        _ => Err(ProbeError::InvalidResponse),
    }
}

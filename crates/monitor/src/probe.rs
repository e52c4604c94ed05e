//! Native probe executor

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use monitor_lib::probe::ProbeExecutor;
use monitor_lib::Protocol;
use tokio::net::TcpStream;

const TCP_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Measures TCP connect time, or HTTP round-trip time for web targets
pub struct NativeProbeExecutor {
    http: reqwest::Client,
}

impl NativeProbeExecutor {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    async fn resolve(hostname: &str, port: u16) -> Result<SocketAddr> {
        let lookup = tokio::time::timeout(TCP_TIMEOUT, tokio::net::lookup_host((hostname, port)))
            .await
            .map_err(|_| anyhow!("DNS lookup for {} timed out", hostname))?;
        lookup
            .map_err(|e| anyhow!("DNS resolution failed for {}: {}", hostname, e))?
            .next()
            .ok_or_else(|| anyhow!("DNS resolution returned no address for {}", hostname))
    }

    async fn tcp(&self, hostname: &str, port: u16) -> Result<f64> {
        let addr = Self::resolve(hostname, port).await?;

        let started = Instant::now();
        match tokio::time::timeout(TCP_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(started.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => Err(anyhow!("{} ({}:{})", e, hostname, port)),
            Err(_) => Err(anyhow!(
                "Connection to {}:{} timed out after {}s",
                hostname,
                port,
                TCP_TIMEOUT.as_secs()
            )),
        }
    }

    async fn http(&self, scheme: &str, hostname: &str, port: u16) -> Result<f64> {
        let url = format!("{}://{}:{}/", scheme, hostname, port);

        let started = Instant::now();
        match self.http.get(&url).send().await {
            // any status proves the service answered
            Ok(_response) => Ok(started.elapsed().as_secs_f64() * 1000.0),
            Err(e) if e.is_timeout() => Err(anyhow!(
                "Request to {} timed out after {}s",
                url,
                HTTP_TIMEOUT.as_secs()
            )),
            Err(e) if e.is_connect() => Err(anyhow!("Network connect to {} failed: {:#}", url, e)),
            Err(e) => Err(anyhow!("Request to {} failed: {:#}", url, e)),
        }
    }
}

#[async_trait]
impl ProbeExecutor for NativeProbeExecutor {
    async fn probe(&self, hostname: &str, port: u16, protocol: Protocol) -> Result<f64> {
        match protocol {
            Protocol::Tcp => self.tcp(hostname, port).await,
            Protocol::Http => self.http("http", hostname, port).await,
            Protocol::Https => self.http("https", hostname, port).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::ProbeErrorKind;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_measures_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let executor = NativeProbeExecutor::new().unwrap();
        let latency = executor.probe("127.0.0.1", port, Protocol::Tcp).await.unwrap();
        assert!(latency >= 0.0);
        assert!(latency < TCP_TIMEOUT.as_secs_f64() * 1000.0);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        // bind then drop so the port is closed
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let executor = NativeProbeExecutor::new().unwrap();
        let err = executor
            .probe("127.0.0.1", port, Protocol::Tcp)
            .await
            .unwrap_err();
        assert_eq!(ProbeErrorKind::classify(&err.to_string()), ProbeErrorKind::Refused);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_dns_failure() {
        let executor = NativeProbeExecutor::new().unwrap();
        let err = executor
            .probe("does-not-exist.invalid", 443, Protocol::Tcp)
            .await
            .unwrap_err();
        assert_eq!(ProbeErrorKind::classify(&err.to_string()), ProbeErrorKind::Dns);
    }
}

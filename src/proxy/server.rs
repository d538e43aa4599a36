//! Local intercepting proxy server.
//!
//! The server:
//! - Listens on a loopback TCP port that the PAC script points blocked hosts at
//! - Handles each accepted connection in its own Tokio task
//! - Reports blocked requests through a callback
//!
//! Binding happens in [`InterceptingProxy::start`] so that a port conflict is
//! reported to the caller as [`ProxyError::Bind`] before anything else runs.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::proxy::{InterceptingProxy, ProxyConfig};
//! use std::sync::Arc;
//!
//! let mut proxy = InterceptingProxy::new(
//!     ProxyConfig::default(),
//!     Arc::new(move |host: &str| blocklist.is_host_blocked(host)),
//!     Arc::new(|hit| println!("blocked {}", hit.host)),
//! );
//! let addr = proxy.start().await?;
//!
//! // To shutdown:
//! proxy.stop().await;
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::connect::{
    ConnectionOutcome, ConnectionPolicy, HitHook, HostPredicate, RequestLimits, handle_connection,
};
use super::error::ProxyError;
use crate::config::{DEFAULT_HEADER_LIMIT, DEFAULT_PROXY_PORT, DEFAULT_REQUEST_LINE_LIMIT, ProxySettings};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub listen_addr: SocketAddr,
    /// Bound on the request line, in bytes.
    pub request_line_limit: usize,
    /// Bound on the header block, in bytes.
    pub header_limit: usize,
    /// Bound on waiting for a client's request head.
    pub read_timeout: Duration,
    /// Relay unblocked traffic instead of closing it.
    pub forward_unblocked: bool,
}

impl ProxyConfig {
    /// Build from the `[proxy]` config section. Always listens on loopback.
    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, settings.port())),
            request_line_limit: settings.request_line_limit(),
            header_limit: settings.header_limit(),
            read_timeout: settings.read_timeout(),
            forward_unblocked: settings.forward_unblocked(),
        }
    }

    /// Same configuration on a different port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_addr.set_port(port);
        self
    }

    fn limits(&self) -> RequestLimits {
        RequestLimits {
            request_line_limit: self.request_line_limit.max(DEFAULT_REQUEST_LINE_LIMIT),
            header_limit: self.header_limit.max(DEFAULT_HEADER_LIMIT),
            read_timeout: self.read_timeout,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PROXY_PORT)),
            request_line_limit: DEFAULT_REQUEST_LINE_LIMIT,
            header_limit: DEFAULT_HEADER_LIMIT,
            read_timeout: Duration::from_secs(5),
            forward_unblocked: false,
        }
    }
}

/// Accept loop handle of a started proxy.
struct RunningProxy {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Block-first HTTP proxy.
pub struct InterceptingProxy {
    config: ProxyConfig,
    is_blocked: HostPredicate,
    on_blocked_hit: HitHook,
    running: Option<RunningProxy>,
}

impl InterceptingProxy {
    /// Create a stopped proxy.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address and request bounds.
    /// * `is_blocked` - Read-only host check, shared by every connection.
    /// * `on_blocked_hit` - Called once per blocked request, possibly concurrently.
    pub fn new(config: ProxyConfig, is_blocked: HostPredicate, on_blocked_hit: HitHook) -> Self {
        Self {
            config,
            is_blocked,
            on_blocked_hit,
            running: None,
        }
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Calling this while running returns the existing address.
    pub async fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if let Some(running) = &self.running {
            return Ok(running.local_addr);
        }

        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: self.config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let policy = Arc::new(ConnectionPolicy {
            is_blocked: self.is_blocked.clone(),
            on_blocked_hit: self.on_blocked_hit.clone(),
            limits: self.config.limits(),
            forward_unblocked: self.config.forward_unblocked,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, policy, shutdown_rx));

        info!("Proxy listening on {}", local_addr);
        self.running = Some(RunningProxy {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting, drop in-flight connections and release the port.
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.task.await
            && !e.is_cancelled()
        {
            warn!("Proxy accept loop ended abnormally: {}", e);
        }
        info!("Proxy on {} stopped", running.local_addr);
    }
}

impl Drop for InterceptingProxy {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown_tx.send(true);
            running.task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    policy: Arc<ConnectionPolicy>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let policy = policy.clone();
                        connections.spawn(async move {
                            log_outcome(&handle_connection(stream, &policy).await);
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        if accept_backoff(&mut shutdown_rx).await {
                            break;
                        }
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Proxy received shutdown signal");
                    break;
                }
            }
        }
    }

    // In-flight connections are closed abruptly
    connections.shutdown().await;
}

/// Pause after a failed accept so fd exhaustion does not spin the loop.
///
/// Returns `true` if shutdown was requested meanwhile.
async fn accept_backoff(shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => false,
        _ = shutdown_rx.wait_for(|stop| *stop) => true,
    }
}

fn log_outcome(outcome: &ConnectionOutcome) {
    match outcome {
        ConnectionOutcome::Blocked(hit) => debug!("Blocked {} via {:?}", hit.host, hit.via),
        ConnectionOutcome::Closed { host } => debug!("Closed unblocked request to {}", host),
        ConnectionOutcome::Forwarded { host } => debug!("Relayed traffic for {}", host),
        ConnectionOutcome::Rejected { reason } => debug!("Rejected connection: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::connect::BlockedHit;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_accept_backoff_waits_before_retry() {
        let (_tx, mut rx) = watch::channel(false);
        let started = std::time::Instant::now();

        assert!(!accept_backoff(&mut rx).await);
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_accept_backoff_ends_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(ACCEPT_BACKOFF / 2, accept_backoff(&mut rx)).await;
        assert_eq!(stopped.ok(), Some(true));
    }

    fn test_proxy() -> InterceptingProxy {
        InterceptingProxy::new(
            ProxyConfig::default().with_port(0),
            Arc::new(|host: &str| host == "blocked.com"),
            Arc::new(|_: &BlockedHit| {}),
        )
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ProxySettings {
            port: Some(9999),
            forward_unblocked: Some(true),
            ..Default::default()
        };
        let config = ProxyConfig::from_settings(&settings);

        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());
        assert!(config.forward_unblocked);
        assert_eq!(config.request_line_limit, 2048);
    }

    #[tokio::test]
    async fn test_start_binds_and_stop_releases() {
        let mut proxy = test_proxy();
        let addr = proxy.start().await.unwrap();
        assert!(proxy.is_running());
        assert_eq!(proxy.local_addr(), Some(addr));

        // Second start is a no-op
        assert_eq!(proxy.start().await.unwrap(), addr);

        proxy.stop().await;
        assert!(!proxy.is_running());
        proxy.stop().await;

        // Port is free again
        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut proxy = InterceptingProxy::new(
            ProxyConfig::default().with_port(port),
            Arc::new(|_: &str| false),
            Arc::new(|_: &BlockedHit| {}),
        );

        let result = proxy.start().await;
        assert!(matches!(result, Err(ProxyError::Bind { .. })));
        assert!(!proxy.is_running());
    }

    #[tokio::test]
    async fn test_serves_concurrent_connections() {
        let mut proxy = test_proxy();
        let addr = proxy.start().await.unwrap();

        // A silent client must not hold up others
        let _idle = TcpStream::connect(addr).await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: blocked.com\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(response.starts_with(b"HTTP/1.1 403 Forbidden"));
        proxy.stop().await;
    }
}

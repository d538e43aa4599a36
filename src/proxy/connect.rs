//! Per-connection request handling.
//!
//! Each accepted connection walks one state machine:
//!
//! ```text
//! AwaitingRequestLine ─┬─ CONNECT host:port ──┐
//!                      └─ METHOD target ──────┤
//!                                             ├─ blocked ───► hit, close (CONNECT) or 403 (plain)
//!                                             ├─ unblocked ─► close, or relay when forwarding
//!                                             └─ malformed ─► close
//! ```
//!
//! Request heads are read into a bounded buffer. A request line that is not
//! terminated within `request_line_limit` bytes, or a header block longer than
//! `header_limit` bytes, rejects the connection.
//!
//! A blocked `CONNECT` is dropped without a single byte written back. A blocked
//! plain request gets exactly [`FORBIDDEN_RESPONSE`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::error::ProxyError;
use crate::config::{DEFAULT_HEADER_LIMIT, DEFAULT_REQUEST_LINE_LIMIT};
use crate::telemetry::HitSource;

/// Literal response for a blocked plain HTTP request.
pub const FORBIDDEN_RESPONSE: &[u8] =
    b"HTTP/1.1 403 Forbidden\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Response that opens a relayed tunnel.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Largest single read from a client socket.
const READ_CHUNK: usize = 4096;

/// Callback deciding whether a host is blocked.
pub type HostPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback invoked for every blocked request. Called concurrently.
pub type HitHook = Arc<dyn Fn(&BlockedHit) + Send + Sync>;

/// A blocked request observed by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedHit {
    /// Host that was requested.
    pub host: String,
    /// How it was requested.
    pub via: HitSource,
}

/// Buffer and time bounds for reading a request head.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    /// Bound on the request line.
    pub request_line_limit: usize,
    /// Bound on the header block.
    pub header_limit: usize,
    /// Bound on waiting for the request head.
    pub read_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            request_line_limit: DEFAULT_REQUEST_LINE_LIMIT,
            header_limit: DEFAULT_HEADER_LIMIT,
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a connection handler needs. Shared read-only across connections.
#[derive(Clone)]
pub struct ConnectionPolicy {
    /// Blocked-host check.
    pub is_blocked: HostPredicate,
    /// Blocked-hit callback.
    pub on_blocked_hit: HitHook,
    /// Request head bounds.
    pub limits: RequestLimits,
    /// Relay unblocked traffic instead of closing.
    pub forward_unblocked: bool,
}

/// Final state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Host was blocked.
    Blocked(BlockedHit),
    /// Host was not blocked and the connection was closed.
    Closed {
        /// Requested host.
        host: String,
    },
    /// Host was not blocked and traffic was relayed upstream.
    Forwarded {
        /// Requested host.
        host: String,
    },
    /// The request head was malformed, oversized, or never arrived.
    Rejected {
        /// Why.
        reason: String,
    },
}

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    /// `CONNECT host:port HTTP/1.x`
    Tunnel {
        /// Lowercased target host.
        host: String,
        /// Target port. `None` when the port is present but not a valid number.
        port: Option<u16>,
    },
    /// Any other method.
    Plain {
        /// Request method.
        method: String,
        /// Request target (origin-form or absolute-form).
        target: String,
    },
}

/// Parse the first line of a proxied request.
pub fn parse_request_line(line: &str) -> Result<RequestLine, ProxyError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ProxyError::MalformedRequest("empty request line".to_string()))?;
    let target = parts.next().ok_or_else(|| {
        ProxyError::MalformedRequest(format!("missing request target in {:?}", line))
    })?;

    if method == "CONNECT" {
        let (host, port) = split_host_port(target, 443)?;
        if host.is_empty() {
            return Err(ProxyError::MalformedRequest(format!(
                "CONNECT without host: {:?}",
                target
            )));
        }
        Ok(RequestLine::Tunnel {
            host: host.to_ascii_lowercase(),
            port,
        })
    } else {
        Ok(RequestLine::Plain {
            method: method.to_string(),
            target: target.to_string(),
        })
    }
}

/// Parse a header block.
///
/// The block ends at the first empty line. Each line is split at its first
/// colon; keys are lowercased and values kept verbatim. Lines without a colon
/// are ignored.
pub fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for row in block.split('\n') {
        let row = row.strip_suffix('\r').unwrap_or(row);
        if row.is_empty() {
            break;
        }
        if let Some((key, value)) = row.split_once(':') {
            headers.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }
    headers
}

/// Host and port a plain request is addressed to.
///
/// Uses the `Host` header (trimmed, lowercased) and falls back to the
/// authority of an absolute-form target. The port is `None` when present but
/// not a valid number.
pub fn request_authority(
    headers: &HashMap<String, String>,
    target: &str,
) -> Option<(String, Option<u16>)> {
    let from_header = headers
        .get("host")
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    let authority = match from_header {
        Some(host) => host,
        None => absolute_authority(target)?.to_ascii_lowercase(),
    };

    split_host_port(&authority, 80)
        .ok()
        .filter(|(host, _)| !host.is_empty())
}

/// Authority section of an absolute-form URI, without userinfo.
fn absolute_authority(target: &str) -> Option<&str> {
    let (_, rest) = target.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
    if authority.is_empty() { None } else { Some(authority) }
}

/// Split `host:port`, `host`, `[v6]:port` or `[v6]`.
///
/// The host is taken even when the port is unusable, so a blocked host is
/// still recognized. Examples:
/// - `example.com:443` -> ("example.com", Some(443))
/// - `example.com` -> ("example.com", Some(default_port))
/// - `example.com:99999` -> ("example.com", None)
/// - `[::1]:8443` -> ("::1", Some(8443))
fn split_host_port(
    authority: &str,
    default_port: u16,
) -> Result<(String, Option<u16>), ProxyError> {
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| {
            ProxyError::MalformedRequest(format!("Unterminated IPv6 literal: {}", authority))
        })?;
        match after.strip_prefix(':') {
            Some(p) => (host, p.parse::<u16>().ok()),
            None if after.is_empty() => (host, Some(default_port)),
            None => (host, None),
        }
    } else {
        match authority.split_once(':') {
            Some((host, p)) => (host, p.parse::<u16>().ok()),
            None => (authority, Some(default_port)),
        }
    };
    Ok((host.to_string(), port))
}

fn invalid_port(host: &str) -> ProxyError {
    ProxyError::MalformedRequest(format!("Invalid port for {}", host))
}

/// Read a client request head into `buf`, chunk by chunk.
///
/// Never lets `buf` grow beyond `max_total` bytes.
async fn read_chunk<S>(stream: &mut S, buf: &mut BytesMut, max_total: usize) -> Result<usize, ProxyError>
where
    S: AsyncRead + Unpin,
{
    let room = max_total.saturating_sub(buf.len()).min(READ_CHUNK);
    if room == 0 {
        return Err(ProxyError::RequestTooLarge { limit: max_total });
    }
    let mut chunk = [0u8; READ_CHUNK];
    let n = stream.read(&mut chunk[..room]).await?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

/// Position just past the first `\n` within `limit` bytes.
fn find_line_end(buf: &[u8], limit: usize) -> Option<usize> {
    let window = &buf[..buf.len().min(limit)];
    window.iter().position(|b| *b == b'\n').map(|i| i + 1)
}

/// Offset just past the blank line ending a header block starting at `buf[0]`.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(i) = buf[start..].iter().position(|b| *b == b'\n') {
        let line = &buf[start..start + i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Some(start + i + 1);
        }
        start += i + 1;
    }
    None
}

/// Read until the request line is complete. Returns the line and its end offset.
async fn read_request_line<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    limits: &RequestLimits,
) -> Result<(String, usize), ProxyError>
where
    S: AsyncRead + Unpin,
{
    let max_total = limits.request_line_limit + limits.header_limit;
    let end = loop {
        if let Some(end) = find_line_end(buf, limits.request_line_limit) {
            break end;
        }
        if buf.len() >= limits.request_line_limit {
            return Err(ProxyError::RequestTooLarge {
                limit: limits.request_line_limit,
            });
        }
        if read_chunk(stream, buf, max_total).await? == 0 {
            return Err(ProxyError::MalformedRequest(
                "connection closed before end of request line".to_string(),
            ));
        }
    };

    let line = std::str::from_utf8(&buf[..end])
        .map_err(|_| ProxyError::MalformedRequest("request line is not UTF-8".to_string()))?
        .trim_end_matches(['\r', '\n'])
        .to_string();
    Ok((line, end))
}

/// Read the header block that starts at `start`. Returns headers and the block end.
///
/// A client that closes before the blank line gets whatever headers arrived.
async fn read_header_block<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    start: usize,
    limits: &RequestLimits,
) -> Result<(HashMap<String, String>, usize), ProxyError>
where
    S: AsyncRead + Unpin,
{
    let max_total = limits.request_line_limit + limits.header_limit;
    loop {
        let pending = &buf[start..];
        if let Some(end) = find_header_end(pending) {
            if end > limits.header_limit {
                return Err(ProxyError::RequestTooLarge {
                    limit: limits.header_limit,
                });
            }
            let headers = parse_headers(&String::from_utf8_lossy(&pending[..end]));
            return Ok((headers, start + end));
        }
        if pending.len() >= limits.header_limit {
            return Err(ProxyError::RequestTooLarge {
                limit: limits.header_limit,
            });
        }
        if read_chunk(stream, buf, max_total).await? == 0 {
            let headers = parse_headers(&String::from_utf8_lossy(&buf[start..]));
            return Ok((headers, buf.len()));
        }
    }
}

/// Handle one client connection to completion.
///
/// Never returns an error: every failure becomes [`ConnectionOutcome::Rejected`]
/// so one bad client cannot affect the accept loop.
pub async fn handle_connection<S>(mut stream: S, policy: &ConnectionPolicy) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match serve(&mut stream, policy).await {
        Ok(outcome) => outcome,
        Err(e) => ConnectionOutcome::Rejected {
            reason: e.to_string(),
        },
    }
}

async fn serve<S>(stream: &mut S, policy: &ConnectionPolicy) -> Result<ConnectionOutcome, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = policy.limits;
    let mut buf = BytesMut::with_capacity(1024);

    let (line, line_end) = with_timeout(
        limits.read_timeout,
        read_request_line(stream, &mut buf, &limits),
    )
    .await?;

    match parse_request_line(&line)? {
        RequestLine::Tunnel { host, port } => {
            debug!("CONNECT request to {} (port {:?})", host, port);

            if (policy.is_blocked)(&host) {
                info!("Blocking tunnel to {}", host);
                let hit = BlockedHit {
                    host,
                    via: HitSource::ProxyConnect,
                };
                (policy.on_blocked_hit)(&hit);
                return Ok(ConnectionOutcome::Blocked(hit));
            }

            let Some(port) = port else {
                return Err(invalid_port(&host));
            };
            if !policy.forward_unblocked {
                return Ok(ConnectionOutcome::Closed { host });
            }

            let (_, head_end) = with_timeout(
                limits.read_timeout,
                read_header_block(stream, &mut buf, line_end, &limits),
            )
            .await?;

            stream.write_all(CONNECTION_ESTABLISHED).await?;
            relay(stream, &host, port, &buf[head_end..]).await?;
            Ok(ConnectionOutcome::Forwarded { host })
        }
        RequestLine::Plain { method, target } => {
            let (headers, _) = with_timeout(
                limits.read_timeout,
                read_header_block(stream, &mut buf, line_end, &limits),
            )
            .await?;

            let Some((host, port)) = request_authority(&headers, &target) else {
                return Err(ProxyError::MalformedRequest(format!(
                    "{} {} has no host",
                    method, target
                )));
            };
            debug!("{} request to {}", method, host);

            if (policy.is_blocked)(&host) {
                info!("Blocking HTTP request to {}", host);
                let hit = BlockedHit {
                    host,
                    via: HitSource::ProxyHttp,
                };
                (policy.on_blocked_hit)(&hit);
                // A client that already hung up was still blocked
                if let Err(e) = stream.write_all(FORBIDDEN_RESPONSE).await {
                    debug!("Could not send 403 to client: {}", e);
                } else if let Err(e) = stream.shutdown().await {
                    debug!("Could not close client after 403: {}", e);
                }
                return Ok(ConnectionOutcome::Blocked(hit));
            }

            let Some(port) = port else {
                return Err(invalid_port(&host));
            };
            if !policy.forward_unblocked {
                return Ok(ConnectionOutcome::Closed { host });
            }

            relay(stream, &host, port, &buf).await?;
            Ok(ConnectionOutcome::Forwarded { host })
        }
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ProxyError>>,
) -> Result<T, ProxyError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProxyError::Timeout)?
}

/// Connect upstream, replay `preface`, then copy both directions until either side closes.
async fn relay<S>(client: &mut S, host: &str, port: u16, preface: &[u8]) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let addr = if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };

    let mut upstream = TcpStream::connect(&addr)
        .await
        .map_err(|e| ProxyError::UpstreamConnect {
            addr: addr.clone(),
            message: e.to_string(),
        })?;

    if !preface.is_empty() {
        upstream.write_all(preface).await?;
    }

    let (up, down) = tokio::io::copy_bidirectional(client, &mut upstream).await?;
    debug!("Relay to {} closed ({} bytes up, {} bytes down)", addr, up, down);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::duplex;

    fn policy_blocking(domains: &'static [&'static str]) -> (ConnectionPolicy, Arc<Mutex<Vec<BlockedHit>>>) {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = hits.clone();
        let policy = ConnectionPolicy {
            is_blocked: Arc::new(move |host: &str| domains.contains(&host)),
            on_blocked_hit: Arc::new(move |hit: &BlockedHit| sink.lock().unwrap().push(hit.clone())),
            limits: RequestLimits {
                read_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            forward_unblocked: false,
        };
        (policy, hits)
    }

    /// Send `request` and collect everything the handler writes back.
    async fn exchange(policy: &ConnectionPolicy, request: &[u8]) -> (ConnectionOutcome, Vec<u8>) {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(request).await.unwrap();

        let outcome = handle_connection(server, policy).await;

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        (outcome, response)
    }

    #[test]
    fn test_parse_connect_line() {
        let line = parse_request_line("CONNECT Evil.com:443 HTTP/1.1").unwrap();
        assert_eq!(
            line,
            RequestLine::Tunnel {
                host: "evil.com".to_string(),
                port: Some(443)
            }
        );
    }

    #[test]
    fn test_parse_connect_ipv6() {
        let line = parse_request_line("CONNECT [::1]:8443 HTTP/1.1").unwrap();
        assert_eq!(
            line,
            RequestLine::Tunnel {
                host: "::1".to_string(),
                port: Some(8443)
            }
        );
    }

    #[test]
    fn test_parse_connect_invalid_port_keeps_host() {
        for line in ["CONNECT evil.com:https HTTP/1.1", "CONNECT Evil.com:99999 HTTP/1.1"] {
            assert_eq!(
                parse_request_line(line).unwrap(),
                RequestLine::Tunnel {
                    host: "evil.com".to_string(),
                    port: None
                }
            );
        }
        assert!(parse_request_line("CONNECT [::1 HTTP/1.1").is_err());
    }

    #[test]
    fn test_parse_plain_line() {
        let line = parse_request_line("GET http://example.com/ HTTP/1.1").unwrap();
        assert!(matches!(line, RequestLine::Plain { ref method, .. } if method == "GET"));
    }

    #[test]
    fn test_parse_empty_line_fails() {
        assert!(parse_request_line("").is_err());
        assert!(parse_request_line("GET").is_err());
    }

    #[test]
    fn test_parse_headers_stops_at_blank_line() {
        let headers = parse_headers("Host:  Example.com \r\nX-Test: a:b\r\n\r\nBody: nope\r\n");
        assert_eq!(headers.get("host").unwrap(), "  Example.com ");
        assert_eq!(headers.get("x-test").unwrap(), " a:b");
        assert!(!headers.contains_key("body"));
    }

    #[test]
    fn test_request_authority_prefers_host_header() {
        let headers = parse_headers("HOST: Evil.com:8080\r\n\r\n");
        assert_eq!(
            request_authority(&headers, "/"),
            Some(("evil.com".to_string(), Some(8080)))
        );
    }

    #[test]
    fn test_request_authority_falls_back_to_absolute_uri() {
        let headers = HashMap::new();
        assert_eq!(
            request_authority(&headers, "http://user@News.example.com/path"),
            Some(("news.example.com".to_string(), Some(80)))
        );
        assert_eq!(request_authority(&headers, "/relative"), None);
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"\r\n"), Some(2));
        assert_eq!(find_header_end(b"Host: a\r\n\r\nrest"), Some(11));
        assert_eq!(find_header_end(b"Host: a\n\n"), Some(9));
        assert_eq!(find_header_end(b"Host: a\r\n"), None);
    }

    #[tokio::test]
    async fn test_blocked_connect_sends_nothing() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let (outcome, response) =
            exchange(&policy, b"CONNECT evil.com:443 HTTP/1.1\r\nHost: evil.com:443\r\n\r\n").await;

        assert!(response.is_empty());
        assert!(matches!(outcome, ConnectionOutcome::Blocked(_)));
        let hits = hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].via, HitSource::ProxyConnect);
    }

    #[tokio::test]
    async fn test_blocked_http_gets_literal_403() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let (outcome, response) =
            exchange(&policy, b"GET / HTTP/1.1\r\nHost: Evil.com\r\n\r\n").await;

        assert_eq!(response, FORBIDDEN_RESPONSE);
        assert!(matches!(outcome, ConnectionOutcome::Blocked(_)));
        assert_eq!(hits.lock().unwrap()[0].via, HitSource::ProxyHttp);
    }

    #[tokio::test]
    async fn test_unblocked_hosts_close_without_hit() {
        let (policy, hits) = policy_blocking(&["evil.com"]);

        let (outcome, response) =
            exchange(&policy, b"CONNECT fine.org:443 HTTP/1.1\r\n\r\n").await;
        assert!(response.is_empty());
        assert_eq!(
            outcome,
            ConnectionOutcome::Closed {
                host: "fine.org".to_string()
            }
        );

        let (outcome, response) =
            exchange(&policy, b"GET / HTTP/1.1\r\nHost: fine.org\r\n\r\n").await;
        assert!(response.is_empty());
        assert!(matches!(outcome, ConnectionOutcome::Closed { .. }));

        assert!(hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_line_is_rejected() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let request = vec![b'A'; 3000];

        let (outcome, response) = exchange(&policy, &request).await;

        assert!(response.is_empty());
        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
        assert!(hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_header_block_is_rejected() {
        let (policy, _) = policy_blocking(&["evil.com"]);
        let mut request = b"GET / HTTP/1.1\r\nHost: evil.com\r\n".to_vec();
        for i in 0..400 {
            request.extend_from_slice(format!("X-Pad-{}: {}\r\n", i, "x".repeat(20)).as_bytes());
        }
        request.extend_from_slice(b"\r\n");

        let (outcome, response) = exchange(&policy, &request).await;

        assert!(response.is_empty());
        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let (policy, _) = policy_blocking(&["evil.com"]);
        let (_client, server) = duplex(1024);

        let outcome = handle_connection(server, &policy).await;
        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_blocked_host_with_bad_port_is_still_a_hit() {
        let (policy, hits) = policy_blocking(&["evil.com"]);

        let (outcome, response) =
            exchange(&policy, b"CONNECT evil.com:99999 HTTP/1.1\r\n\r\n").await;
        assert!(response.is_empty());
        assert!(matches!(outcome, ConnectionOutcome::Blocked(_)));

        let (outcome, response) =
            exchange(&policy, b"GET / HTTP/1.1\r\nHost: evil.com:http\r\n\r\n").await;
        assert_eq!(response, FORBIDDEN_RESPONSE);
        assert!(matches!(outcome, ConnectionOutcome::Blocked(_)));

        assert_eq!(hits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unblocked_host_with_bad_port_is_rejected() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let (outcome, _) = exchange(&policy, b"CONNECT fine.org:abc HTTP/1.1\r\n\r\n").await;

        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
        assert!(hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_outcome_survives_client_hangup() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let (mut client, server) = duplex(1024);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: evil.com\r\n\r\n")
            .await
            .unwrap();
        drop(client);

        let outcome = handle_connection(server, &policy).await;
        assert!(matches!(outcome, ConnectionOutcome::Blocked(_)));
        assert_eq!(hits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_host_is_rejected() {
        let (policy, hits) = policy_blocking(&["evil.com"]);
        let (outcome, _) = exchange(&policy, b"GET / HTTP/1.1\r\n\r\n").await;

        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
        assert!(hits.lock().unwrap().is_empty());
    }
}

//! SSRF-hardened outbound HTTP. Every network read in the crate goes
//! through an [`HttpFetch`]; production uses [`FetchGuard`].

pub mod policy;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::cancel::Cancellation;
use crate::error::FetchError;

pub const USER_AGENT: &str = "feed-radar/1.0";
pub const DEFAULT_MAX_BYTES: usize = 2_000_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
/// The client cache is dropped wholesale past this many entries.
const MAX_CACHED_CLIENTS: usize = 256;

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_requests_total", "Outbound fetches attempted.");
        describe_counter!(
            "fetch_blocked_total",
            "Outbound fetches rejected by URL or host policy."
        );
        describe_histogram!("fetch_bytes", "Response body size in bytes.");
    });
}

/// Anything that can GET a URL and hand back the body.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, cancel: &Cancellation) -> Result<Vec<u8>, FetchError>;
}

/// Byte and time budget plus host allowlist for the guard.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub max_bytes: usize,
    /// Whole-request budget, body included.
    pub timeout: Duration,
    /// Budget for the response headers to arrive.
    pub header_timeout: Duration,
    /// Empty means any public host.
    pub allowed_hosts: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: DEFAULT_TIMEOUT,
            header_timeout: DEFAULT_TIMEOUT,
            allowed_hosts: Vec::new(),
        }
    }
}

/// A URL that passed every gate, with the addresses it must connect to.
#[derive(Debug, Clone)]
pub struct VettedTarget {
    pub url: Url,
    pub host: String,
    /// Empty for IP-literal hosts.
    pub pinned: Vec<SocketAddr>,
}

/// Host plus sorted pinned addresses.
type ClientKey = (String, Vec<SocketAddr>);

#[derive(Debug, Clone, Default)]
pub struct FetchGuard {
    settings: FetchSettings,
    clients: Arc<Mutex<HashMap<ClientKey, reqwest::Client>>>,
}

impl FetchGuard {
    pub fn new(settings: FetchSettings) -> Self {
        ensure_metrics_described();
        Self {
            settings,
            clients: Arc::default(),
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Run the URL, host and address gates. DNS observes `cancel`.
    pub async fn vet(&self, raw_url: &str, cancel: &Cancellation) -> Result<VettedTarget, FetchError> {
        let url = policy::check_url_shape(raw_url)?;
        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| FetchError::InvalidUrl("missing host".into()))?;

        policy::check_host(&host, &self.settings.allowed_hosts)?;

        if let Some(ip) = policy::literal_ip(&url) {
            if policy::is_blocked_ip(ip) {
                return Err(FetchError::DisallowedHost(format!("blocked address: {ip}")));
            }
            return Ok(VettedTarget {
                url,
                host,
                pinned: Vec::new(),
            });
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let lookup_host = host.clone();
        let addrs: Vec<SocketAddr> = cancel
            .run(async move {
                tokio::net::lookup_host((lookup_host.as_str(), port))
                    .await
                    .map(|it| it.collect())
                    .map_err(|e| FetchError::InvalidUrl(format!("dns lookup failed: {e}")))
            })
            .await?;

        if addrs.is_empty() {
            return Err(FetchError::InvalidUrl(format!("no addresses for {host}")));
        }
        if let Some(bad) = addrs.iter().find(|a| policy::is_blocked_ip(a.ip())) {
            return Err(FetchError::DisallowedHost(format!(
                "{host} resolves to blocked address {}",
                bad.ip()
            )));
        }

        Ok(VettedTarget {
            url,
            host,
            pinned: addrs,
        })
    }

    /// Clients are reused per host and pinned address set, so connection
    /// pools and TLS config survive across runs.
    fn client_for(&self, target: &VettedTarget) -> Result<reqwest::Client, FetchError> {
        let mut pinned = target.pinned.clone();
        pinned.sort();
        pinned.dedup();
        let key = (target.host.clone(), pinned);

        if let Some(client) = self.clients.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(client);
        }

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.settings.timeout)
            .connect_timeout(self.settings.header_timeout)
            .user_agent(USER_AGENT);
        if !key.1.is_empty() {
            builder = builder.resolve_to_addrs(&key.0, &key.1);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(format!("client build: {e}")))?;

        if let Ok(mut cache) = self.clients.lock() {
            if cache.len() >= MAX_CACHED_CLIENTS {
                cache.clear();
            }
            cache.insert(key, client.clone());
        }
        Ok(client)
    }

    async fn fetch(&self, raw_url: &str, cancel: &Cancellation) -> Result<Vec<u8>, FetchError> {
        let target = self.vet(raw_url, cancel).await?;
        self.fetch_vetted(&target, cancel).await
    }

    /// GET an already vetted target: no redirects, header and total
    /// timeouts, body capped at `max_bytes`.
    async fn fetch_vetted(&self, target: &VettedTarget, cancel: &Cancellation) -> Result<Vec<u8>, FetchError> {
        let client = self.client_for(target)?;
        let max = self.settings.max_bytes;
        let header_timeout = self.settings.header_timeout;

        let mut resp = cancel
            .run(async {
                match tokio::time::timeout(header_timeout, client.get(target.url.clone()).send()).await {
                    Ok(r) => r.map_err(FetchError::from),
                    Err(_) => Err(FetchError::Timeout),
                }
            })
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        check_content_length(resp.content_length(), max)?;

        let mut body = Vec::new();
        loop {
            let chunk = cancel
                .run(async { resp.chunk().await.map_err(FetchError::from) })
                .await?;
            match chunk {
                Some(bytes) => append_capped(&mut body, &bytes, max)?,
                None => break,
            }
        }

        histogram!("fetch_bytes").record(body.len() as f64);
        debug!(url = %target.url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[async_trait]
impl HttpFetch for FetchGuard {
    async fn get(&self, url: &str, cancel: &Cancellation) -> Result<Vec<u8>, FetchError> {
        counter!("fetch_requests_total").increment(1);
        let out = self.fetch(url, cancel).await;
        if let Err(e) = &out {
            if e.is_blocked() {
                counter!("fetch_blocked_total").increment(1);
            }
            warn!(url, error = %e, "fetch failed");
        }
        out
    }
}

/// Fail early when the server announces a body above the ceiling.
pub fn check_content_length(announced: Option<u64>, max: usize) -> Result<(), FetchError> {
    match announced {
        Some(n) if n > max as u64 => Err(FetchError::SizeLimit { limit: max }),
        _ => Ok(()),
    }
}

/// Append `chunk`, or fail if the body would grow past `max`. A body of
/// exactly `max` bytes is accepted.
pub fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max: usize) -> Result<(), FetchError> {
    if buf.len() + chunk.len() > max {
        return Err(FetchError::SizeLimit { limit: max });
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

// --- Test helper ---

/// Canned responses keyed by exact URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: HashMap<String, Result<Vec<u8>, FetchError>>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_error(mut self, url: impl Into<String>, err: FetchError) -> Self {
        self.routes.insert(url.into(), Err(err));
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpFetch for StaticFetcher {
    async fn get(&self, url: &str, cancel: &Cancellation) -> Result<Vec<u8>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Ok(mut log) = self.requested.lock() {
            log.push(url.to_string());
        }
        self.routes
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status { status: 404 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    enum Step {
        Send(Vec<u8>),
        Pause(Duration),
    }

    fn send(bytes: &[u8]) -> Step {
        Step::Send(bytes.to_vec())
    }

    /// Plain-HTTP server on loopback that plays `steps` on every
    /// connection. Returns its address and a connection counter.
    async fn serve(steps: Vec<Step>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let steps = Arc::new(steps);
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let steps = steps.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    for step in steps.iter() {
                        match step {
                            Step::Send(bytes) => {
                                if sock.write_all(bytes).await.is_err() {
                                    return;
                                }
                                let _ = sock.flush().await;
                            }
                            Step::Pause(d) => tokio::time::sleep(*d).await,
                        }
                    }
                });
            }
        });
        (addr, accepted)
    }

    // Loopback never passes `vet`, so these drive the request path directly.
    fn local_target(addr: SocketAddr) -> VettedTarget {
        VettedTarget {
            url: Url::parse(&format!("http://{addr}/feed")).unwrap(),
            host: addr.ip().to_string(),
            pinned: Vec::new(),
        }
    }

    fn guard_with(max_bytes: usize, timeout: Duration, header_timeout: Duration) -> FetchGuard {
        FetchGuard::new(FetchSettings {
            max_bytes,
            timeout,
            header_timeout,
            allowed_hosts: Vec::new(),
        })
    }

    fn relaxed(max_bytes: usize) -> FetchGuard {
        guard_with(max_bytes, Duration::from_secs(10), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn reads_a_plain_response() {
        let (addr, _) = serve(vec![send(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )])
        .await;
        let body = relaxed(64)
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn redirect_is_a_status_error_and_not_followed() {
        let (addr, accepted) = serve(vec![send(
            b"HTTP/1.1 302 Found\r\nLocation: /followed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )])
        .await;
        let err = relaxed(64)
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status { status: 302 });
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_headers_time_out() {
        let (addr, _) = serve(vec![
            Step::Pause(Duration::from_secs(3)),
            send(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"),
        ])
        .await;
        let guard = guard_with(64, Duration::from_secs(10), Duration::from_millis(200));
        let err = guard
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn stalled_body_hits_the_total_timeout() {
        let (addr, _) = serve(vec![
            send(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"),
            Step::Pause(Duration::from_secs(3)),
        ])
        .await;
        let guard = guard_with(64, Duration::from_millis(300), Duration::from_secs(10));
        let err = guard
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn chunked_body_over_the_cap_is_rejected() {
        let mut resp = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for _ in 0..2 {
            resp.extend_from_slice(b"10\r\n0123456789abcdef\r\n");
        }
        resp.extend_from_slice(b"0\r\n\r\n");
        let (addr, _) = serve(vec![Step::Send(resp)]).await;

        let err = relaxed(16)
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::SizeLimit { limit: 16 });
    }

    #[tokio::test]
    async fn announced_length_over_the_cap_fails_before_the_body() {
        let (addr, _) = serve(vec![
            send(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n"),
            Step::Pause(Duration::from_secs(3)),
        ])
        .await;
        let err = relaxed(16)
            .fetch_vetted(&local_target(addr), &Cancellation::never())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::SizeLimit { limit: 16 });
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_body_read() {
        let (addr, _) = serve(vec![
            send(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"),
            Step::Pause(Duration::from_secs(5)),
        ])
        .await;
        let cancel = Cancellation::with_deadline(Duration::from_millis(200));
        let err = relaxed(64)
            .fetch_vetted(&local_target(addr), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Cancelled);
    }

    #[tokio::test]
    async fn clients_are_cached_per_host_and_address_set() {
        let guard = relaxed(64);
        let a: SocketAddr = "93.184.216.34:443".parse().unwrap();
        let b: SocketAddr = "93.184.216.35:443".parse().unwrap();
        let target = |pinned: Vec<SocketAddr>| VettedTarget {
            url: Url::parse("https://news.test/feed").unwrap(),
            host: "news.test".into(),
            pinned,
        };

        guard.client_for(&target(vec![a, b])).unwrap();
        guard.client_for(&target(vec![b, a])).unwrap();
        assert_eq!(guard.clients.lock().unwrap().len(), 1);

        guard.client_for(&target(vec![a])).unwrap();
        assert_eq!(guard.clients.lock().unwrap().len(), 2);

        // clones share the cache
        let copy = guard.clone();
        copy.client_for(&target(vec![a])).unwrap();
        assert_eq!(guard.clients.lock().unwrap().len(), 2);
    }

    #[test]
    fn body_at_limit_is_accepted_one_more_byte_is_not() {
        let mut buf = Vec::new();
        append_capped(&mut buf, &[0u8; 6], 10).unwrap();
        append_capped(&mut buf, &[0u8; 4], 10).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(
            append_capped(&mut buf, &[0u8; 1], 10),
            Err(FetchError::SizeLimit { limit: 10 })
        );
        // never silently truncated
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn announced_length_over_limit_fails_early() {
        assert!(check_content_length(None, 10).is_ok());
        assert!(check_content_length(Some(10), 10).is_ok());
        assert_eq!(
            check_content_length(Some(11), 10),
            Err(FetchError::SizeLimit { limit: 10 })
        );
    }

    #[tokio::test]
    async fn static_fetcher_serves_routes_and_404s() {
        let f = StaticFetcher::new()
            .with_body("https://a.test/feed", "ok")
            .with_error("https://b.test/", FetchError::Timeout);
        let c = Cancellation::never();
        assert_eq!(f.get("https://a.test/feed", &c).await.unwrap(), b"ok");
        assert_eq!(f.get("https://b.test/", &c).await, Err(FetchError::Timeout));
        assert_eq!(
            f.get("https://c.test/", &c).await,
            Err(FetchError::Status { status: 404 })
        );
        assert_eq!(f.requested().len(), 3);
    }
}

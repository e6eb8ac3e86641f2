//! Discovery of the externally visible IPv4 address advertised for the nameserver.
//!
//! The address is asked of a list of "what is my IP" echo endpoints, in order, and cached for
//! [`Config::public_ip_refresh`][crate::config::Config::public_ip_refresh]. An operator can pin
//! the address in the config instead, which disables discovery.

use crate::config::Config;
use reqwest::StatusCode;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Cached {
    ip: Ipv4Addr,
    refreshed: Instant,
}

#[derive(Debug)]
pub struct PublicIpResolver {
    pinned: Option<Ipv4Addr>,
    endpoints: Vec<String>,
    refresh: Duration,
    client: reqwest::Client,
    cache: Mutex<Option<Cached>>,
}

impl PublicIpResolver {
    #[must_use]
    pub fn new(endpoints: Vec<String>, refresh: Duration) -> Self {
        // NB: expect is safe: building only fails if the TLS backend can't initialise, and
        //     rustls has no system state to fail on.
        let client = reqwest::Client::builder()
            .timeout(ECHO_TIMEOUT)
            .build()
            .expect("reqwest client with rustls");
        Self {
            pinned: None,
            endpoints,
            refresh,
            client,
            cache: Mutex::new(None),
        }
    }

    /// A resolver that always answers `ip` without querying anything.
    #[must_use]
    pub fn pinned(ip: Ipv4Addr) -> Self {
        Self {
            pinned: Some(ip),
            ..Self::new(Vec::new(), Duration::MAX)
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        match config.public_ip {
            Some(ip) => Self::pinned(ip),
            None => Self::new(config.public_ip_endpoints.clone(), config.public_ip_refresh),
        }
    }

    /// The public IP, refreshing the cache first if it is empty or stale. If every endpoint
    /// fails the previous value (possibly none) is kept.
    pub async fn public_ip(&self) -> Option<Ipv4Addr> {
        if let Some(ip) = self.pinned {
            return Some(ip);
        }

        let mut cache = self.cache.lock().await;
        let stale = cache.map_or(true, |c| c.refreshed.elapsed() >= self.refresh);
        if stale {
            match self.discover().await {
                Some(ip) => {
                    *cache = Some(Cached {
                        ip,
                        refreshed: Instant::now(),
                    });
                }
                None => tracing::error!("could not find public IP"),
            }
        }
        cache.map(|c| c.ip)
    }

    async fn discover(&self) -> Option<Ipv4Addr> {
        for url in &self.endpoints {
            match self.query(url).await {
                Ok(ip) => {
                    tracing::info!("found public IP {ip} from {url}");
                    return Some(ip);
                }
                Err(err) => tracing::warn!("failed asking public IP to {url}: {err}"),
            }
        }
        None
    }

    async fn query(&self, url: &str) -> anyhow::Result<Ipv4Addr> {
        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            anyhow::bail!("status {}", response.status());
        }
        let body = response.text().await?;
        Ok(body.trim().parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Hits = Arc<AtomicUsize>;

    async fn good(State(hits): State<Hits>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        "203.0.113.7\n"
    }

    async fn garbage(State(hits): State<Hits>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        "<html>not an address</html>"
    }

    async fn broken(State(hits): State<Hits>) -> AxumStatus {
        hits.fetch_add(1, Ordering::SeqCst);
        AxumStatus::INTERNAL_SERVER_ERROR
    }

    async fn echo_server(hits: Hits) -> SocketAddr {
        let app = Router::new()
            .route("/good", get(good))
            .route("/garbage", get(garbage))
            .route("/broken", get(broken))
            .with_state(hits);
        let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    }

    fn urls(addr: SocketAddr, paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| format!("http://{addr}{p}")).collect()
    }

    #[tokio::test]
    async fn cached_within_refresh_interval() {
        let hits = Hits::default();
        let addr = echo_server(hits.clone()).await;
        let resolver = PublicIpResolver::new(urls(addr, &["/good"]), Duration::from_secs(3600));

        let expected = Some(Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(resolver.public_ip().await, expected);
        assert_eq!(resolver.public_ip().await, expected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requeried_after_interval() {
        let hits = Hits::default();
        let addr = echo_server(hits.clone()).await;
        let resolver = PublicIpResolver::new(urls(addr, &["/good"]), Duration::ZERO);

        resolver.public_ip().await;
        resolver.public_ip().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skips_failing_and_invalid_endpoints() {
        let hits = Hits::default();
        let addr = echo_server(hits.clone()).await;
        let resolver = PublicIpResolver::new(
            urls(addr, &["/broken", "/garbage", "/missing", "/good"]),
            Duration::from_secs(3600),
        );

        assert_eq!(
            resolver.public_ip().await,
            Some(Ipv4Addr::new(203, 0, 113, 7))
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn nothing_cached_when_every_endpoint_fails() {
        let hits = Hits::default();
        let addr = echo_server(hits.clone()).await;
        let resolver =
            PublicIpResolver::new(urls(addr, &["/broken", "/garbage"]), Duration::ZERO);

        assert_eq!(resolver.public_ip().await, None);
        assert_eq!(resolver.public_ip().await, None);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let hits = Hits::default();
        let addr = echo_server(hits.clone()).await;
        let resolver = PublicIpResolver::new(urls(addr, &["/good"]), Duration::ZERO);
        let first = resolver.public_ip().await;
        assert!(first.is_some());

        let resolver = PublicIpResolver {
            endpoints: urls(addr, &["/broken"]),
            ..resolver
        };
        assert_eq!(resolver.public_ip().await, first);
    }

    #[tokio::test]
    async fn pinned_never_queries() {
        let resolver = PublicIpResolver::pinned(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(resolver.public_ip().await, Some(Ipv4Addr::new(192, 0, 2, 1)));
    }
}

//! CDN mirror pool with periodic health checks.
//!
//! Every configured mirror is probed on `/healthz` every 30 seconds; the
//! balancer picks a random healthy mirror and falls back to the first
//! configured URL when none is healthy. Single-URL configurations skip
//! health checks entirely.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::RngExt;
use tracing::{debug, warn};

use crate::stats::Metrics;

/// Seconds between probe cycles.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Per-probe timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The pool of CDN mirrors.
#[derive(Debug)]
pub struct CdnPool {
    urls: Vec<String>,
    fallback: String,
    healthy: RwLock<Arc<Vec<String>>>,
    client: reqwest::Client,
}

impl CdnPool {
    /// Build a pool from the configured URLs; the first is the fallback.
    ///
    /// # Panics
    ///
    /// Never: configuration validation guarantees at least one URL.
    pub fn new(urls: Vec<String>) -> Self {
        let fallback = urls
            .first()
            .cloned()
            .unwrap_or_else(|| "http://bananas.cdn.openttd.org".to_string());
        Self {
            urls,
            fallback,
            healthy: RwLock::new(Arc::new(Vec::new())),
            client: reqwest::Client::new(),
        }
    }

    /// Whether this pool needs background probing at all.
    pub fn needs_probes(&self) -> bool {
        self.urls.len() > 1
    }

    /// One random healthy mirror, or the fallback when the pool is empty.
    pub fn pick(&self) -> String {
        let healthy = Arc::clone(&self.healthy.read());
        if healthy.is_empty() {
            return self.fallback.clone();
        }
        let index = rand::rng().random_range(0..healthy.len());
        healthy[index].clone()
    }

    /// Number of mirrors that passed the last probe cycle.
    pub fn healthy_count(&self) -> usize {
        self.healthy.read().len()
    }

    /// Replace the healthy set; readers snapshot the previous reference.
    pub fn set_healthy(&self, urls: Vec<String>) {
        *self.healthy.write() = Arc::new(urls);
    }

    /// Probe every mirror once and publish the surviving set.
    pub async fn probe_cycle(&self) {
        let mut healthy = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            if self.probe(url).await {
                healthy.push(url.clone());
            }
        }
        debug!("CDN probe cycle: {}/{} healthy", healthy.len(), self.urls.len());
        self.set_healthy(healthy);
    }

    async fn probe(&self, url: &str) -> bool {
        let result = self
            .client
            .get(format!("{url}/healthz"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("CDN {url} failed health check: {}", response.status());
                false
            }
            Err(err) => {
                warn!("CDN {url} failed health check: {err}");
                false
            }
        }
    }

    /// Background task probing the pool until the server stops.
    pub async fn run_probes(self: Arc<Self>, metrics: Metrics) {
        let mut ticker = tokio::time::interval(PROBE_INTERVAL);
        loop {
            ticker.tick().await;
            self.probe_cycle().await;
            metrics.cdn_healthy.set(self.healthy_count() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_picks_fallback() {
        let pool = CdnPool::new(vec![
            "http://cdn-1.test".to_string(),
            "http://cdn-2.test".to_string(),
        ]);
        assert_eq!(pool.pick(), "http://cdn-1.test");
    }

    #[test]
    fn test_pick_comes_from_healthy_set() {
        let pool = CdnPool::new(vec![
            "http://cdn-1.test".to_string(),
            "http://cdn-2.test".to_string(),
        ]);
        pool.set_healthy(vec!["http://cdn-2.test".to_string()]);
        for _ in 0..10 {
            assert_eq!(pool.pick(), "http://cdn-2.test");
        }
    }

    #[test]
    fn test_single_url_skips_probing() {
        let pool = CdnPool::new(vec!["http://cdn-only.test".to_string()]);
        assert!(!pool.needs_probes());
        assert_eq!(pool.pick(), "http://cdn-only.test");
    }

    #[tokio::test]
    async fn test_probe_cycle_keeps_reachable_mirrors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let alive = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&alive)
            .await;

        let dead = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&dead)
            .await;

        let pool = CdnPool::new(vec![alive.uri(), dead.uri()]);
        assert_eq!(pool.healthy_count(), 0);

        pool.probe_cycle().await;
        assert_eq!(pool.healthy_count(), 1);
        assert_eq!(pool.pick(), alive.uri());
    }
}

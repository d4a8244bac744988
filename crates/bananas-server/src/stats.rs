//! Prometheus metrics and the client-version statistics cache.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use parking_lot::Mutex;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// How many client IPs the version cache remembers before evicting.
const VERSION_CACHE_LIMIT: usize = 10_000;

/// All metrics exported on `/metrics`.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Dispatched packets by packet kind
    pub packets: IntCounterVec,
    /// Metadata frames sent
    pub server_info_sent: IntCounter,
    /// Downloads started over the content protocol
    pub downloads: IntCounter,
    /// Downloads that failed or were cancelled mid-transfer
    pub download_failures: IntCounter,
    /// Reload attempts by outcome
    pub reloads: IntCounterVec,
    /// Balancer id lookups by result
    pub balancer_lookups: IntCounterVec,
    /// Size of the healthy CDN pool
    pub cdn_healthy: IntGauge,
    /// Distinct clients per version string, deduplicated by IP
    pub listing_clients: IntCounterVec,
}

impl Metrics {
    /// Create and register all metrics.
    ///
    /// # Errors
    ///
    /// Returns `prometheus::Error` when a collector cannot be registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let packets = IntCounterVec::new(
            Opts::new("bananas_server_packets_total", "Dispatched packets"),
            &["kind"],
        )?;
        let server_info_sent = IntCounter::new(
            "bananas_server_info_frames_total",
            "Metadata frames sent to clients",
        )?;
        let downloads = IntCounter::new(
            "bananas_server_downloads_total",
            "Downloads started over the content protocol",
        )?;
        let download_failures = IntCounter::new(
            "bananas_server_download_failures_total",
            "Downloads that failed or were cancelled",
        )?;
        let reloads = IntCounterVec::new(
            Opts::new("bananas_server_reloads_total", "Reload attempts"),
            &["outcome"],
        )?;
        let balancer_lookups = IntCounterVec::new(
            Opts::new("bananas_server_balancer_lookups_total", "Balancer lookups"),
            &["result"],
        )?;
        let cdn_healthy = IntGauge::new(
            "bananas_server_cdn_healthy",
            "Number of healthy CDN mirrors",
        )?;
        let listing_clients = IntCounterVec::new(
            Opts::new(
                "bananas_server_listing_clients_total",
                "Distinct clients per version, deduplicated by IP",
            ),
            &["version"],
        )?;

        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(server_info_sent.clone()))?;
        registry.register(Box::new(downloads.clone()))?;
        registry.register(Box::new(download_failures.clone()))?;
        registry.register(Box::new(reloads.clone()))?;
        registry.register(Box::new(balancer_lookups.clone()))?;
        registry.register(Box::new(cdn_healthy.clone()))?;
        registry.register(Box::new(listing_clients.clone()))?;

        Ok(Self {
            packets,
            server_info_sent,
            downloads,
            download_failures,
            reloads,
            balancer_lookups,
            cdn_healthy,
            listing_clients,
        })
    }
}

/// Bounded IP to version-string cache with FIFO eviction.
///
/// Deduplicates the per-version listing counter: a client reconnecting
/// with an unchanged version is counted once.
#[derive(Debug, Default)]
pub struct VersionStats {
    inner: Mutex<VersionStatsInner>,
}

#[derive(Debug, Default)]
struct VersionStatsInner {
    seen: HashMap<IpAddr, String>,
    order: VecDeque<IpAddr>,
}

impl VersionStats {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one listing request. Returns true when this `(ip, version)`
    /// pair was not counted yet.
    pub fn record(&self, ip: IpAddr, version: &str) -> bool {
        let mut inner = self.inner.lock();

        match inner.seen.get(&ip).cloned() {
            Some(known) if known == version => return false,
            Some(_) => {
                inner.seen.insert(ip, version.to_string());
                return true;
            }
            None => {}
        }

        inner.seen.insert(ip, version.to_string());
        inner.order.push_back(ip);
        while inner.order.len() > VERSION_CACHE_LIMIT {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        true
    }

    /// Number of cached client IPs.
    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    /// Whether no client was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().seen.is_empty()
    }
}

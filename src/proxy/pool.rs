//! Rotating proxy pool with failure tracking

use crate::proxy::models::{Proxy, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::Result;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// How the pool picks the next proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Random,
    /// Favour proxies with a better success record
    Weighted,
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationStrategy::RoundRobin => write!(f, "round_robin"),
            RotationStrategy::Random => write!(f, "random"),
            RotationStrategy::Weighted => write!(f, "weighted"),
        }
    }
}

impl std::str::FromStr for RotationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(RotationStrategy::RoundRobin),
            "random" => Ok(RotationStrategy::Random),
            "weighted" => Ok(RotationStrategy::Weighted),
            other => Err(format!(
                "Invalid rotation strategy: {}. Use: round_robin, random, weighted",
                other
            )),
        }
    }
}

/// Usage statistics of one proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub proxy: String,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub evicted: bool,
    pub last_latency_ms: Option<u64>,
}

impl ProxyStats {
    fn new(proxy: &Proxy) -> Self {
        Self {
            proxy: proxy.to_simple_string(),
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            evicted: false,
            last_latency_ms: None,
        }
    }

    fn weight(&self) -> f64 {
        (self.successes as f64 + 1.0) / (self.failures as f64 + 1.0)
    }
}

struct PoolState {
    proxies: Vec<Proxy>,
    stats: Vec<ProxyStats>,
    cursor: usize,
}

impl PoolState {
    fn position(&self, proxy: &Proxy) -> Option<usize> {
        self.proxies
            .iter()
            .position(|p| p.host == proxy.host && p.port == proxy.port)
    }

    fn live_indices(&self) -> Vec<usize> {
        self.stats
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.evicted)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Thread-safe pool of proxies shared by all crawl tasks
///
/// A proxy that fails `max_failures` times in a row is evicted and never
/// handed out again. An empty pool means requests go out directly.
pub struct ProxyPool {
    strategy: RotationStrategy,
    max_failures: u32,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<Proxy>, strategy: RotationStrategy, max_failures: u32) -> Self {
        let stats = proxies.iter().map(ProxyStats::new).collect();
        Self {
            strategy,
            max_failures: max_failures.max(1),
            state: Mutex::new(PoolState {
                proxies,
                stats,
                cursor: 0,
            }),
        }
    }

    /// A pool that never hands out a proxy
    pub fn direct() -> Self {
        Self::new(Vec::new(), RotationStrategy::default(), 1)
    }

    /// Load a pool from a proxy list file; a missing file gives a direct pool
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        strategy: RotationStrategy,
        max_failures: u32,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Proxy list not found, using direct connections");
            return Ok(Self::direct());
        }

        let proxies = ProxyParser::parse_file(path, ProxyType::Http)?;
        info!(
            count = proxies.len(),
            path = %path.display(),
            strategy = %strategy,
            "Loaded proxy pool"
        );
        Ok(Self::new(proxies, strategy, max_failures))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    /// Total number of proxies, evicted ones included
    pub fn len(&self) -> usize {
        self.lock().proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of proxies still in rotation
    pub fn live_count(&self) -> usize {
        self.lock().stats.iter().filter(|s| !s.evicted).count()
    }

    /// Next proxy to use, or `None` when no live proxy is left
    pub fn next(&self) -> Option<Proxy> {
        let mut state = self.lock();
        let total = state.proxies.len();
        if total == 0 {
            return None;
        }

        let index = match self.strategy {
            RotationStrategy::RoundRobin => {
                let start = state.cursor;
                let found = (0..total)
                    .map(|offset| (start + offset) % total)
                    .find(|&i| !state.stats[i].evicted)?;
                state.cursor = (found + 1) % total;
                found
            }
            RotationStrategy::Random => {
                let live = state.live_indices();
                if live.is_empty() {
                    return None;
                }
                live[rand::thread_rng().gen_range(0..live.len())]
            }
            RotationStrategy::Weighted => {
                let live = state.live_indices();
                let weights: Vec<f64> = live.iter().map(|&i| state.stats[i].weight()).collect();
                let dist = WeightedIndex::new(&weights).ok()?;
                live[dist.sample(&mut rand::thread_rng())]
            }
        };

        Some(state.proxies[index].clone())
    }

    pub fn report_success(&self, proxy: &Proxy, latency: Duration) {
        let mut state = self.lock();
        if let Some(i) = state.position(proxy) {
            let stats = &mut state.stats[i];
            stats.successes += 1;
            stats.consecutive_failures = 0;
            stats.last_latency_ms = Some(latency.as_millis() as u64);
        }
    }

    pub fn report_failure(&self, proxy: &Proxy) {
        let mut state = self.lock();
        let Some(i) = state.position(proxy) else {
            return;
        };

        let max_failures = self.max_failures;
        let stats = &mut state.stats[i];
        stats.failures += 1;
        stats.consecutive_failures += 1;
        if !stats.evicted && stats.consecutive_failures >= max_failures {
            stats.evicted = true;
            warn!(
                proxy = %proxy,
                failures = stats.consecutive_failures,
                "Evicting proxy from rotation"
            );
        }
    }

    /// Snapshot of per-proxy statistics
    pub fn stats(&self) -> Vec<ProxyStats> {
        self.lock().stats.clone()
    }
}

impl fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPool")
            .field("strategy", &self.strategy)
            .field("max_failures", &self.max_failures)
            .field("size", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn proxies(n: u16) -> Vec<Proxy> {
        (1..=n)
            .map(|i| Proxy::new(format!("10.0.0.{}", i), 8080, ProxyType::Http))
            .collect()
    }

    #[test]
    fn test_rotation_strategy_from_str() {
        assert_eq!("round-robin".parse(), Ok(RotationStrategy::RoundRobin));
        assert_eq!("Weighted".parse(), Ok(RotationStrategy::Weighted));
        assert!("sticky".parse::<RotationStrategy>().is_err());
    }

    #[test]
    fn test_empty_pool_is_direct() {
        let pool = ProxyPool::direct();
        assert!(pool.is_empty());
        assert!(pool.next().is_none());
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let pool = ProxyPool::new(proxies(3), RotationStrategy::RoundRobin, 3);
        let hosts: Vec<String> = (0..6).map(|_| pool.next().unwrap().host).collect();
        assert_eq!(
            hosts,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[test]
    fn test_eviction_after_consecutive_failures() {
        let list = proxies(2);
        let pool = ProxyPool::new(list.clone(), RotationStrategy::RoundRobin, 2);

        pool.report_failure(&list[0]);
        assert_eq!(pool.live_count(), 2);
        pool.report_failure(&list[0]);
        assert_eq!(pool.live_count(), 1);

        for _ in 0..4 {
            assert_eq!(pool.next().unwrap(), list[1]);
        }

        pool.report_failure(&list[1]);
        pool.report_failure(&list[1]);
        assert_eq!(pool.live_count(), 0);
        assert!(pool.next().is_none());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let list = proxies(1);
        let pool = ProxyPool::new(list.clone(), RotationStrategy::RoundRobin, 2);

        pool.report_failure(&list[0]);
        pool.report_success(&list[0], Duration::from_millis(120));
        pool.report_failure(&list[0]);
        assert_eq!(pool.live_count(), 1);

        let stats = pool.stats();
        assert_eq!(stats[0].successes, 1);
        assert_eq!(stats[0].failures, 2);
        assert_eq!(stats[0].consecutive_failures, 1);
        assert_eq!(stats[0].last_latency_ms, Some(120));
    }

    #[test]
    fn test_random_only_returns_live_proxies() {
        let list = proxies(3);
        let pool = ProxyPool::new(list.clone(), RotationStrategy::Random, 1);
        pool.report_failure(&list[1]);

        let seen: HashSet<String> = (0..50).map(|_| pool.next().unwrap().host).collect();
        assert!(!seen.contains("10.0.0.2"));
        assert!(seen.len() <= 2);
    }

    #[test]
    fn test_weighted_prefers_reliable_proxies() {
        let list = proxies(2);
        let pool = ProxyPool::new(list.clone(), RotationStrategy::Weighted, 1000);
        for _ in 0..50 {
            pool.report_success(&list[0], Duration::from_millis(10));
            pool.report_failure(&list[1]);
        }

        let first = (0..200)
            .filter(|_| pool.next().unwrap() == list[0])
            .count();
        assert!(first > 150, "reliable proxy picked only {} times", first);
    }

    #[test]
    fn test_missing_file_gives_direct_pool() {
        let pool = ProxyPool::from_file(
            "/nonexistent/good_proxies.txt",
            RotationStrategy::RoundRobin,
            3,
        )
        .unwrap();
        assert!(pool.is_empty());
    }
}

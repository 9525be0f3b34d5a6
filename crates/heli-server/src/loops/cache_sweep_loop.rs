//! Cache sweep loop.
//!
//! Entries are judged stale at read time; this only bounds memory by evicting
//! regions nobody has asked for in a while.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::cache::RegionalCache;

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub interval: Duration,
    pub max_entries: usize,
    pub max_age: Duration,
}

impl SweepSettings {
    /// Entries are evicted once older than two TTLs.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            interval: config.cache_sweep_interval,
            max_entries: config.cache_max_entries,
            max_age: config.cache_ttl.saturating_mul(2),
        }
    }
}

pub async fn run_cache_sweep_loop(
    cache: Arc<RegionalCache>,
    settings: SweepSettings,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(settings.interval);
    tracing::info!(
        "Cache sweep loop started (every {:?}, max {} entries)",
        settings.interval,
        settings.max_entries
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Cache sweep loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let before = cache.len();
                cache.prune(settings.max_entries, settings.max_age);
                let after = cache.len();
                if after < before {
                    tracing::debug!("Cache sweep evicted {} regions, {} remain", before - after, after);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn max_age_is_twice_ttl() {
        let config = Config {
            cache_ttl: Duration::from_secs(10),
            ..Config::default()
        };
        let settings = SweepSettings::from_config(&config);
        assert_eq!(settings.max_age, Duration::from_secs(20));
        assert_eq!(settings.max_entries, 512);
        assert_eq!(settings.interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let adapter = heli_upstream::AdsbFiAdapter::new("http://127.0.0.1:9", &Default::default()).unwrap();
        let cache = Arc::new(RegionalCache::new(
            Arc::new(adapter),
            heli_core::RegionQuantizer::new(1, 100.0),
            Duration::from_secs(10),
        ));
        let (tx, rx) = broadcast::channel(1);
        let settings = SweepSettings {
            interval: Duration::from_millis(10),
            max_entries: 4,
            max_age: Duration::from_secs(20),
        };

        let handle = tokio::spawn(run_cache_sweep_loop(cache, settings, rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits")
            .unwrap();
    }
}

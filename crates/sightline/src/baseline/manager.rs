//! Concurrent per-key baseline tracking.

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{DetectionError, DetectionResult};
use crate::stats::RollingWindow;

use super::types::{Baseline, BaselineKey};
use super::MIN_BASELINE_SAMPLES;

/// Window and cached baseline for one key, held in a single map entry so a
/// reader can never observe them out of sync.
#[derive(Debug)]
struct KeyState {
    window: RollingWindow,
    baseline: Baseline,
}

/// Owns the mapping from [`BaselineKey`] to rolling window and cached
/// [`Baseline`].
///
/// Keys are independent: updates to different keys proceed in parallel on
/// separate map shards, while updates to the same key serialize on its entry
/// lock in arrival order. Created once per engine instance; cleared only by
/// an explicit reset.
pub struct BaselineManager {
    window_size: usize,
    entries: DashMap<BaselineKey, KeyState>,
}

impl BaselineManager {
    /// Create a manager whose per-key windows hold `window_size` samples.
    ///
    /// Rejects capacities below the validity floor: a window that can never
    /// hold [`MIN_BASELINE_SAMPLES`] samples could never produce a valid
    /// baseline.
    pub fn new(window_size: usize) -> DetectionResult<Self> {
        if window_size < MIN_BASELINE_SAMPLES {
            return Err(DetectionError::config(format!(
                "baseline window size {} below the {}-sample floor",
                window_size, MIN_BASELINE_SAMPLES
            )));
        }
        info!(window_size, "creating baseline manager");
        Ok(Self {
            window_size,
            entries: DashMap::new(),
        })
    }

    /// Fold a value into the key's window and atomically replace its cached
    /// baseline with a fresh recomputation.
    pub fn update(&self, key: BaselineKey, value: f64) -> DetectionResult<()> {
        if !value.is_finite() {
            return Err(DetectionError::invalid_input(
                "value",
                format!("must be finite, got {}", value),
            ));
        }

        let mut state = self.entries.entry(key.clone()).or_insert_with(|| KeyState {
            window: RollingWindow::new(self.window_size),
            baseline: Baseline::empty(),
        });

        state.window.push(value);
        state.baseline = Baseline::from_samples(&state.window.snapshot());

        debug!(
            key = %key,
            value,
            samples = state.baseline.sample_count,
            mean = state.baseline.mean,
            "updated baseline"
        );

        metrics::gauge!(
            "sightline_baseline_mean",
            "service" => key.service.to_string(),
            "model" => key.model.to_string(),
            "metric" => key.metric.clone()
        )
        .set(state.baseline.mean);
        metrics::gauge!(
            "sightline_baseline_samples",
            "service" => key.service.to_string(),
            "model" => key.model.to_string(),
            "metric" => key.metric.clone()
        )
        .set(state.baseline.sample_count as f64);

        Ok(())
    }

    /// The most recently completed baseline for a key, valid or not.
    pub fn get(&self, key: &BaselineKey) -> Option<Baseline> {
        self.entries.get(key).map(|state| state.baseline.clone())
    }

    /// Whether the key has accumulated at least [`MIN_BASELINE_SAMPLES`]
    /// observations.
    pub fn has_valid_baseline(&self, key: &BaselineKey) -> bool {
        self.entries
            .get(key)
            .map(|state| state.baseline.is_valid())
            .unwrap_or(false)
    }

    /// All keys currently tracked.
    pub fn keys(&self) -> Vec<BaselineKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured per-key window capacity.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Drop the window and baseline for one key.
    pub fn clear(&self, key: &BaselineKey) {
        self.entries.remove(key);
        debug!(key = %key, "cleared baseline");
    }

    /// Drop all windows and baselines — a cold start.
    pub fn clear_all(&self) {
        self.entries.clear();
        info!("cleared all baselines");
    }

    /// Summary of tracked state.
    pub fn stats(&self) -> BaselineManagerStats {
        let total_baselines = self.entries.len();
        let valid_baselines = self
            .entries
            .iter()
            .filter(|entry| entry.baseline.is_valid())
            .count();
        BaselineManagerStats {
            total_baselines,
            valid_baselines,
            window_size: self.window_size,
        }
    }
}

/// Point-in-time summary of a [`BaselineManager`].
#[derive(Debug, Clone)]
pub struct BaselineManagerStats {
    pub total_baselines: usize,
    pub valid_baselines: usize,
    pub window_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ModelId, ServiceId};
    use std::sync::Arc;

    fn latency_key(service: &str) -> BaselineKey {
        BaselineKey::latency(ServiceId::new(service), ModelId::new("gpt-4"))
    }

    #[test]
    fn rejects_window_below_floor() {
        assert!(BaselineManager::new(9).is_err());
        assert!(BaselineManager::new(MIN_BASELINE_SAMPLES).is_ok());
    }

    #[test]
    fn rejects_non_finite_value() {
        let manager = BaselineManager::new(10).unwrap();
        let key = latency_key("svc");
        assert!(manager.update(key.clone(), f64::NAN).is_err());
        // the bad value must not have created state
        assert!(manager.get(&key).is_none());
    }

    #[test]
    fn baseline_becomes_valid_at_tenth_sample() {
        let manager = BaselineManager::new(100).unwrap();
        let key = latency_key("svc");

        for i in 1..=9 {
            manager.update(key.clone(), i as f64).unwrap();
            assert!(!manager.has_valid_baseline(&key), "valid after {} samples", i);
        }
        manager.update(key.clone(), 10.0).unwrap();
        assert!(manager.has_valid_baseline(&key));
    }

    #[test]
    fn update_recomputes_summary() {
        let manager = BaselineManager::new(10).unwrap();
        let key = latency_key("svc");

        for i in 1..=10 {
            manager.update(key.clone(), i as f64).unwrap();
        }

        let baseline = manager.get(&key).unwrap();
        assert_eq!(baseline.sample_count, 10);
        assert_eq!(baseline.mean, 5.5);
        assert_eq!(baseline.min, 1.0);
        assert_eq!(baseline.max, 10.0);
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let manager = BaselineManager::new(10).unwrap();
        let key = latency_key("svc");

        // 20 pushes through a 10-slot window: only 11..=20 remain
        for i in 1..=20 {
            manager.update(key.clone(), i as f64).unwrap();
        }

        let baseline = manager.get(&key).unwrap();
        assert_eq!(baseline.sample_count, 10);
        assert_eq!(baseline.min, 11.0);
        assert_eq!(baseline.max, 20.0);
        assert_eq!(baseline.mean, 15.5);
    }

    #[test]
    fn keys_are_independent() {
        let manager = BaselineManager::new(10).unwrap();
        let a = latency_key("svc-a");
        let b = latency_key("svc-b");

        for _ in 0..10 {
            manager.update(a.clone(), 100.0).unwrap();
        }
        manager.update(b.clone(), 5.0).unwrap();

        assert!(manager.has_valid_baseline(&a));
        assert!(!manager.has_valid_baseline(&b));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn clear_and_clear_all() {
        let manager = BaselineManager::new(10).unwrap();
        let a = latency_key("svc-a");
        let b = latency_key("svc-b");

        for _ in 0..10 {
            manager.update(a.clone(), 1.0).unwrap();
            manager.update(b.clone(), 2.0).unwrap();
        }

        manager.clear(&a);
        assert!(manager.get(&a).is_none());
        assert!(manager.get(&b).is_some());

        manager.clear_all();
        assert!(manager.is_empty());
    }

    #[test]
    fn stats_counts_valid_baselines() {
        let manager = BaselineManager::new(10).unwrap();
        let a = latency_key("svc-a");
        let b = latency_key("svc-b");

        for _ in 0..10 {
            manager.update(a.clone(), 1.0).unwrap();
        }
        for _ in 0..3 {
            manager.update(b.clone(), 1.0).unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats.total_baselines, 2);
        assert_eq!(stats.valid_baselines, 1);
        assert_eq!(stats.window_size, 10);
    }

    #[test]
    fn replay_is_deterministic() {
        let run = || {
            let manager = BaselineManager::new(50).unwrap();
            let key = latency_key("svc");
            for i in 0..200u32 {
                let value = 100.0 + (i % 17) as f64 - (i % 5) as f64;
                manager.update(key.clone(), value).unwrap();
            }
            manager.get(&key).unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.mean, second.mean);
        assert_eq!(first.std_dev, second.std_dev);
        assert_eq!(first.median, second.median);
        assert_eq!(first.p99, second.p99);
        assert_eq!(first.sample_count, second.sample_count);
    }

    #[test]
    fn concurrent_updates_across_keys() {
        let manager = Arc::new(BaselineManager::new(100).unwrap());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(std::thread::spawn(move || {
                let key = latency_key(&format!("svc-{}", worker));
                for i in 0..50 {
                    manager.update(key.clone(), 100.0 + i as f64).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.len(), 8);
        for worker in 0..8 {
            let key = latency_key(&format!("svc-{}", worker));
            let baseline = manager.get(&key).unwrap();
            assert_eq!(baseline.sample_count, 50);
        }
    }

    #[test]
    fn concurrent_updates_same_key_lose_nothing() {
        let manager = Arc::new(BaselineManager::new(1000).unwrap());
        let key = latency_key("shared");
        let mut handles = Vec::new();

        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            let key = key.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    manager.update(key.clone(), 1.0).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let baseline = manager.get(&key).unwrap();
        assert_eq!(baseline.sample_count, 400);
    }
}

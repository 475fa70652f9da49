//! Statistical utilities: pure functions over finite samples, plus the
//! fixed-capacity [`RollingWindow`] they are computed from.
//!
//! Conventions, chosen for degenerate inputs to yield "no signal" rather
//! than errors:
//! - empty input ⇒ 0 for every statistic
//! - a single value ⇒ 0 standard deviation
//! - `zscore` with σ = 0 ⇒ 0
//!
//! Variance is population variance (divide by n), not sample variance.
//! Percentiles use linear interpolation between closest ranks.

use std::collections::VecDeque;

// ── Moments ─────────────────────────────────────────────────────────────

/// Arithmetic mean. 0 for empty input.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation. 0 for empty or single-value input.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

// ── Order statistics ────────────────────────────────────────────────────

/// Sort a snapshot, treating incomparable values as equal.
///
/// Callers guarantee finite inputs (the telemetry contract rejects
/// non-finite values before they reach a window).
pub(crate) fn sorted(data: &[f64]) -> Vec<f64> {
    let mut out = data.to_vec();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// Percentile of an already-sorted slice, linear interpolation between
/// closest ranks. `p` is clamped into [0, 100].
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

/// Median. 0 for empty input.
pub fn median(data: &[f64]) -> f64 {
    percentile_sorted(&sorted(data), 50.0)
}

/// Percentile `p` in [0, 100]. 0 for empty input.
pub fn percentile(data: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted(data), p)
}

/// First and third quartiles (P25, P75).
pub fn quartiles(data: &[f64]) -> (f64, f64) {
    let s = sorted(data);
    (percentile_sorted(&s, 25.0), percentile_sorted(&s, 75.0))
}

/// Interquartile range, Q3 − Q1.
pub fn iqr(data: &[f64]) -> f64 {
    let (q1, q3) = quartiles(data);
    q3 - q1
}

/// Median absolute deviation from the median.
pub fn mad(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let med = median(data);
    let deviations: Vec<f64> = data.iter().map(|x| (x - med).abs()).collect();
    median(&deviations)
}

// ── Scores and outlier predicates ───────────────────────────────────────

/// Standard-deviation-normalized distance from the mean. 0 when σ = 0
/// (a degenerate baseline carries no signal).
pub fn zscore(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    (value - mean) / std_dev
}

/// Whether `|z| > threshold`.
pub fn is_zscore_outlier(value: f64, mean: f64, std_dev: f64, threshold: f64) -> bool {
    zscore(value, mean, std_dev).abs() > threshold
}

/// Whether `value` falls outside `[Q1 − multiplier·IQR, Q3 + multiplier·IQR]`.
pub fn is_iqr_outlier(value: f64, q1: f64, q3: f64, iqr: f64, multiplier: f64) -> bool {
    let lower = q1 - multiplier * iqr;
    let upper = q3 + multiplier * iqr;
    value < lower || value > upper
}

/// Whether the modified z-score `0.6745·(value − median)/mad` exceeds
/// `threshold` in magnitude. MAD = 0 carries no signal.
pub fn is_mad_outlier(value: f64, median: f64, mad: f64, threshold: f64) -> bool {
    modified_zscore(value, median, mad).abs() > threshold
}

/// Modified z-score used by the MAD method. 0 when MAD = 0.
pub fn modified_zscore(value: f64, median: f64, mad: f64) -> f64 {
    if mad == 0.0 {
        return 0.0;
    }
    0.6745 * (value - median) / mad
}

// ── Rolling window ──────────────────────────────────────────────────────

/// Fixed-capacity ring of the most recent samples for one key.
///
/// Pushing into a full window silently evicts the oldest sample — never an
/// error. Statistics are computed on demand from a [`snapshot`](Self::snapshot)
/// of the current contents.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest if the window is full. O(1)
    /// amortized.
    pub fn push(&mut self, value: f64) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

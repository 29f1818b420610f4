//! Latency distribution aggregation

use serde::{Deserialize, Serialize};
use warden_common::PerformanceSample;

/// Aggregated view of one sample window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub total: usize,
    pub successful: usize,
    pub availability_pct: f64,
    pub average_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub violations: u32,
}

impl LatencyStats {
    pub fn empty() -> Self {
        LatencyStats {
            total: 0,
            successful: 0,
            availability_pct: 0.0,
            average_ms: 0.0,
            p50_ms: 0,
            p95_ms: 0,
            p99_ms: 0,
            violations: 0,
        }
    }
}

/// Nearest-rank percentile over an already sorted slice.
pub fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate a window of samples. Each sample carries its own
/// SLA verdict in `within_sla`.
pub fn aggregate(samples: &[PerformanceSample]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::empty();
    }

    let successful: Vec<&PerformanceSample> = samples
        .iter()
        .filter(|s| s.status.map(|c| (200..400).contains(&c)).unwrap_or(false))
        .collect();

    let mut latencies: Vec<u64> = successful.iter().map(|s| s.latency_ms).collect();
    latencies.sort_unstable();

    let average_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
    };
    let violations = samples.iter().filter(|s| !s.within_sla).count() as u32;

    LatencyStats {
        total: samples.len(),
        successful: successful.len(),
        availability_pct: successful.len() as f64 / samples.len() as f64 * 100.0,
        average_ms,
        p50_ms: percentile(&latencies, 0.50),
        p95_ms: percentile(&latencies, 0.95),
        p99_ms: percentile(&latencies, 0.99),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(latency_ms: u64, sla_ms: u64, ok: bool) -> PerformanceSample {
        PerformanceSample {
            timestamp: Utc::now(),
            endpoint: "/".to_string(),
            latency_ms,
            within_sla: ok && latency_ms <= sla_ms,
            status: if ok { Some(200) } else { None },
            content_length: 100,
        }
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 0.50), 50);
        assert_eq!(percentile(&sorted, 0.95), 95);
        assert_eq!(percentile(&sorted, 0.99), 99);
        assert_eq!(percentile(&[42], 0.95), 42);
        assert_eq!(percentile(&[], 0.95), 0);
    }

    #[test]
    fn aggregate_counts_violations_and_availability() {
        let samples = vec![
            sample(1800, 3000, true),
            sample(3200, 3000, true),
            sample(3400, 3000, true),
            sample(3100, 3000, true),
            sample(3500, 3000, true),
        ];
        let stats = aggregate(&samples);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.violations, 4);
        assert_eq!(stats.availability_pct, 100.0);
        assert_eq!(stats.average_ms, 3000.0);
        assert_eq!(stats.p50_ms, 3200);
        assert_eq!(stats.p99_ms, 3500);
    }

    #[test]
    fn failed_requests_count_against_availability() {
        let samples = vec![
            sample(500, 3000, true),
            sample(0, 3000, false),
            sample(600, 3000, true),
            sample(0, 3000, false),
        ];
        let stats = aggregate(&samples);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.availability_pct, 50.0);
        assert_eq!(stats.violations, 2);
        assert_eq!(stats.average_ms, 550.0);
    }

    #[test]
    fn empty_window_is_all_zeroes() {
        assert_eq!(aggregate(&[]), LatencyStats::empty());
    }
}

use serde::Serialize;

/// Latency statistics for one trial, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub messages_received: usize,
}

impl LatencySummary {
    /// `None` when there are no samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            avg_latency_ms: mean(&sorted),
            p99_latency_ms: percentile_sorted(&sorted, 99.0),
            messages_received: sorted.len(),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentile with linear interpolation between the two closest ranks,
/// rank = pct/100 * (n - 1). `sorted` must be ascending and non-empty.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_samples_have_no_summary() {
        assert_eq!(LatencySummary::from_samples(&[]), None);
    }

    #[test]
    fn hundred_evenly_spaced_samples() {
        let samples: Vec<f64> = (1..=100).map(|i| (i * 10) as f64).collect();
        let summary = LatencySummary::from_samples(&samples).expect("summary");
        assert!(approx(summary.avg_latency_ms, 505.0));
        assert!(approx(summary.p99_latency_ms, 990.1), "{}", summary.p99_latency_ms);
        assert_eq!(summary.messages_received, 100);
    }

    #[test]
    fn order_of_samples_does_not_matter() {
        let summary = LatencySummary::from_samples(&[4.0, 1.0, 3.0, 2.0]).expect("summary");
        assert!(approx(summary.avg_latency_ms, 2.5));
        assert!(approx(summary.p99_latency_ms, 3.97));
    }

    #[test]
    fn single_sample_is_its_own_percentile() {
        let summary = LatencySummary::from_samples(&[7.25]).expect("summary");
        assert_eq!(summary.p99_latency_ms, 7.25);
        assert_eq!(summary.messages_received, 1);
    }

    #[test]
    fn percentile_endpoints() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(percentile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(percentile_sorted(&sorted, 50.0), 2.0);
        assert_eq!(percentile_sorted(&sorted, 100.0), 3.0);
    }
}

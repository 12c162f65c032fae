use std::collections::VecDeque;
use std::time::{Duration, Instant};

use coursework_protocol::{TransferProgress, UNKNOWN_TOTAL};

/// Sums the progress of several transfers.
///
/// The combined total stays unknown while any member total is unknown.
pub fn combine_progress<I>(items: I) -> TransferProgress
where
    I: IntoIterator<Item = TransferProgress>,
{
    let mut combined = TransferProgress {
        bytes_sent: 0,
        bytes_total: 0,
    };
    let mut total_known = true;
    for p in items {
        combined.bytes_sent += p.bytes_sent;
        if p.bytes_total < 0 {
            total_known = false;
        } else {
            combined.bytes_total += p.bytes_total;
        }
    }
    if !total_known {
        combined.bytes_total = UNKNOWN_TOTAL;
    }
    combined
}

struct RateSample {
    sent: i64,
    at: Instant,
}

/// Estimates transfer rate from cumulative byte counts over a sliding window.
pub struct RateMeter {
    samples: VecDeque<RateSample>,
    window: Duration,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Records the cumulative number of bytes sent as of now.
    pub fn observe(&mut self, sent: i64) {
        self.observe_at(sent, Instant::now());
    }

    fn observe_at(&mut self, sent: i64, at: Instant) {
        self.samples.push_back(RateSample { sent, at });
        while let Some(front) = self.samples.front() {
            if at.duration_since(front.at) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second across the window, 0.0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.at.duration_since(first.at);
        if elapsed.is_zero() || last.sent <= first.sent {
            return 0.0;
        }
        (last.sent - first.sent) as f64 / elapsed.as_secs_f64()
    }

    /// Time left to send `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: i64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 || remaining < 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(sent: i64, total: i64) -> TransferProgress {
        TransferProgress {
            bytes_sent: sent,
            bytes_total: total,
        }
    }

    #[test]
    fn combine_known_totals() {
        let c = combine_progress([p(10, 100), p(50, 50)]);
        assert_eq!(c, p(60, 150));
    }

    #[test]
    fn combine_unknown_total_propagates() {
        let c = combine_progress([p(10, 100), p(5, -1)]);
        assert_eq!(c.bytes_sent, 15);
        assert_eq!(c.bytes_total, UNKNOWN_TOTAL);
    }

    #[test]
    fn combine_empty() {
        assert_eq!(combine_progress(Vec::new()), p(0, 0));
    }

    #[test]
    fn rate_needs_two_samples() {
        let mut meter = RateMeter::default();
        assert_eq!(meter.bytes_per_second(), 0.0);
        meter.observe(100);
        assert_eq!(meter.bytes_per_second(), 0.0);
        assert!(meter.eta(1000).is_none());
    }

    #[test]
    fn rate_from_cumulative_counts() {
        let mut meter = RateMeter::new(Duration::from_secs(10));
        let start = Instant::now();
        meter.observe_at(0, start);
        meter.observe_at(1000, start + Duration::from_secs(2));
        assert!((meter.bytes_per_second() - 500.0).abs() < 1e-9);
        assert_eq!(meter.eta(1000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn old_samples_leave_window() {
        let mut meter = RateMeter::new(Duration::from_secs(1));
        let start = Instant::now();
        meter.observe_at(0, start);
        meter.observe_at(100, start + Duration::from_secs(1));
        meter.observe_at(1100, start + Duration::from_secs(2));
        meter.observe_at(2100, start + Duration::from_secs(3));
        assert_eq!(meter.samples.len(), 2);
        assert!((meter.bytes_per_second() - 1000.0).abs() < 1e-9);
    }
}

//! Point-in-time view of cache metrics.

use std::fmt;
use std::time::Duration;

/// Copy of [`CacheMetrics`](super::CacheMetrics) counters at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// Requests that waited on another request's fetch.
    pub coalesced: u64,
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub bytes_fetched: u64,
    pub bytes_served: u64,
    pub client_errors: u64,
    pub server_errors: u64,
}

impl MetricsSnapshot {
    /// Fraction of tile lookups answered from local storage.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Fraction of misses that piggybacked on another request's fetch.
    pub fn coalescing_rate(&self) -> f64 {
        if self.misses == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.misses as f64
        }
    }

    /// Whether anything happened since startup.
    pub fn has_activity(&self) -> bool {
        self.requests > 0
    }

    /// Uptime formatted as `1h 2m 3s`.
    pub fn uptime_human(&self) -> String {
        let secs = self.uptime.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            format!("{}h {}m {}s", h, m, s)
        } else if m > 0 {
            format!("{}m {}s", m, s)
        } else {
            format!("{}s", s)
        }
    }

    /// Fetched volume formatted with a binary unit.
    pub fn bytes_fetched_human(&self) -> String {
        format_bytes(self.bytes_fetched)
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} requests | hit rate {:.0}% | {} fetched ({} failed) | coalescing {:.0}% | {} downloaded",
            self.uptime_human(),
            self.requests,
            self.hit_rate() * 100.0,
            self.fetches_succeeded,
            self.fetches_failed,
            self.coalescing_rate() * 100.0,
            self.bytes_fetched_human()
        )
    }
}

/// Format a byte count as B, KB, MB, or GB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_with_no_traffic() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.hit_rate(), 0.0);
        assert_eq!(snapshot.coalescing_rate(), 0.0);
        assert!(!snapshot.has_activity());
    }

    #[test]
    fn test_rates() {
        let snapshot = MetricsSnapshot {
            requests: 10,
            hits: 6,
            misses: 4,
            coalesced: 3,
            ..Default::default()
        };
        assert!((snapshot.hit_rate() - 0.6).abs() < f64::EPSILON);
        assert!((snapshot.coalescing_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uptime_human() {
        let mut snapshot = MetricsSnapshot {
            uptime: Duration::from_secs(42),
            ..Default::default()
        };
        assert_eq!(snapshot.uptime_human(), "42s");
        snapshot.uptime = Duration::from_secs(3725);
        assert_eq!(snapshot.uptime_human(), "1h 2m 5s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_display_mentions_counts() {
        let snapshot = MetricsSnapshot {
            requests: 7,
            fetches_succeeded: 2,
            fetches_failed: 1,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.contains("7 requests"));
        assert!(text.contains("2 fetched (1 failed)"));
    }
}

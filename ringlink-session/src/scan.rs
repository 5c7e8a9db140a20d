//! Scan diagnostics: per-address throttled discovery log lines

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks what a scan has seen so discovery lines stay readable.
///
/// Throttling only affects logging; matching the target is done by the
/// engine on every discovery.
#[derive(Debug)]
pub struct ScanTrigger {
    throttle: Duration,
    started_at: Instant,
    last_logged: HashMap<String, Instant>,
    unique_seen: usize,
}

impl ScanTrigger {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            started_at: Instant::now(),
            last_logged: HashMap::new(),
            unique_seen: 0,
        }
    }

    /// Reset for a new scan starting at `now`
    pub fn begin(&mut self, now: Instant) {
        self.started_at = now;
        self.last_logged.clear();
        self.unique_seen = 0;
    }

    /// Number of distinct addresses seen since the scan began
    pub fn unique_seen(&self) -> usize {
        self.unique_seen
    }

    /// Record a discovery; returns a log line unless this address was logged
    /// less than the throttle interval ago.
    pub fn observe(
        &mut self,
        address: &str,
        name: Option<&str>,
        rssi: Option<i16>,
        now: Instant,
    ) -> Option<String> {
        let due = match self.last_logged.get(address) {
            None => {
                self.unique_seen += 1;
                true
            }
            Some(last) => now.saturating_duration_since(*last) >= self.throttle,
        };
        if !due {
            return None;
        }
        self.last_logged.insert(address.to_string(), now);

        let t = now.saturating_duration_since(self.started_at).as_secs_f64();
        let rssi = rssi.map_or_else(|| "n/a".to_string(), |r| r.to_string());
        let name = match name {
            Some(n) if !n.trim().is_empty() => n,
            _ => "<no-name>",
        };
        Some(format!(
            "scan t={t:.1}s rssi={rssi:>4} addr={address} name={name}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttles_per_address() {
        let start = Instant::now();
        let mut scan = ScanTrigger::new(Duration::from_millis(1500));
        scan.begin(start);

        let line = scan.observe("AA:BB", Some("Ring"), Some(-60), start).unwrap();
        assert_eq!(line, "scan t=0.0s rssi= -60 addr=AA:BB name=Ring");

        let soon = start + Duration::from_millis(500);
        assert!(scan.observe("AA:BB", Some("Ring"), Some(-61), soon).is_none());
        assert!(scan.observe("CC:DD", None, None, soon).is_some());
        assert_eq!(scan.unique_seen(), 2);

        let later = start + Duration::from_millis(1600);
        let line = scan.observe("AA:BB", Some(""), Some(-58), later).unwrap();
        assert_eq!(line, "scan t=1.6s rssi= -58 addr=AA:BB name=<no-name>");
        assert_eq!(scan.unique_seen(), 2);
    }

    #[test]
    fn begin_clears_table() {
        let start = Instant::now();
        let mut scan = ScanTrigger::new(Duration::from_secs(60));
        scan.begin(start);
        scan.observe("AA:BB", None, None, start);
        scan.begin(start);
        assert_eq!(scan.unique_seen(), 0);
        assert!(scan.observe("AA:BB", None, None, start).is_some());
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Callers tracked before idle windows are swept.
const SWEEP_THRESHOLD: usize = 4_096;

/// Sliding-window limiter keyed by caller IP.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl IpRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, ip: &str) -> bool {
        self.allow_at(ip, Instant::now())
    }

    fn allow_at(&self, ip: &str, now: Instant) -> bool {
        let window = self.window;
        let expired = |seen: &Instant| now.saturating_duration_since(*seen) > window;

        let mut windows = self.windows.lock();
        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, hits| hits.back().is_some_and(|last| !expired(last)));
        }

        let hits = windows.entry(ip.to_string()).or_default();
        while hits.front().is_some_and(expired) {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            return false;
        }

        hits.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_each_ip_within_the_window() {
        let limiter = IpRateLimiter::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        assert!(limiter.allow_at("203.0.113.7", start));
        assert!(limiter.allow_at("203.0.113.7", start));
        assert!(!limiter.allow_at("203.0.113.7", start));
        assert!(limiter.allow_at("198.51.100.1", start));

        let later = start + Duration::from_secs(61);
        assert!(limiter.allow_at("203.0.113.7", later));
    }
}

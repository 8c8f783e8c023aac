use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window request counter keyed per caller.
///
/// State lives in this process only; several instances each enforce their own window.
pub struct RateLimiter<K> {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit and returns whether it is within the limit.
    pub fn check(&self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &K, now: Instant) -> bool {
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = hits.entry(key.clone()).or_default();
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.max_requests {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drops keys with no hit inside the window.
    pub fn purge(&self) {
        let now = Instant::now();
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_over_limit_then_recovers() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        let key = "seller";

        for i in 0..3 {
            assert!(limiter.check_at(&key, start + Duration::from_secs(i)));
        }
        assert!(!limiter.check_at(&key, start + Duration::from_secs(10)));
        assert!(limiter.check_at(&"other", start + Duration::from_secs(10)));

        // first hit leaves the window
        assert!(limiter.check_at(&key, start + Duration::from_secs(60)));
        assert!(!limiter.check_at(&key, start + Duration::from_secs(61)));
    }

    #[test]
    fn rejected_hits_do_not_extend_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at(&1u8, start));
        assert!(!limiter.check_at(&1u8, start + Duration::from_secs(5)));
        assert!(limiter.check_at(&1u8, start + Duration::from_secs(10)));
    }
}

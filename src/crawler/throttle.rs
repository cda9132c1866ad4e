//! Per-host request throttling
//!
//! For each host the throttle stores the earliest instant the next request
//! may begin. Acquiring a slot returns how long the caller must sleep and
//! pushes the host's next-available time forward, so concurrent workers
//! serialize their waits without holding the lock while sleeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct HostThrottle {
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl HostThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next slot for `host` with the given minimum interval.
    ///
    /// Returns the duration the caller must sleep before issuing its request.
    /// A zero `delay` never waits.
    pub fn acquire(&self, host: &str, delay: Duration) -> Duration {
        if delay.is_zero() {
            return Duration::ZERO;
        }

        let now = Instant::now();
        let mut hosts = self.next_allowed.lock().expect("throttle lock poisoned");

        let slot = hosts.entry(host.to_string()).or_insert(now);
        if *slot > now {
            let wait = *slot - now;
            *slot += delay;
            wait
        } else {
            *slot = now + delay;
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_never_waits() {
        let throttle = HostThrottle::new();
        assert_eq!(
            throttle.acquire("example.com", Duration::ZERO),
            Duration::ZERO
        );
        assert_eq!(
            throttle.acquire("example.com", Duration::ZERO),
            Duration::ZERO
        );
    }

    #[test]
    fn test_first_acquire_is_free() {
        let throttle = HostThrottle::new();
        let wait = throttle.acquire("example.com", Duration::from_millis(100));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn test_second_acquire_waits() {
        let throttle = HostThrottle::new();
        throttle.acquire("example.com", Duration::from_millis(100));
        let wait = throttle.acquire("example.com", Duration::from_millis(100));
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(100));
    }

    #[test]
    fn test_waits_accumulate_per_caller() {
        let throttle = HostThrottle::new();
        throttle.acquire("example.com", Duration::from_millis(100));
        let second = throttle.acquire("example.com", Duration::from_millis(100));
        let third = throttle.acquire("example.com", Duration::from_millis(100));
        assert!(third > second);
    }

    #[test]
    fn test_hosts_are_independent() {
        let throttle = HostThrottle::new();
        throttle.acquire("a.example.com", Duration::from_millis(100));
        let wait = throttle.acquire("b.example.com", Duration::from_millis(100));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn test_slot_expires() {
        let throttle = HostThrottle::new();
        throttle.acquire("example.com", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let wait = throttle.acquire("example.com", Duration::from_millis(1));
        assert_eq!(wait, Duration::ZERO);
    }
}

//! System-wide spacing between outgoing requests.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Admission gate shared by every worker of one backend.
///
/// Callers are serialized: each `wait` returns no earlier than `spacing` after
/// the previous one returned.
#[derive(Debug)]
pub struct RequestThrottle {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    /// Block until a request may be sent.
    pub fn wait(&self) {
        // The guarded value is a timestamp; a poisoned lock still holds a usable one.
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let ready_at = previous + self.spacing;
            let now = Instant::now();
            if ready_at > now {
                let delay = ready_at - now;
                trace!(delay_ms = delay.as_millis() as u64, "throttling request");
                thread::sleep(delay);
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_request_is_immediate() {
        let throttle = RequestThrottle::new(Duration::from_secs(60));
        let start = Instant::now();
        throttle.wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn requests_are_spaced_across_threads() {
        let throttle = Arc::new(RequestThrottle::new(Duration::from_millis(30)));
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                thread::spawn(move || throttle.wait())
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter backed by a fixed ring of timestamps.
///
/// The ring holds the last `n` request times. A caller waits until the
/// oldest slot is at least `window` old, then claims it by writing the
/// current time and advancing the oldest index. The catalog limiter is
/// `Limiter::catalog()` (5 requests per 10 s); every catalog call in the
/// pipeline goes through one shared instance.
#[derive(Debug)]
pub struct Limiter {
    window: Duration,
    ring: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Instant>>,
    oldest: usize,
}

impl Limiter {
    pub fn new(window: Duration, burst: usize) -> Self {
        assert!(burst > 0, "limiter burst must be non-zero");
        Self {
            window,
            ring: Mutex::new(Ring {
                slots: vec![None; burst],
                oldest: 0,
            }),
        }
    }

    /// The shared catalog limiter: 5 requests per 10 second window.
    pub fn catalog() -> Self {
        Self::new(Duration::from_secs(10), 5)
    }

    /// The MAL search limiter: 20 requests per second.
    pub fn mal() -> Self {
        Self::new(Duration::from_secs(1), 20)
    }

    /// Wait for a slot, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait_for = {
                let mut ring = self.ring.lock().await;
                let oldest = ring.oldest;
                match ring.slots[oldest] {
                    Some(t) if t.elapsed() < self.window => Some(self.window - t.elapsed()),
                    _ => {
                        ring.slots[oldest] = Some(Instant::now());
                        ring.oldest = (oldest + 1) % ring.slots.len();
                        None
                    }
                }
            };
            match wait_for {
                Some(d) => tokio::time::sleep(d).await,
                None => return,
            }
        }
    }
}

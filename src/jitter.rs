//! Bounded random work durations for the demonstrations
//!
//! The sleeps only make interleavings visible; nothing depends on their
//! values. A seeded xorshift64 keeps runs reproducible with `--seed`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-worker source of jittered durations
#[derive(Debug, Clone)]
pub struct Jitter {
    state: u64,
}

impl Jitter {
    /// Create a generator from a seed (0 is replaced with 1)
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Create a generator seeded from the system clock
    #[must_use]
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        #[allow(clippy::cast_possible_truncation)]
        Self::new(nanos as u64)
    }

    /// Derive an independent stream for worker `id`
    #[must_use]
    pub fn fork(&self, id: usize) -> Self {
        // splitmix64 finalizer keeps neighbouring ids apart
        let mut z = self
            .state
            .wrapping_add((id as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self::new(z ^ (z >> 31))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Duration uniformly picked from `[min, max]` at millisecond resolution
    ///
    /// Returns `min` when `max <= min`.
    pub fn between(&mut self, min: Duration, max: Duration) -> Duration {
        let low = min.as_millis();
        let high = max.as_millis();
        if high <= low {
            return min;
        }
        let span = u64::try_from(high - low).unwrap_or(u64::MAX).saturating_add(1);
        min + Duration::from_millis(self.next_u64() % span)
    }
}

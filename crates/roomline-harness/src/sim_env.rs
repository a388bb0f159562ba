//! Virtual-time environment.
//!
//! Time only moves when someone sleeps or calls [`SimEnv::advance`], and
//! randomness comes from a seeded ChaCha stream, so a run is a pure function
//! of its seed and script.

use std::{
    ops::Sub,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roomline_core::{Environment, Timestamp};

/// Wall-clock time at virtual instant zero (2023-11-14T22:13:20Z).
const EPOCH_SECS: i64 = 1_700_000_000;

/// Instant on the virtual clock, in milliseconds since the run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(u64);

impl SimInstant {
    /// Milliseconds since the run started.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Instant `duration` later.
    #[must_use]
    pub fn after(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

/// Deterministic environment shared by every simulated component.
///
/// Clones share one clock and one RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
    epoch: Timestamp,
}

impl SimEnv {
    /// Environment at virtual time zero with RNG seeded by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(AtomicU64::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: DateTime::<Utc>::from_timestamp(EPOCH_SECS, 0).unwrap_or_default(),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.clock.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Wall-clock time at virtual instant zero.
    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    /// Virtual time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.clock.load(Ordering::SeqCst))
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.clock.load(Ordering::SeqCst))
    }

    fn wall_clock(&self) -> Timestamp {
        let elapsed = chrono::Duration::milliseconds(self.clock.load(Ordering::SeqCst) as i64);
        self.epoch + elapsed
    }

    /// Advances the clock by `duration`, then yields once so other simulated
    /// tasks get polled.
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_eq!(a.random_u64(), b.random_u64());

        let c = SimEnv::with_seed(43);
        assert_ne!(SimEnv::with_seed(42).random_u64(), c.random_u64());
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::with_seed(0);
        let other = env.clone();
        let start = env.now();

        other.advance(Duration::from_millis(1500));

        assert_eq!(env.now() - start, Duration::from_millis(1500));
        assert_eq!(env.wall_clock().timestamp(), EPOCH_SECS + 1);
    }

    #[tokio::test]
    async fn sleep_advances_virtual_time() {
        let env = SimEnv::with_seed(0);
        env.sleep(Duration::from_secs(3)).await;
        assert_eq!(env.elapsed(), Duration::from_secs(3));
        assert_eq!(env.now().as_millis(), 3000);
    }
}

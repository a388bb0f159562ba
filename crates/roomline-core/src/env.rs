//! Environment abstraction for deterministic testing.
//!
//! Decouples chat logic from system resources (time, randomness). Simulation
//! supplies a virtual clock and seeded RNG; production uses the system.

use std::time::Duration;

use crate::message::Timestamp;

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - the same seed produces the same `random_bytes()` sequence in simulation
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses a virtual instant.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time. Drives timeouts, heartbeats and backoff.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time. Stamped on composed messages and system
    /// notices; never used for ordering.
    fn wall_clock(&self) -> Timestamp;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines never do.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

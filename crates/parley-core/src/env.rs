//! Environment abstraction for deterministic testing.
//!
//! Decouples the engine from system time. Production uses the real clock;
//! tests drive a manual clock, which makes the rate-gate window and message
//! timestamps fully deterministic.

use std::time::Duration;

/// Abstract environment providing monotonic and wall-clock time.
///
/// # Invariants
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time, Unix milliseconds (UTC).
    ///
    /// Only used to stamp outbound chat messages; never compared against
    /// `now()`.
    fn wall_clock_ms(&self) -> i64;
}

//! Deterministic degraded-network ("handover") predicate.
//!
//! The trigger instants are an empirically chosen table, kept verbatim as
//! data rather than reverse-engineered into a formula. The predicate depends
//! only on elapsed time since process start, so every concurrent request
//! observes the same simulated network condition at a given moment.

use std::time::Duration;

/// Seconds after process start at which a handover period is centered.
/// Mostly every 15 seconds, but not a strict arithmetic sequence.
const HANDOVER_INSTANTS_S: [u64; 25] = [
    12, 27, 42, 57, 72, 87, 102, 117, 132, 147, 162, 177, 192, 207, 222, 237, 252, 267, 282, 297,
    312, 327, 342, 357, 373,
];

/// Half-width of each handover window.
const HANDOVER_TOLERANCE_MS: u64 = 1000;

/// True while `elapsed` since process start is within ±1s of a trigger
/// instant. Pure: identical elapsed time always yields identical state.
pub fn is_handover_period(elapsed: Duration) -> bool {
    let elapsed_ms = elapsed.as_millis() as u64;
    HANDOVER_INSTANTS_S.iter().any(|&instant_s| {
        let center_ms = instant_s * 1000;
        elapsed_ms + HANDOVER_TOLERANCE_MS > center_ms
            && elapsed_ms < center_ms + HANDOVER_TOLERANCE_MS
    })
}

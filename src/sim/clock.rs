//! Live clock and availability-window calculator.
//!
//! Maps an absolute wall-clock instant onto live-stream coordinates for a
//! given simulation configuration. All arithmetic is integer milliseconds so
//! segment boundaries never drift, no matter how long the simulated stream
//! has been running.

use crate::error::SimError;
use crate::sim::url_cfg::SimulationConfig;

/// Live-stream coordinates for one request instant.
///
/// Derived, never persisted: `now` differs on every request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveWindow {
    /// Index of the segment whose media interval contains `now`.
    pub segment_index: u64,
    /// Media time (ms since availability start) where that segment begins.
    pub segment_start_ms: u64,
    /// Media time where that segment ends.
    pub segment_end_ms: u64,
    /// Earliest media time still inside the time-shift buffer.
    pub tsb_start_ms: u64,
    /// Publish time for a manifest generated at this instant (= now).
    pub publish_time_ms: u64,
    /// Availability start time (= stream start epoch) in ms.
    pub availability_start_ms: u64,
}

/// Availability of one specific segment number at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentAvailability {
    Available,
    /// The segment has not (fully) entered the live window yet.
    TooEarly { remaining_ms: u64 },
    /// The segment has fallen out of the time-shift buffer.
    TooOld,
}

/// Compute the live window for `now`.
///
/// Fails with `TooEarly` when `now` precedes the stream start; the error
/// carries exactly `start − now` milliseconds so the caller can advertise a
/// retry time.
pub fn live_window(
    cfg: &SimulationConfig,
    now_ms: u64,
    segment_duration_ms: u64,
) -> Result<LiveWindow, SimError> {
    if segment_duration_ms == 0 {
        return Err(SimError::Unexpected(
            "asset has zero segment duration".to_string(),
        ));
    }
    let start_ms = cfg.start_time_ms();
    if now_ms < start_ms {
        return Err(SimError::TooEarly {
            remaining_ms: start_ms - now_ms,
        });
    }

    let elapsed_ms = now_ms - start_ms;
    let segment_index = elapsed_ms / segment_duration_ms;
    let segment_start_ms = segment_index * segment_duration_ms;
    let segment_end_ms = segment_start_ms
        .checked_add(segment_duration_ms)
        .ok_or_else(|| {
            SimError::InvalidConfiguration("now is beyond the addressable timeline".to_string())
        })?;

    Ok(LiveWindow {
        segment_index,
        segment_start_ms,
        segment_end_ms,
        tsb_start_ms: elapsed_ms.saturating_sub(cfg.timeshift_buffer_depth_ms()),
        publish_time_ms: now_ms,
        availability_start_ms: start_ms,
    })
}

/// Check whether segment `nr` may be served at `now`.
///
/// With `full_availability` the segment must be completely produced on the
/// simulated timeline (`now ≥ start + (nr+1)·dur`); otherwise a partially
/// produced segment is acceptable (`now ≥ start + nr·dur`), which feeds the
/// chunked delivery path.
///
/// `nr` comes straight off the URL; a number whose media interval cannot be
/// represented in 64-bit milliseconds does not exist on any timeline.
pub fn segment_availability(
    cfg: &SimulationConfig,
    now_ms: u64,
    segment_duration_ms: u64,
    nr: u64,
    full_availability: bool,
) -> Result<SegmentAvailability, SimError> {
    let start_ms = cfg.start_time_ms();
    let end_media_ms = nr
        .checked_add(1)
        .and_then(|n| n.checked_mul(segment_duration_ms))
        .ok_or_else(|| unaddressable(nr))?;
    let produced_at_ms = if full_availability {
        start_ms.checked_add(end_media_ms)
    } else {
        start_ms.checked_add(nr * segment_duration_ms)
    }
    .ok_or_else(|| unaddressable(nr))?;
    if now_ms < produced_at_ms {
        return Ok(SegmentAvailability::TooEarly {
            remaining_ms: produced_at_ms - now_ms,
        });
    }

    let elapsed_ms = now_ms - start_ms;
    let tsb_start_ms = elapsed_ms.saturating_sub(cfg.timeshift_buffer_depth_ms());
    if end_media_ms < tsb_start_ms {
        return Ok(SegmentAvailability::TooOld);
    }

    Ok(SegmentAvailability::Available)
}

fn unaddressable(nr: u64) -> SimError {
    SimError::NotFound(format!("segment {nr} is beyond the addressable timeline"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_S: u64 = 1_700_000_000;
    const START_MS: u64 = START_S * 1000;
    const SEG_DUR_MS: u64 = 4000;

    fn cfg() -> SimulationConfig {
        SimulationConfig {
            content_path: "testpic/stream.mpd".to_string(),
            url_prefix: "/livesim".to_string(),
            start_time_s: START_S,
            timeshift_buffer_depth_s: 60,
            minimum_update_period_s: 6,
            availability_time_complete: true,
            chunk_dur_ms: None,
            loop_enabled: true,
        }
    }

    #[test]
    fn before_start_reports_exact_remaining_time() {
        let err = live_window(&cfg(), START_MS - 2500, SEG_DUR_MS).unwrap_err();
        match err {
            SimError::TooEarly { remaining_ms } => assert_eq!(remaining_ms, 2500),
            other => panic!("expected TooEarly, got {other:?}"),
        }
    }

    #[test]
    fn window_at_nine_seconds() {
        let w = live_window(&cfg(), START_MS + 9000, SEG_DUR_MS).unwrap();
        assert_eq!(w.segment_index, 2);
        assert_eq!(w.segment_start_ms, 8000);
        assert_eq!(w.segment_end_ms, 12000);
        assert_eq!(w.publish_time_ms, START_MS + 9000);
        assert_eq!(w.availability_start_ms, START_MS);
        // Nine seconds in, the whole stream is still inside the buffer.
        assert_eq!(w.tsb_start_ms, 0);
    }

    #[test]
    fn segment_index_is_monotonic_in_now() {
        let mut last = 0;
        for offset_ms in (0..120_000).step_by(777) {
            let w = live_window(&cfg(), START_MS + offset_ms, SEG_DUR_MS).unwrap();
            assert!(w.segment_index >= last, "index decreased at +{offset_ms}ms");
            last = w.segment_index;
        }
    }

    #[test]
    fn tsb_start_tracks_now_minus_depth() {
        let w = live_window(&cfg(), START_MS + 100_000, SEG_DUR_MS).unwrap();
        assert_eq!(w.tsb_start_ms, 100_000 - 60_000);
    }

    #[test]
    fn full_availability_at_nine_seconds_is_too_early() {
        // Segment 2 spans [8000, 12000); at +9000 only part of it exists.
        let a = segment_availability(&cfg(), START_MS + 9000, SEG_DUR_MS, 2, true).unwrap();
        assert_eq!(a, SegmentAvailability::TooEarly { remaining_ms: 3000 });
    }

    #[test]
    fn full_availability_at_segment_end_exactly() {
        let a = segment_availability(&cfg(), START_MS + 12000, SEG_DUR_MS, 2, true).unwrap();
        assert_eq!(a, SegmentAvailability::Available);
    }

    #[test]
    fn partial_availability_at_segment_start() {
        let a = segment_availability(&cfg(), START_MS + 8000, SEG_DUR_MS, 2, false).unwrap();
        assert_eq!(a, SegmentAvailability::Available);

        let a = segment_availability(&cfg(), START_MS + 7999, SEG_DUR_MS, 2, false).unwrap();
        assert_eq!(a, SegmentAvailability::TooEarly { remaining_ms: 1 });
    }

    #[test]
    fn segment_outside_buffer_is_too_old() {
        // At +100s with a 60s buffer, media before 40s is gone. Segment 0
        // ends at 4000ms < 40000ms.
        let a = segment_availability(&cfg(), START_MS + 100_000, SEG_DUR_MS, 0, true).unwrap();
        assert_eq!(a, SegmentAvailability::TooOld);

        // Segment 10 ends at 44000ms, still inside.
        let a = segment_availability(&cfg(), START_MS + 100_000, SEG_DUR_MS, 10, true).unwrap();
        assert_eq!(a, SegmentAvailability::Available);
    }

    #[test]
    fn request_before_stream_start_is_too_early() {
        let a = segment_availability(&cfg(), START_MS - 1000, SEG_DUR_MS, 0, true).unwrap();
        assert_eq!(
            a,
            SegmentAvailability::TooEarly {
                remaining_ms: 5000
            }
        );
    }

    #[test]
    fn absurd_segment_numbers_do_not_exist() {
        for nr in [u64::MAX, u64::MAX / SEG_DUR_MS] {
            let err =
                segment_availability(&cfg(), START_MS + 12_000, SEG_DUR_MS, nr, true).unwrap_err();
            assert!(matches!(err, SimError::NotFound(_)), "nr = {nr}");
            let err =
                segment_availability(&cfg(), START_MS + 12_000, SEG_DUR_MS, nr, false).unwrap_err();
            assert!(matches!(err, SimError::NotFound(_)), "nr = {nr}");
        }
    }

    #[test]
    fn window_at_the_edge_of_representable_time() {
        let mut c = cfg();
        c.start_time_s = 0;
        let err = live_window(&c, u64::MAX, SEG_DUR_MS).unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration(_)));
    }
}

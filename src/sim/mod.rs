//! Pure time-mapping core: URL-encoded simulation options, the live clock,
//! and the deterministic handover (degraded-network) predicate.
//!
//! Nothing in this module touches the wall clock, the filesystem, or the
//! network — `now` is always an explicit parameter so every computation is
//! reproducible under test.

pub mod clock;
pub mod handover;
pub mod url_cfg;

pub use clock::{live_window, segment_availability, LiveWindow, SegmentAvailability};
pub use handover::is_handover_period;
pub use url_cfg::{parse_url_config, SimulationConfig};

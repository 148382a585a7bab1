//! Simulated live MPEG-DASH origin.
//!
//! Serves static VoD assets as an endless, wall-clock-driven live stream:
//! static manifests are converted to dynamic ones on the fly and VoD media
//! segments are re-stamped onto the live timeline at request time.

pub mod asset;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fmp4;
pub mod metrics;
pub mod mpd;
pub mod server;
pub mod sim;

//! Dynamic manifest generation.

pub mod live;

pub use live::{live_mpd, render_mpd};

//! URL configuration parser.
//!
//! A request path like
//!
//! ```text
//! /livesim/start_1700000000/tsbd_300/chunkdur_500/testpic/stream.mpd
//! ```
//!
//! carries the simulation options as leading `key_value` path segments; the
//! remainder is the content part (asset path + file). Parsing is a pure
//! function of the path and the process defaults.

use crate::config::Config;
use crate::error::SimError;

/// Per-request simulation configuration decoded from the URL.
///
/// Immutable after parsing; scope is a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Asset path plus file, relative to the VoD root (no leading slash).
    pub content_path: String,
    /// Request path prefix including the route name and all option segments,
    /// used when regenerating absolute BaseURLs.
    pub url_prefix: String,
    /// Stream start epoch in seconds.
    pub start_time_s: u64,
    /// Time-shift buffer depth in seconds.
    pub timeshift_buffer_depth_s: u64,
    /// MPD minimum update period in seconds.
    pub minimum_update_period_s: u64,
    /// Full-availability semantics: a segment is advertised only once it is
    /// completely "encoded" on the simulated live timeline.
    pub availability_time_complete: bool,
    /// Chunked low-latency capability with the nominal chunk duration in ms.
    pub chunk_dur_ms: Option<u64>,
    /// Wrap the VoD timeline modulo its segment count instead of ending.
    pub loop_enabled: bool,
}

impl SimulationConfig {
    /// `parse_url_config` rejects second values that do not fit in ms, so
    /// these never wrap on parser-produced configurations.
    pub fn start_time_ms(&self) -> u64 {
        self.start_time_s.saturating_mul(1000)
    }

    pub fn timeshift_buffer_depth_ms(&self) -> u64 {
        self.timeshift_buffer_depth_s.saturating_mul(1000)
    }
}

/// Parse the wildcard remainder of a `/livesim/...` request path.
///
/// `path` is the part after `/livesim/`. Recognized option segments are
/// consumed from the front; the first segment that is not a known
/// `key_value` option starts the content part. Duplicate options and
/// contradictory values fail with `InvalidConfiguration`.
pub fn parse_url_config(path: &str, defaults: &Config) -> Result<SimulationConfig, SimError> {
    let mut start_time_s = None;
    let mut timeshift_buffer_depth_s = None;
    let mut minimum_update_period_s = None;
    let mut availability_time_complete = None;
    let mut chunk_dur_ms = None;
    let mut loop_enabled = None;

    let mut url_prefix = String::from("/livesim");
    let segments: Vec<&str> = path.split('/').collect();
    let mut content_start = 0;

    for seg in &segments {
        let Some((key, value)) = seg.split_once('_') else {
            break;
        };
        let consumed = match key {
            "start" => {
                set_once(&mut start_time_s, parse_u64(seg, value)?, seg)?;
                true
            }
            "tsbd" => {
                set_once(&mut timeshift_buffer_depth_s, parse_u64(seg, value)?, seg)?;
                true
            }
            "mup" => {
                set_once(&mut minimum_update_period_s, parse_u64(seg, value)?, seg)?;
                true
            }
            "atc" => {
                set_once(&mut availability_time_complete, parse_flag(seg, value)?, seg)?;
                true
            }
            "loop" => {
                set_once(&mut loop_enabled, parse_flag(seg, value)?, seg)?;
                true
            }
            "chunkdur" => {
                let dur = parse_u64(seg, value)?;
                if dur == 0 {
                    return Err(SimError::InvalidConfiguration(
                        "chunkdur must be a positive number of milliseconds".to_string(),
                    ));
                }
                set_once(&mut chunk_dur_ms, dur, seg)?;
                true
            }
            _ => false,
        };
        if !consumed {
            break;
        }
        content_start += 1;
    }

    for seg in &segments[..content_start] {
        url_prefix.push('/');
        url_prefix.push_str(seg);
    }

    let content_path = segments[content_start..].join("/");
    if content_path.is_empty() {
        return Err(SimError::InvalidConfiguration(
            "no content path after simulation options".to_string(),
        ));
    }

    let start_time_s = start_time_s.unwrap_or(defaults.default_start_time_s);
    let timeshift_buffer_depth_s =
        timeshift_buffer_depth_s.unwrap_or(defaults.timeshift_buffer_depth_s);
    // Both values are multiplied into milliseconds downstream; reject
    // anything that cannot be represented there.
    if start_time_s.checked_mul(1000).is_none() {
        return Err(SimError::InvalidConfiguration(format!(
            "start time {start_time_s}s is beyond the addressable timeline"
        )));
    }
    if timeshift_buffer_depth_s.checked_mul(1000).is_none() {
        return Err(SimError::InvalidConfiguration(format!(
            "time-shift buffer depth {timeshift_buffer_depth_s}s is beyond the addressable timeline"
        )));
    }

    Ok(SimulationConfig {
        content_path,
        url_prefix,
        start_time_s,
        timeshift_buffer_depth_s,
        minimum_update_period_s: minimum_update_period_s
            .unwrap_or(defaults.minimum_update_period_s),
        availability_time_complete: availability_time_complete.unwrap_or(true),
        chunk_dur_ms,
        loop_enabled: loop_enabled.unwrap_or(true),
    })
}

fn set_once<T>(slot: &mut Option<T>, value: T, seg: &str) -> Result<(), SimError> {
    if slot.is_some() {
        return Err(SimError::InvalidConfiguration(format!(
            "duplicate option '{seg}'"
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_u64(seg: &str, value: &str) -> Result<u64, SimError> {
    value
        .parse()
        .map_err(|_| SimError::InvalidConfiguration(format!("bad numeric option '{seg}'")))
}

fn parse_flag(seg: &str, value: &str) -> Result<bool, SimError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(SimError::InvalidConfiguration(format!(
            "bad flag option '{seg}', expected 0 or 1"
        ))),
    }
}

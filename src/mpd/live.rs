//! Static-to-dynamic MPD conversion.
//!
//! The static VoD manifest is parsed once at asset load; every request
//! clones it and patches the live-specific attributes for the request
//! instant. The output is a pure function of (asset, simulation options,
//! now), so identical requests produce byte-identical manifests.

use std::time::Duration;

use chrono::DateTime;
use dash_mpd::{BaseURL, SegmentTemplate, SegmentTimeline, UTCTiming, MPD, S};

use crate::asset::Asset;
use crate::config::Config;
use crate::error::{Result, SimError};
use crate::sim::{live_window, SimulationConfig};

const UTC_TIMING_SCHEME: &str = "urn:mpeg:dash:utc:http-iso:2014";
const UTC_TIMING_URL: &str = "https://time.akamai.com/?iso&ms";

/// Convert one of the asset's static manifests into a dynamic one for `now`.
pub fn live_mpd(
    asset: &Asset,
    mpd_name: &str,
    sim: &SimulationConfig,
    server: &Config,
    now_ms: u64,
) -> Result<MPD> {
    let mut mpd = asset
        .manifests
        .get(mpd_name)
        .ok_or_else(|| SimError::NotFound(format!("{}/{mpd_name}", asset.asset_path)))?
        .clone();

    let segdur_ms = asset.segment_duration_ms;
    let window = live_window(sim, now_ms, segdur_ms)?;
    let elapsed_ms = now_ms - window.availability_start_ms;

    // Chunked capability relaxes availability: the segment being produced is
    // already advertised because its first chunks arrive before it completes.
    let full_availability = sim.availability_time_complete && sim.chunk_dur_ms.is_none();
    let last_nr = if full_availability {
        let produced = elapsed_ms / segdur_ms;
        if produced == 0 {
            return Err(SimError::TooEarly {
                remaining_ms: segdur_ms - elapsed_ms,
            });
        }
        produced - 1
    } else {
        window.segment_index
    };
    // A non-looping timeline ends with the VoD asset; never advertise
    // numbers the delivery path would refuse.
    let last_nr = if sim.loop_enabled {
        last_nr
    } else {
        last_nr.min(asset.segment_count - 1)
    };
    let first_nr = window
        .tsb_start_ms
        .div_ceil(segdur_ms)
        .saturating_sub(1)
        .min(last_nr);

    mpd.mpdtype = Some("dynamic".to_string());
    mpd.availabilityStartTime = DateTime::from_timestamp_millis(window.availability_start_ms as i64);
    mpd.publishTime = DateTime::from_timestamp_millis(window.publish_time_ms as i64);
    mpd.minimumUpdatePeriod = Some(Duration::from_secs(sim.minimum_update_period_s));
    mpd.timeShiftBufferDepth = Some(Duration::from_secs(sim.timeshift_buffer_depth_s));
    mpd.mediaPresentationDuration = None;
    mpd.UTCTiming = vec![UTCTiming {
        schemeIdUri: Some(UTC_TIMING_SCHEME.to_string()),
        value: Some(UTC_TIMING_URL.to_string()),
        ..Default::default()
    }];

    if let (Some(scheme), Some(host)) = (&server.scheme, &server.host) {
        mpd.base_url = vec![BaseURL {
            base: format!("{scheme}://{host}{}/{}/", sim.url_prefix, asset.asset_path),
            ..Default::default()
        }];
    }

    for period in &mut mpd.periods {
        period.start = Some(Duration::ZERO);
        period.duration = None;
        for adaptation in &mut period.adaptations {
            if let Some(template) = adaptation.SegmentTemplate.as_mut() {
                patch_template(template, sim, segdur_ms, first_nr, last_nr)?;
            }
            for representation in &mut adaptation.representations {
                if let Some(template) = representation.SegmentTemplate.as_mut() {
                    patch_template(template, sim, segdur_ms, first_nr, last_nr)?;
                }
            }
        }
    }

    Ok(mpd)
}

/// Rewrite one SegmentTemplate for live addressing.
///
/// Live segment numbers start at 0 at the availability start time, so the
/// player's `$Number$` arithmetic lands on the same indices the server
/// computes from the wall clock.
fn patch_template(
    template: &mut SegmentTemplate,
    sim: &SimulationConfig,
    segdur_ms: u64,
    first_nr: u64,
    last_nr: u64,
) -> Result<()> {
    template.startNumber = Some(0);
    template.presentationTimeOffset = None;

    if let Some(chunk_ms) = sim.chunk_dur_ms {
        if chunk_ms >= segdur_ms {
            return Err(SimError::InvalidConfiguration(format!(
                "chunk duration {chunk_ms}ms must be shorter than the segment duration {segdur_ms}ms"
            )));
        }
        template.availabilityTimeOffset = Some((segdur_ms - chunk_ms) as f64 / 1000.0);
        template.availabilityTimeComplete = Some(false);
    }

    if template.SegmentTimeline.is_some() {
        let duration_pts = template
            .duration
            .ok_or_else(|| {
                SimError::Conversion("SegmentTimeline without a template duration".to_string())
            })? as u64;
        let first_t = first_nr.checked_mul(duration_pts).ok_or_else(|| {
            SimError::InvalidConfiguration("now is beyond the addressable timeline".to_string())
        })?;
        template.SegmentTimeline = Some(SegmentTimeline {
            segments: vec![S {
                t: Some(first_t),
                d: duration_pts,
                r: Some((last_nr - first_nr) as i64),
                ..Default::default()
            }],
            ..Default::default()
        });
    }

    Ok(())
}

/// Serialize an MPD to XML with a declaration line.
pub fn render_mpd(mpd: &MPD) -> Result<String> {
    let body = quick_xml::se::to_string(mpd).map_err(|e| SimError::Conversion(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

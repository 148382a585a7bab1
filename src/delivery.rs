//! Segment delivery: plan what to serve, then serve it.
//!
//! Planning is a pure function of (asset, simulation options, now, uptime)
//! so every branch of the decision can be unit-tested without I/O. Execution
//! reads the VoD file, rewrites its fragment headers for the live timeline,
//! and responds either as one complete body or as paced CMAF chunks.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use bytes::Bytes;
use tracing::debug;

use crate::asset::{Asset, VodStorage};
use crate::error::{Result, SimError};
use crate::fmp4::{fragment_ranges, rewrite_segment};
use crate::metrics;
use crate::sim::{is_handover_period, segment_availability, SegmentAvailability, SimulationConfig};

/// What to serve for one segment request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// Init segments are timeless: no clock check, no rewriting.
    Init { vod_path: String },
    /// A fully produced media segment, rewritten and sent in one body.
    Full {
        vod_path: String,
        sequence_number: u32,
        decode_time: u64,
    },
    /// A media segment streamed chunk by chunk as it is "produced".
    Chunked {
        vod_path: String,
        sequence_number: u32,
        decode_time: u64,
        /// Wall-clock ms at which production of this segment began.
        segment_start_ms: u64,
        segment_duration_ms: u64,
    },
}

/// Decide how to serve `segment_path` (relative to the asset directory).
///
/// `uptime` is time since process start; during a handover period a
/// chunk-capable request switches to chunked delivery with relaxed
/// availability, because the segment can be sent while still incomplete.
pub fn plan_delivery(
    asset: &Asset,
    sim: &SimulationConfig,
    segment_path: &str,
    now_ms: u64,
    uptime: Duration,
) -> Result<DeliveryPlan> {
    if let Some(rep) = asset.match_init(segment_path) {
        return Ok(DeliveryPlan::Init {
            vod_path: format!("{}/{}", asset.asset_path, rep.init_path),
        });
    }

    let Some((rep, live_nr)) = asset.match_media(segment_path) else {
        return Err(SimError::NotFound(format!(
            "{}/{segment_path}",
            asset.asset_path
        )));
    };

    let chunked = sim.chunk_dur_ms.is_some()
        && sim.availability_time_complete
        && is_handover_period(uptime);
    let full_availability = sim.availability_time_complete && !chunked;
    let segdur_ms = asset.segment_duration_ms;

    match segment_availability(sim, now_ms, segdur_ms, live_nr, full_availability)? {
        SegmentAvailability::Available => {}
        SegmentAvailability::TooEarly { remaining_ms } => {
            return Err(SimError::TooEarly { remaining_ms });
        }
        SegmentAvailability::TooOld => {
            return Err(SimError::NotFound(format!(
                "segment {live_nr} has left the time-shift buffer"
            )));
        }
    }

    if !sim.loop_enabled && live_nr >= asset.segment_count {
        return Err(SimError::NotFound(format!(
            "segment {live_nr} is past the end of the non-looping timeline"
        )));
    }
    let vod_nr = live_nr % asset.segment_count;
    let vod_path = format!("{}/{}", asset.asset_path, rep.media_path_for(vod_nr));
    let sequence_number = (live_nr + 1) as u32;
    // The availability check bounds live_nr in wall-clock ms; the decode
    // time is in timescale ticks and needs its own bound.
    let decode_time = live_nr.checked_mul(rep.duration_pts).ok_or_else(|| {
        SimError::NotFound(format!("segment {live_nr} is beyond the addressable timeline"))
    })?;

    if chunked {
        debug!(segment = live_nr, "handover period, serving chunked");
        Ok(DeliveryPlan::Chunked {
            vod_path,
            sequence_number,
            decode_time,
            segment_start_ms: sim.start_time_ms() + live_nr * segdur_ms,
            segment_duration_ms: segdur_ms,
        })
    } else {
        Ok(DeliveryPlan::Full {
            vod_path,
            sequence_number,
            decode_time,
        })
    }
}

/// Read, rewrite, and turn the plan into an HTTP response.
pub async fn execute_delivery(
    plan: DeliveryPlan,
    storage: &dyn VodStorage,
    now_ms: u64,
) -> Result<Response<Body>> {
    match plan {
        DeliveryPlan::Init { vod_path } => {
            let data = storage.read(&vod_path).await?;
            complete_response(&vod_path, data)
        }
        DeliveryPlan::Full {
            vod_path,
            sequence_number,
            decode_time,
        } => {
            let data = storage.read(&vod_path).await?;
            let rewritten = rewrite_segment(&data, sequence_number, decode_time)?;
            complete_response(&vod_path, Bytes::from(rewritten))
        }
        DeliveryPlan::Chunked {
            vod_path,
            sequence_number,
            decode_time,
            segment_start_ms,
            segment_duration_ms,
        } => {
            let data = storage.read(&vod_path).await?;
            let rewritten = Bytes::from(rewrite_segment(&data, sequence_number, decode_time)?);
            let ranges = fragment_ranges(&rewritten)?;
            metrics::record_chunked_delivery();

            // Chunk i becomes available once its share of the segment has
            // been "produced" on the live timeline.
            let n = ranges.len() as u64;
            let chunks: Vec<(Duration, Bytes)> = ranges
                .into_iter()
                .enumerate()
                .map(|(i, range)| {
                    let produced_at_ms =
                        segment_start_ms + (i as u64 + 1) * segment_duration_ms / n;
                    let delay = Duration::from_millis(produced_at_ms.saturating_sub(now_ms));
                    (delay, rewritten.slice(range))
                })
                .collect();

            let base = tokio::time::Instant::now();
            let stream = futures_util::stream::unfold(
                chunks.into_iter(),
                move |mut chunks| async move {
                    let (delay, chunk) = chunks.next()?;
                    tokio::time::sleep_until(base + delay).await;
                    Some((Ok::<Bytes, Infallible>(chunk), chunks))
                },
            );

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type_for(&vod_path))
                .body(Body::from_stream(stream))
                .map_err(|e| SimError::Unexpected(e.to_string()))
        }
    }
}

fn complete_response(vod_path: &str, data: Bytes) -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(vod_path))
        .header(header::CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .map_err(|e| SimError::Unexpected(e.to_string()))
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("cmfa") | Some("m4a") => "audio/mp4",
        Some("cmft") => "application/mp4",
        _ => "video/mp4",
    }
}

//! Minimal fragmented-MP4 surgery for live conversion.
//!
//! A VoD media segment is turned into a live one by rewriting exactly two
//! boxes inside each `moof`: the `mfhd` sequence number and the `tfdt` base
//! media decode time. Everything else (sample tables, mdat payload) passes
//! through untouched, so output bytes are a pure function of the input and
//! the two live parameters.

use std::ops::Range;

use crate::error::{Result, SimError};

/// One top-level or nested box: type tag plus payload location.
struct BoxRef {
    kind: [u8; 4],
    /// Byte range of the payload (after the 8- or 16-byte header).
    payload: Range<usize>,
    /// Byte range of the whole box including its header.
    whole: Range<usize>,
}

/// Walk a flat sequence of boxes inside `data[range]`.
fn boxes(data: &[u8], range: Range<usize>) -> Result<Vec<BoxRef>> {
    let mut out = Vec::new();
    let mut pos = range.start;
    while pos < range.end {
        if pos + 8 > range.end {
            return Err(truncated());
        }
        let size32 = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let overrun = || SimError::Conversion(format!("box '{}' overruns its container", tag(kind)));
        let (header_len, size) = match size32 {
            0 => (8usize, range.end - pos),
            1 => {
                if pos + 16 > range.end {
                    return Err(truncated());
                }
                let large = u64::from_be_bytes([
                    data[pos + 8],
                    data[pos + 9],
                    data[pos + 10],
                    data[pos + 11],
                    data[pos + 12],
                    data[pos + 13],
                    data[pos + 14],
                    data[pos + 15],
                ]);
                (16usize, usize::try_from(large).map_err(|_| overrun())?)
            }
            n => (8usize, n as usize),
        };
        let end = pos
            .checked_add(size)
            .filter(|&end| size >= header_len && end <= range.end)
            .ok_or_else(overrun)?;
        out.push(BoxRef {
            kind,
            payload: pos + header_len..end,
            whole: pos..end,
        });
        pos = end;
    }
    Ok(out)
}

fn truncated() -> SimError {
    SimError::Conversion("truncated mp4 box header".to_string())
}

fn tag(kind: [u8; 4]) -> String {
    String::from_utf8_lossy(&kind).into_owned()
}

/// Rewrite a VoD segment for live delivery.
///
/// Every `moof` gets its `mfhd` sequence set to `sequence_number + i` (for
/// the i-th fragment) and its `tfdt` decode time shifted so the first
/// fragment starts at `base_decode_time`, preserving the original
/// inter-fragment spacing.
pub fn rewrite_segment(
    data: &[u8],
    sequence_number: u32,
    base_decode_time: u64,
) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    let mut fragment_index: u32 = 0;
    let mut first_decode_time: Option<u64> = None;

    for top in boxes(data, 0..data.len())? {
        if &top.kind != b"moof" {
            continue;
        }
        let mut mfhd_done = false;
        for child in boxes(data, top.payload.clone())? {
            match &child.kind {
                b"mfhd" => {
                    // 4 bytes version/flags, then u32 sequence number.
                    if child.payload.len() < 8 {
                        return Err(truncated());
                    }
                    let seq = sequence_number.wrapping_add(fragment_index);
                    let at = child.payload.start + 4;
                    out[at..at + 4].copy_from_slice(&seq.to_be_bytes());
                    mfhd_done = true;
                }
                b"traf" => {
                    for inner in boxes(data, child.payload.clone())? {
                        if &inner.kind == b"tfdt" {
                            rewrite_tfdt(
                                data,
                                &mut out,
                                &inner.payload,
                                base_decode_time,
                                &mut first_decode_time,
                            )?;
                        }
                    }
                }
                _ => {}
            }
        }
        if !mfhd_done {
            return Err(SimError::Conversion("moof without mfhd".to_string()));
        }
        fragment_index += 1;
    }

    if fragment_index == 0 {
        return Err(SimError::Conversion("segment has no moof box".to_string()));
    }
    Ok(out)
}

fn rewrite_tfdt(
    data: &[u8],
    out: &mut [u8],
    payload: &Range<usize>,
    base_decode_time: u64,
    first_decode_time: &mut Option<u64>,
) -> Result<()> {
    if payload.len() < 4 {
        return Err(truncated());
    }
    let version = data[payload.start];
    let at = payload.start + 4;
    let old = match version {
        0 => {
            if payload.len() < 8 {
                return Err(truncated());
            }
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as u64
        }
        1 => {
            if payload.len() < 12 {
                return Err(truncated());
            }
            u64::from_be_bytes([
                data[at],
                data[at + 1],
                data[at + 2],
                data[at + 3],
                data[at + 4],
                data[at + 5],
                data[at + 6],
                data[at + 7],
            ])
        }
        v => {
            return Err(SimError::Conversion(format!("unsupported tfdt version {v}")));
        }
    };

    let first = *first_decode_time.get_or_insert(old);
    let delta = old.checked_sub(first).ok_or_else(|| {
        SimError::Conversion("tfdt decode times decrease across fragments".to_string())
    })?;
    let new = base_decode_time.checked_add(delta).ok_or_else(|| {
        SimError::Conversion(format!("decode time {base_decode_time}+{delta} overflows"))
    })?;

    match version {
        0 => {
            let new32: u32 = new.try_into().map_err(|_| {
                SimError::Conversion(format!("decode time {new} overflows 32-bit tfdt"))
            })?;
            out[at..at + 4].copy_from_slice(&new32.to_be_bytes());
        }
        _ => out[at..at + 8].copy_from_slice(&new.to_be_bytes()),
    }
    Ok(())
}

/// Cut points for chunked delivery: one range per CMAF chunk.
///
/// The first range runs from the start of the file through the end of the
/// first fragment; each further `moof` starts a new range. A segment with a
/// single fragment yields a single range covering the whole file.
pub fn fragment_ranges(data: &[u8]) -> Result<Vec<Range<usize>>> {
    let mut cuts = Vec::new();
    for top in boxes(data, 0..data.len())? {
        if &top.kind == b"moof" {
            cuts.push(top.whole.start);
        }
    }
    if cuts.is_empty() {
        return Err(SimError::Conversion("segment has no moof box".to_string()));
    }

    let mut ranges = Vec::with_capacity(cuts.len());
    let mut start = 0;
    for &cut in &cuts[1..] {
        ranges.push(start..cut);
        start = cut;
    }
    ranges.push(start..data.len());
    Ok(ranges)
}

//! VoD asset discovery and metadata.
//!
//! At startup the VoD root is scanned for static MPD manifests. Each
//! directory containing one becomes an addressable asset; the manifest is
//! parsed once and the segment-addressing metadata (templates, timescales,
//! durations) is extracted so the request path never re-parses XML.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dash_mpd::{AdaptationSet, Representation, SegmentTemplate, MPD};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, SimError};

/// Read access to the VoD file tree.
///
/// A trait seam so the delivery path can be tested against in-memory
/// fixtures without a real directory layout.
#[async_trait]
pub trait VodStorage: Send + Sync {
    /// Read a file by path relative to the VoD root.
    async fn read(&self, rel: &str) -> Result<Bytes>;
}

/// Filesystem-backed storage rooted at the configured VoD directory.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        // Reject any traversal outside the root.
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(SimError::NotFound(rel.to_string()));
        }
        Ok(self.root.join(rel_path))
    }
}

#[async_trait]
impl VodStorage for FsStorage {
    async fn read(&self, rel: &str) -> Result<Bytes> {
        let path = self.resolve(rel)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SimError::NotFound(rel.to_string()))
            }
            Err(e) => Err(SimError::Storage(e)),
        }
    }
}

/// Segment-addressing metadata for one representation.
#[derive(Clone, Debug)]
pub struct RepInfo {
    pub id: String,
    /// Init segment path relative to the asset directory.
    pub init_path: String,
    /// Media template with `$RepresentationID$` already substituted; the
    /// remaining `$Number$` placeholder is described by prefix/suffix/width.
    pub media_prefix: String,
    pub media_suffix: String,
    /// Zero-pad width from `$Number%0Nd$`, if the template uses one.
    pub number_width: Option<usize>,
    /// Template timescale in ticks per second.
    pub timescale: u64,
    /// Nominal segment duration in timescale ticks.
    pub duration_pts: u64,
    /// First media number in the on-disk VoD numbering.
    pub start_number: u64,
}

impl RepInfo {
    /// Path (relative to the asset directory) of the VoD media file holding
    /// wrapped segment `vod_nr` (zero-based).
    pub fn media_path_for(&self, vod_nr: u64) -> String {
        let file_number = self.start_number + vod_nr;
        match self.number_width {
            Some(w) => format!("{}{:0w$}{}", self.media_prefix, file_number, self.media_suffix),
            None => format!("{}{}{}", self.media_prefix, file_number, self.media_suffix),
        }
    }

    /// Match a requested media path against this representation's template,
    /// returning the requested live segment number.
    fn match_media(&self, rel: &str) -> Option<u64> {
        let middle = rel
            .strip_prefix(self.media_prefix.as_str())?
            .strip_suffix(self.media_suffix.as_str())?;
        if middle.is_empty() || !middle.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        middle.parse().ok()
    }
}

/// One VoD asset: a directory with at least one static MPD.
#[derive(Clone, Debug)]
pub struct Asset {
    /// Directory path relative to the VoD root, no trailing slash.
    pub asset_path: String,
    /// Parsed static manifests by file name.
    pub manifests: HashMap<String, MPD>,
    /// Nominal segment duration in ms, identical across representations.
    pub segment_duration_ms: u64,
    /// Full VoD presentation duration in ms.
    pub total_duration_ms: u64,
    /// Number of complete segments in the VoD timeline.
    pub segment_count: u64,
    pub reps: Vec<RepInfo>,
}

impl Asset {
    /// Build an asset from its directory path and parsed static manifests.
    pub fn from_static_mpds(
        asset_path: String,
        manifests: HashMap<String, MPD>,
    ) -> Result<Self> {
        let (_, mpd) = manifests
            .iter()
            .next()
            .ok_or_else(|| SimError::Conversion(format!("asset '{asset_path}' has no manifest")))?;

        let period = mpd
            .periods
            .first()
            .ok_or_else(|| SimError::Conversion(format!("asset '{asset_path}' has no period")))?;

        let total_duration_ms = mpd
            .mediaPresentationDuration
            .or(period.duration)
            .map(|d| d.as_millis() as u64)
            .ok_or_else(|| {
                SimError::Conversion(format!(
                    "asset '{asset_path}' has no mediaPresentationDuration"
                ))
            })?;

        let mut reps = Vec::new();
        let mut segment_duration_ms: Option<u64> = None;
        for adaptation in &period.adaptations {
            for representation in &adaptation.representations {
                let rep = extract_rep(&asset_path, adaptation, representation)?;
                let dur_ms = rep.duration_pts * 1000 / rep.timescale;
                match segment_duration_ms {
                    None => segment_duration_ms = Some(dur_ms),
                    Some(prev) if prev != dur_ms => {
                        return Err(SimError::Conversion(format!(
                            "asset '{asset_path}' mixes segment durations ({prev}ms vs {dur_ms}ms)"
                        )));
                    }
                    Some(_) => {}
                }
                reps.push(rep);
            }
        }
        let segment_duration_ms = segment_duration_ms.ok_or_else(|| {
            SimError::Conversion(format!("asset '{asset_path}' has no representations"))
        })?;
        if segment_duration_ms == 0 {
            return Err(SimError::Conversion(format!(
                "asset '{asset_path}' has zero segment duration"
            )));
        }

        // Only whole segments participate in the live loop.
        let segment_count = (total_duration_ms / segment_duration_ms).max(1);

        Ok(Asset {
            asset_path,
            manifests,
            segment_duration_ms,
            total_duration_ms,
            segment_count,
            reps,
        })
    }

    /// Match a path (relative to the asset directory) against the init
    /// segment of any representation.
    pub fn match_init(&self, rel: &str) -> Option<&RepInfo> {
        self.reps.iter().find(|r| r.init_path == rel)
    }

    /// Match a path against the media template of any representation,
    /// yielding the representation and the requested live segment number.
    pub fn match_media(&self, rel: &str) -> Option<(&RepInfo, u64)> {
        self.reps
            .iter()
            .find_map(|r| r.match_media(rel).map(|nr| (r, nr)))
    }
}

fn extract_rep(
    asset_path: &str,
    adaptation: &AdaptationSet,
    representation: &Representation,
) -> Result<RepInfo> {
    let template = representation
        .SegmentTemplate
        .as_ref()
        .or(adaptation.SegmentTemplate.as_ref())
        .ok_or_else(|| {
            SimError::Conversion(format!("asset '{asset_path}' has no SegmentTemplate"))
        })?;

    let id = representation
        .id
        .clone()
        .ok_or_else(|| SimError::Conversion(format!("asset '{asset_path}' has an unnamed representation")))?;

    let init_path = resolve_rep_id(template_field(template, asset_path, "initialization", |t| {
        t.initialization.as_deref()
    })?, &id);
    let media = resolve_rep_id(template_field(template, asset_path, "media", |t| {
        t.media.as_deref()
    })?, &id);
    let (media_prefix, media_suffix, number_width) = split_number_template(asset_path, &media)?;

    let timescale = template.timescale.unwrap_or(1);
    let duration = template.duration.ok_or_else(|| {
        SimError::Conversion(format!("asset '{asset_path}' has no template duration"))
    })?;

    Ok(RepInfo {
        id,
        init_path,
        media_prefix,
        media_suffix,
        number_width,
        timescale,
        duration_pts: duration as u64,
        start_number: template.startNumber.unwrap_or(1),
    })
}

fn template_field<'a>(
    template: &'a SegmentTemplate,
    asset_path: &str,
    name: &str,
    get: impl Fn(&'a SegmentTemplate) -> Option<&'a str>,
) -> Result<String> {
    get(template)
        .map(str::to_string)
        .ok_or_else(|| SimError::Conversion(format!("asset '{asset_path}' has no {name} template")))
}

fn resolve_rep_id(template: String, id: &str) -> String {
    template.replace("$RepresentationID$", id)
}

/// Split a media template around its `$Number$` or `$Number%0Nd$` placeholder.
fn split_number_template(asset_path: &str, media: &str) -> Result<(String, String, Option<usize>)> {
    if let Some((prefix, suffix)) = media.split_once("$Number$") {
        return Ok((prefix.to_string(), suffix.to_string(), None));
    }
    if let Some((prefix, rest)) = media.split_once("$Number%0") {
        if let Some((width, suffix)) = rest.split_once("d$") {
            let width: usize = width.parse().map_err(|_| {
                SimError::Conversion(format!(
                    "asset '{asset_path}' has a malformed number format in '{media}'"
                ))
            })?;
            return Ok((prefix.to_string(), suffix.to_string(), Some(width)));
        }
    }
    Err(SimError::Conversion(format!(
        "asset '{asset_path}' media template '{media}' lacks a $Number$ placeholder"
    )))
}

/// All assets discovered under the VoD root, addressable by URL path.
pub struct AssetRegistry {
    assets: HashMap<String, Arc<Asset>>,
}

impl AssetRegistry {
    /// Scan the VoD root for directories containing static MPDs.
    ///
    /// Assets with unusable manifests are skipped with a warning so one bad
    /// directory does not take the whole service down.
    pub fn load(root: &Path) -> Result<Self> {
        let mut by_dir: HashMap<String, HashMap<String, MPD>> = HashMap::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("mpd")
            {
                continue;
            }
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let Some(dir) = rel.parent().and_then(|p| p.to_str()) else {
                continue;
            };
            let Some(name) = rel.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if dir.is_empty() {
                warn!(manifest = name, "ignoring manifest directly under the VoD root");
                continue;
            }
            let xml = std::fs::read_to_string(path)?;
            match dash_mpd::parse(&xml) {
                Ok(mpd) => {
                    by_dir
                        .entry(dir.replace('\\', "/"))
                        .or_default()
                        .insert(name.to_string(), mpd);
                }
                Err(e) => {
                    warn!(manifest = %rel.display(), error = %e, "skipping unparsable manifest");
                }
            }
        }

        let mut assets = HashMap::new();
        for (dir, manifests) in by_dir {
            match Asset::from_static_mpds(dir.clone(), manifests) {
                Ok(asset) => {
                    info!(
                        asset = %dir,
                        segment_duration_ms = asset.segment_duration_ms,
                        segments = asset.segment_count,
                        "loaded asset"
                    );
                    assets.insert(dir, Arc::new(asset));
                }
                Err(e) => warn!(asset = %dir, error = %e, "skipping asset"),
            }
        }

        Ok(AssetRegistry { assets })
    }

    #[cfg(test)]
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        AssetRegistry {
            assets: assets
                .into_iter()
                .map(|a| (a.asset_path.clone(), Arc::new(a)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Find the asset whose directory is the longest prefix of
    /// `content_path`, returning it and the remaining file path.
    pub fn find_asset<'a>(&self, content_path: &'a str) -> Option<(Arc<Asset>, &'a str)> {
        let mut best: Option<(Arc<Asset>, &'a str)> = None;
        for (dir, asset) in &self.assets {
            if let Some(rest) = content_path.strip_prefix(dir.as_str()) {
                if let Some(rest) = rest.strip_prefix('/') {
                    let better = match &best {
                        Some((b, _)) => dir.len() > b.asset_path.len(),
                        None => true,
                    };
                    if better {
                        best = Some((Arc::clone(asset), rest));
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dash_mpd::{Period, S, SegmentTimeline};

    pub(crate) fn static_test_mpd() -> MPD {
        let template = SegmentTemplate {
            initialization: Some("$RepresentationID$/init.mp4".to_string()),
            media: Some("$RepresentationID$/$Number$.m4s".to_string()),
            duration: Some(4000.0),
            timescale: Some(1000),
            startNumber: Some(1),
            SegmentTimeline: Some(SegmentTimeline {
                segments: vec![S {
                    t: Some(0),
                    d: 4000,
                    r: Some(4),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let adaptation = AdaptationSet {
            contentType: Some("video".to_string()),
            SegmentTemplate: Some(template),
            representations: vec![Representation {
                id: Some("V300".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        MPD {
            mpdtype: Some("static".to_string()),
            mediaPresentationDuration: Some(std::time::Duration::from_secs(20)),
            periods: vec![Period {
                adaptations: vec![adaptation],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub(crate) fn test_asset() -> Asset {
        let mut manifests = HashMap::new();
        manifests.insert("stream.mpd".to_string(), static_test_mpd());
        Asset::from_static_mpds("testpic".to_string(), manifests).unwrap()
    }

    #[test]
    fn metadata_extracted_from_static_mpd() {
        let asset = test_asset();
        assert_eq!(asset.segment_duration_ms, 4000);
        assert_eq!(asset.total_duration_ms, 20_000);
        assert_eq!(asset.segment_count, 5);
        assert_eq!(asset.reps.len(), 1);
        let rep = &asset.reps[0];
        assert_eq!(rep.id, "V300");
        assert_eq!(rep.init_path, "V300/init.mp4");
        assert_eq!(rep.timescale, 1000);
        assert_eq!(rep.duration_pts, 4000);
    }

    #[test]
    fn init_and_media_matching() {
        let asset = test_asset();
        assert!(asset.match_init("V300/init.mp4").is_some());
        assert!(asset.match_init("V300/7.m4s").is_none());

        let (rep, nr) = asset.match_media("V300/7.m4s").unwrap();
        assert_eq!(rep.id, "V300");
        assert_eq!(nr, 7);

        assert!(asset.match_media("V300/init.mp4").is_none());
        assert!(asset.match_media("A48/7.m4s").is_none());
        assert!(asset.match_media("V300/x7.m4s").is_none());
    }

    #[test]
    fn media_path_formats_vod_numbering() {
        let asset = test_asset();
        let rep = &asset.reps[0];
        // VoD numbering starts at startNumber = 1.
        assert_eq!(rep.media_path_for(0), "V300/1.m4s");
        assert_eq!(rep.media_path_for(4), "V300/5.m4s");
    }

    #[test]
    fn padded_number_template() {
        let (prefix, suffix, width) =
            split_number_template("a", "seg-$Number%05d$.m4s").unwrap();
        assert_eq!(prefix, "seg-");
        assert_eq!(suffix, ".m4s");
        assert_eq!(width, Some(5));

        let rep = RepInfo {
            id: "V300".to_string(),
            init_path: "init.mp4".to_string(),
            media_prefix: prefix,
            media_suffix: suffix,
            number_width: width,
            timescale: 1000,
            duration_pts: 4000,
            start_number: 1,
        };
        assert_eq!(rep.media_path_for(2), "seg-00003.m4s");
        assert_eq!(rep.match_media("seg-00042.m4s"), Some(42));
    }

    #[test]
    fn template_without_number_placeholder_rejected() {
        assert!(split_number_template("a", "seg.m4s").is_err());
    }

    #[test]
    fn registry_longest_prefix_match() {
        let mut manifests = HashMap::new();
        manifests.insert("stream.mpd".to_string(), static_test_mpd());
        let outer = Asset::from_static_mpds("testpic".to_string(), manifests.clone()).unwrap();
        let inner = Asset::from_static_mpds("testpic/extra".to_string(), manifests).unwrap();
        let registry = AssetRegistry::from_assets(vec![outer, inner]);

        let (asset, rest) = registry.find_asset("testpic/extra/stream.mpd").unwrap();
        assert_eq!(asset.asset_path, "testpic/extra");
        assert_eq!(rest, "stream.mpd");

        let (asset, rest) = registry.find_asset("testpic/V300/7.m4s").unwrap();
        assert_eq!(asset.asset_path, "testpic");
        assert_eq!(rest, "V300/7.m4s");

        assert!(registry.find_asset("unknown/stream.mpd").is_none());
    }

    #[tokio::test]
    async fn fs_storage_rejects_traversal() {
        let storage = FsStorage::new("/tmp");
        let err = storage.read("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, SimError::NotFound(_)));
    }
}

//! Training sample extraction and the deterministic train/test split.
//!
//! Each labelled point inside the study region is sampled from the predictor
//! stack and given a split value in [0, 1) derived from the split seed and
//! the point's identity alone. The partition is therefore reproducible and
//! does not depend on input order.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bands::{Band, BAND_COUNT};
use crate::coords::{LatLon, Region};
use crate::error::{LandslideError, Result};
use crate::overlay::RiskClass;
use crate::predictors::PredictorStack;

// ── Labels ────────────────────────────────────────────────────────────────────

/// A class label as supplied: numeric or textual. JSON `null` means absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Number(v) => write!(f, "{v}"),
            LabelValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl LabelValue {
    /// Resolve to a class code. Blank text is treated as absent.
    pub fn parse(&self, id: &str) -> Result<Option<u8>> {
        let v = match self {
            LabelValue::Number(v) => *v,
            LabelValue::Text(s) if s.trim().is_empty() => return Ok(None),
            LabelValue::Text(s) => s.trim().parse::<f64>().map_err(|_| self.invalid(id))?,
        };
        if v.fract() != 0.0 || !(1.0..=3.0).contains(&v) {
            return Err(self.invalid(id));
        }
        let code = v as u8;
        RiskClass::from_code(code).map(|c| Some(c.code())).ok_or_else(|| self.invalid(id))
    }

    fn invalid(&self, id: &str) -> LandslideError {
        LandslideError::InvalidLabel { id: id.to_string(), value: self.to_string() }
    }
}

/// A labelled location as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledPoint {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub location: LatLon,
    #[serde(default)]
    pub label: Option<LabelValue>,
}

impl LabeledPoint {
    /// Stable identity: the explicit id, else the coordinates at 1e-7°.
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{:.7},{:.7}", self.location.lat, self.location.lon),
        }
    }
}

// ── Samples ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub id: String,
    pub location: LatLon,
    /// Predictor values in canonical band order.
    pub features: [f64; BAND_COUNT],
    /// Absent labels are kept here and excluded from training and validation.
    pub label: Option<u8>,
    /// Deterministic split value in [0, 1).
    pub split: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Extraction resolution (m). Values are block means over this footprint.
    pub extraction_scale_m: f64,
    pub split_seed: u64,
    /// Samples with `split < train_fraction` train; the rest test.
    pub train_fraction: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { extraction_scale_m: 100.0, split_seed: 42, train_fraction: 0.7 }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(LandslideError::InvalidConfig(format!(
                "train_fraction must lie in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if !(self.extraction_scale_m > 0.0) {
            return Err(LandslideError::InvalidConfig("extraction_scale_m must be positive".into()));
        }
        Ok(())
    }
}

/// Per-class counts of extracted samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassHistogram {
    pub counts: BTreeMap<u8, usize>,
    pub unlabeled: usize,
}

impl ClassHistogram {
    pub fn from_samples(samples: &[TrainingSample]) -> Self {
        let mut h = Self::default();
        for s in samples {
            match s.label {
                Some(l) => *h.counts.entry(l).or_insert(0) += 1,
                None => h.unlabeled += 1,
            }
        }
        h
    }

    pub fn labeled(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub samples: Vec<TrainingSample>,
    pub histogram: ClassHistogram,
    /// Points dropped for lying outside the region.
    pub outside_region: usize,
    /// Points dropped because a predictor was missing at their location.
    pub incomplete: usize,
}

/// Sample the stack at every labelled point inside `region`.
pub fn extract_samples(
    points: &[LabeledPoint],
    stack: &PredictorStack,
    region: &Region,
    cfg: &SamplingConfig,
) -> Result<ExtractionResult> {
    let mut samples = Vec::with_capacity(points.len());
    let mut outside_region = 0;
    let mut incomplete = 0;

    for p in points {
        if !region.contains(p.location) {
            outside_region += 1;
            continue;
        }
        let id = p.identity();
        let label = match &p.label {
            Some(v) => v.parse(&id)?,
            None => None,
        };
        let Some(features) = sample_features(stack, p.location, cfg.extraction_scale_m) else {
            incomplete += 1;
            continue;
        };
        let split = split_value(cfg.split_seed, &id);
        samples.push(TrainingSample { id, location: p.location, features, label, split });
    }

    let histogram = ClassHistogram::from_samples(&samples);
    info!(
        extracted = samples.len(),
        outside_region,
        incomplete,
        unlabeled = histogram.unlabeled,
        classes = ?histogram.counts,
        "training samples extracted"
    );
    Ok(ExtractionResult { samples, histogram, outside_region, incomplete })
}

/// Block mean of every band over a `scale_m` footprint centred on the cell
/// containing `ll`. `None` when the point is off-grid or any band has no
/// valid value in the footprint.
pub fn sample_features(stack: &PredictorStack, ll: LatLon, scale_m: f64) -> Option<[f64; BAND_COUNT]> {
    let g = stack.geometry();
    let (row, col) = g.cell_index(ll)?;
    let (cx, cy) = g.cell_size_m();
    let kx = ((scale_m / 2.0) / cx).floor() as usize;
    let ky = ((scale_m / 2.0) / cy).floor() as usize;
    let (r0, r1) = (row.saturating_sub(ky), (row + ky).min(g.height - 1));
    let (c0, c1) = (col.saturating_sub(kx), (col + kx).min(g.width - 1));

    let mut out = [0f64; BAND_COUNT];
    for band in Band::ALL {
        let grid = stack.band(band);
        let mut sum = 0f64;
        let mut n = 0usize;
        for r in r0..=r1 {
            for c in c0..=c1 {
                if let Some(v) = grid.value(r, c) {
                    sum += v as f64;
                    n += 1;
                }
            }
        }
        if n == 0 {
            return None;
        }
        out[band.index()] = sum / n as f64;
    }
    Some(out)
}

// ── Split ─────────────────────────────────────────────────────────────────────

/// Split value in [0, 1) from `seed` and `id` only.
pub fn split_value(seed: u64, id: &str) -> f64 {
    let h = splitmix64(seed ^ fnv1a(id.as_bytes()));
    (h >> 11) as f64 / (1u64 << 53) as f64
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Train and test partitions, each sorted by sample identity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Partition {
    pub train: Vec<TrainingSample>,
    pub test: Vec<TrainingSample>,
}

impl Partition {
    pub fn new(samples: &[TrainingSample], train_fraction: f64) -> Self {
        let (mut train, mut test): (Vec<_>, Vec<_>) =
            samples.iter().cloned().partition(|s| s.split < train_fraction);
        let key = |a: &TrainingSample, b: &TrainingSample| {
            a.id.cmp(&b.id)
                .then(a.location.lat.total_cmp(&b.location.lat))
                .then(a.location.lon.total_cmp(&b.location.lon))
        };
        train.sort_by(key);
        test.sort_by(key);
        info!(train = train.len(), test = test.len(), "sample partition");
        Self { train, test }
    }

    /// Labelled training samples only.
    pub fn labeled_train(&self) -> impl Iterator<Item = (&[f64; BAND_COUNT], u8)> {
        self.train.iter().filter_map(|s| s.label.map(|l| (&s.features, l)))
    }

    /// Labelled test samples only.
    pub fn labeled_test(&self) -> impl Iterator<Item = (&[f64; BAND_COUNT], u8)> {
        self.test.iter().filter_map(|s| s.label.map(|l| (&s.features, l)))
    }
}

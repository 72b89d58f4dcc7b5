//! Forecast substitution: the baseline stack with its rainfall band replaced
//! by a short-horizon estimate, pushed through the same normalization,
//! overlay, thresholds and fitted classifier.
//!
//! Only the rainfall band is re-normalized; the other four normalized bands
//! are shared with the baseline. The classifier is the baseline's `Arc`,
//! never a retrained copy.
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bands::Band;
use crate::coords::{DateRange, Region};
use crate::error::{LandslideError, Result};
use crate::forest::{classify_stack, TrainedClassifier};
use crate::grid::RasterGrid;
use crate::normalize::{NormRange, NormalizedStack};
use crate::overlay::{susceptibility_index, threshold_classes, OverlayWeights, Thresholds};
use crate::pipeline::Baseline;
use crate::predictors::PredictorStack;
use crate::sources::{NamedBands, RasterSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Source identifiers are `<prefix>_<YYYY_MM_DD>` of the issue date.
    pub source_prefix: String,
    pub horizon_days: i64,
    /// Normalization range of the forecast rainfall total (mm).
    pub rainfall_range: NormRange,
    /// Fallback forecast = baseline rainfall × this factor.
    pub fallback_factor: f64,
    /// Label distinguishing forecast surfaces from baseline ones.
    pub label: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            source_prefix: "PRECIPITATION_DAILY_UTTARAKHAND".into(),
            horizon_days: 7,
            rainfall_range: NormRange::new(0.0, 200.0),
            fallback_factor: 0.05,
            label: "forecast".into(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        self.rainfall_range.validate("forecast rainfall")?;
        if self.horizon_days <= 0 {
            return Err(LandslideError::InvalidConfig("horizon_days must be positive".into()));
        }
        if !(self.fallback_factor.is_finite() && self.fallback_factor >= 0.0) {
            return Err(LandslideError::InvalidConfig("fallback_factor must be finite and non-negative".into()));
        }
        Ok(())
    }
}

/// Which forecast surface to look for, and over which window it is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastContext {
    pub issued: NaiveDate,
    pub source_id: String,
    pub window: DateRange,
}

impl ForecastContext {
    pub fn new(issued: NaiveDate, cfg: &ForecastConfig) -> Self {
        Self {
            issued,
            source_id: source_id(&cfg.source_prefix, issued),
            window: DateRange::days_from(issued, cfg.horizon_days),
        }
    }
}

pub fn source_id(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}", date.format("%Y_%m_%d"))
}

/// Where the forecast rainfall band came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RainfallOrigin {
    Forecast { source_id: String, band: String },
    Fallback { factor: f64 },
}

/// Load the forecast rainfall band onto the stack grid, or fall back to the
/// scaled baseline rainfall when the source is absent or has no bands.
pub fn resolve_forecast_rainfall(
    source: &dyn RasterSource,
    ctx: &ForecastContext,
    region: &Region,
    baseline: &PredictorStack,
    fallback_factor: f64,
) -> (RasterGrid, RainfallOrigin) {
    let geometry = baseline.geometry();
    let loaded = source.load(&ctx.source_id, &ctx.window, region);
    if let Some((name, grid)) = loaded.as_ref().and_then(NamedBands::first) {
        info!(source = %ctx.source_id, band = %name, "forecast rainfall loaded");
        let rainfall = grid.resample_to(geometry).clipped(region);
        let origin = RainfallOrigin::Forecast { source_id: ctx.source_id.clone(), band: name.to_string() };
        return (rainfall, origin);
    }

    warn!(
        source = %ctx.source_id,
        factor = fallback_factor,
        "forecast rainfall unavailable, using scaled baseline rainfall"
    );
    let factor = fallback_factor as f32;
    let rainfall = baseline.band(Band::Rainfall).map(|v| v * factor);
    (rainfall, RainfallOrigin::Fallback { factor: fallback_factor })
}

/// Forecast counterparts of the baseline surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRun {
    pub label: String,
    pub context: ForecastContext,
    pub origin: RainfallOrigin,
    pub stack: PredictorStack,
    pub normalized: NormalizedStack,
    pub index: RasterGrid,
    pub weighted_risk: RasterGrid,
    /// Present when a fitted classifier was supplied.
    pub ml_prediction: Option<RasterGrid>,
    #[serde(skip)]
    pub classifier: Option<Arc<TrainedClassifier>>,
}

impl ForecastRun {
    pub fn rainfall(&self) -> &RasterGrid {
        self.stack.band(Band::Rainfall)
    }
}

/// Run the forecast variant of `baseline`.
#[allow(clippy::too_many_arguments)]
pub fn run_forecast(
    baseline: &Baseline,
    classifier: Option<&Arc<TrainedClassifier>>,
    source: &dyn RasterSource,
    ctx: &ForecastContext,
    region: &Region,
    cfg: &ForecastConfig,
    weights: &OverlayWeights,
    thresholds: &Thresholds,
) -> Result<ForecastRun> {
    let (rainfall, origin) = resolve_forecast_rainfall(source, ctx, region, &baseline.stack, cfg.fallback_factor);
    let normalized = baseline.normalized.with_rainfall(&rainfall, &cfg.rainfall_range)?;
    let stack = baseline.stack.with_rainfall(rainfall)?;
    let index = susceptibility_index(&normalized, weights);
    let weighted_risk = threshold_classes(&index, thresholds);
    let ml_prediction = classifier.map(|m| classify_stack(m, &stack));

    info!(
        label = %cfg.label,
        issued = %ctx.issued,
        fallback = matches!(origin, RainfallOrigin::Fallback { .. }),
        classified = ml_prediction.is_some(),
        "forecast surfaces computed"
    );
    Ok(ForecastRun {
        label: cfg.label.clone(),
        context: ctx.clone(),
        origin,
        stack,
        normalized,
        index,
        weighted_risk,
        ml_prediction,
        classifier: classifier.cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::forest::{train_classifier, ForestParams};
    use crate::normalize::NormalizationTable;
    use crate::pipeline::run_baseline;
    use crate::predictors::PredictorConfig;
    use crate::samples::{extract_samples, Partition, SamplingConfig};
    use crate::sources::{InMemorySource, NoSource};

    fn baseline() -> (crate::sources::InputBundle, Baseline) {
        let bundle = fixtures::bundle();
        let b = run_baseline(
            &bundle,
            &PredictorConfig::default(),
            &NormalizationTable::default(),
            &OverlayWeights::default(),
            &Thresholds::default(),
        )
        .unwrap();
        (bundle, b)
    }

    #[test]
    fn source_id_uses_underscored_date() {
        let ctx = ForecastContext::new(fixtures::forecast_date(), &ForecastConfig::default());
        assert_eq!(ctx.source_id, "PRECIPITATION_DAILY_UTTARAKHAND_2025_10_20");
        assert_eq!(ctx.window.end, NaiveDate::from_ymd_opt(2025, 10, 27).unwrap());
    }

    #[test]
    fn fallback_is_five_percent_of_baseline() {
        let (bundle, b) = baseline();
        let ctx = ForecastContext::new(fixtures::forecast_date(), &ForecastConfig::default());
        let (rain, origin) = resolve_forecast_rainfall(&NoSource, &ctx, &bundle.region, &b.stack, 0.05);
        assert_eq!(origin, RainfallOrigin::Fallback { factor: 0.05 });
        let base = b.stack.band(Band::Rainfall);
        for i in 0..base.data.len() {
            if !base.data[i].is_nan() {
                assert!((rain.data[i] - base.data[i] * 0.05).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn hundred_mm_falls_back_to_five() {
        let (bundle, b) = baseline();
        let mut flat = b.stack.band(Band::Rainfall).clone();
        flat.data.iter_mut().filter(|v| !v.is_nan()).for_each(|v| *v = 100.0);
        let stack = b.stack.with_rainfall(flat).unwrap();
        let ctx = ForecastContext::new(fixtures::forecast_date(), &ForecastConfig::default());
        let (rain, _) = resolve_forecast_rainfall(&NoSource, &ctx, &bundle.region, &stack, 0.05);
        assert_eq!(rain.value(10, 10), Some(5.0));
    }

    #[test]
    fn empty_asset_triggers_fallback() {
        let (bundle, b) = baseline();
        let mut src = InMemorySource::default();
        let ctx = ForecastContext::new(fixtures::forecast_date(), &ForecastConfig::default());
        src.insert(ctx.source_id.clone(), Default::default());
        let (_, origin) = resolve_forecast_rainfall(&src, &ctx, &bundle.region, &b.stack, 0.05);
        assert!(matches!(origin, RainfallOrigin::Fallback { .. }));
    }

    #[test]
    fn present_asset_replaces_only_rainfall() {
        let (bundle, b) = baseline();
        let cfg = ForecastConfig::default();
        let ctx = ForecastContext::new(fixtures::forecast_date(), &cfg);
        let run = run_forecast(
            &b,
            None,
            &bundle.forecast_assets,
            &ctx,
            &bundle.region,
            &cfg,
            &OverlayWeights::default(),
            &Thresholds::default(),
        )
        .unwrap();
        assert_eq!(
            run.origin,
            RainfallOrigin::Forecast { source_id: ctx.source_id.clone(), band: "precipitation".into() }
        );
        assert_eq!(run.rainfall().value(10, 10), Some(150.0));
        // 150 mm over [0, 200].
        assert_eq!(run.normalized.rainfall.value(10, 10), Some(0.75));
        assert_eq!(run.normalized.slope.data.len(), b.normalized.slope.data.len());
        for band in [Band::Elevation, Band::Slope, Band::Vegetation, Band::Roughness, Band::Drainage] {
            let (f, base) = (run.stack.band(band), b.stack.band(band));
            assert!(f.data.iter().zip(&base.data).all(|(x, y)| x == y || (x.is_nan() && y.is_nan())));
        }
        assert!(run.ml_prediction.is_none());
    }

    #[test]
    fn forecast_reuses_the_fitted_classifier() {
        let (bundle, b) = baseline();
        let ex = extract_samples(&fixtures::labeled_points(), &b.stack, &bundle.region, &SamplingConfig::default())
            .unwrap();
        let model = Arc::new(train_classifier(&Partition::new(&ex.samples, 0.7), &ForestParams::default()).unwrap());
        let before = model.fingerprint();
        let cfg = ForecastConfig::default();
        let ctx = ForecastContext::new(fixtures::forecast_date(), &cfg);
        let run = run_forecast(
            &b,
            Some(&model),
            &NoSource,
            &ctx,
            &bundle.region,
            &cfg,
            &OverlayWeights::default(),
            &Thresholds::default(),
        )
        .unwrap();
        let used = run.classifier.as_ref().unwrap();
        assert!(Arc::ptr_eq(used, &model));
        assert_eq!(used.fingerprint(), before);
        assert!(run.ml_prediction.unwrap().same_geometry(b.stack.geometry()));
    }
}

//! Pipeline orchestrator: baseline overlay, model fit and application,
//! forecast variant, and the report and legend built from them.
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bands::Band;
use crate::config::PipelineConfig;
use crate::coords::{LatLon, Region};
use crate::error::{LandslideError, Result};
use crate::forecast::{run_forecast, ForecastContext, ForecastRun, RainfallOrigin};
use crate::forest::{classify_stack, train_classifier, validate, TrainedClassifier, ValidationMetrics};
use crate::grid::RasterGrid;
use crate::inspect::{inspect_point, PointLayers, PointQueryResult};
use crate::normalize::{NormalizationTable, NormalizedStack};
use crate::overlay::{susceptibility_index, threshold_classes, OverlayWeights, RiskClass, Thresholds};
use crate::predictors::{build_predictor_stack, PredictorConfig, PredictorSources, PredictorStack};
use crate::samples::{extract_samples, ClassHistogram, LabeledPoint, Partition};
use crate::sources::InputBundle;
use crate::zonal::{index_percentiles, region_mean, zonal_areas, AggregationConfig, ClassPercentages, IndexPercentiles, ZonalStats};

// ── Stage outputs ─────────────────────────────────────────────────────────────

/// Baseline surfaces: raw stack, normalized overlay bands, index and classes.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub stack: PredictorStack,
    pub normalized: NormalizedStack,
    pub index: RasterGrid,
    pub weighted_risk: RasterGrid,
}

/// A fitted classifier with its baseline application and validation.
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub classifier: Arc<TrainedClassifier>,
    pub ml_prediction: RasterGrid,
    pub metrics: ValidationMetrics,
    pub histogram: ClassHistogram,
    pub train_size: usize,
    pub test_size: usize,
}

/// Everything one invocation computes.
#[derive(Debug)]
pub struct PipelineRun {
    pub region: Region,
    pub baseline: Baseline,
    /// Training failure does not stop the overlay or the forecast.
    pub model: Result<ModelRun>,
    pub forecast: ForecastRun,
    pub elapsed_ms: u64,
}

pub fn run_baseline(
    bundle: &InputBundle,
    predictors: &PredictorConfig,
    table: &NormalizationTable,
    weights: &OverlayWeights,
    thresholds: &Thresholds,
) -> Result<Baseline> {
    let stack = build_predictor_stack(&PredictorSources::from(bundle), predictors)?;
    let normalized = NormalizedStack::from_stack(&stack, table);
    let index = susceptibility_index(&normalized, weights);
    let weighted_risk = threshold_classes(&index, thresholds);
    Ok(Baseline { stack, normalized, index, weighted_risk })
}

/// Extract, split, train on the train partition, apply to the baseline stack,
/// validate on the test partition.
pub fn run_model(baseline: &Baseline, points: &[LabeledPoint], region: &Region, cfg: &PipelineConfig) -> Result<ModelRun> {
    let extraction = extract_samples(points, &baseline.stack, region, &cfg.sampling)?;
    if extraction.histogram.labeled() == 0 {
        return Err(LandslideError::NoTrainingData);
    }
    let partition = Partition::new(&extraction.samples, cfg.sampling.train_fraction);
    let classifier = Arc::new(train_classifier(&partition, &cfg.forest)?);
    let ml_prediction = classify_stack(&classifier, &baseline.stack);
    let metrics = validate(&classifier, &partition);
    Ok(ModelRun {
        classifier,
        ml_prediction,
        metrics,
        histogram: extraction.histogram,
        train_size: partition.train.len(),
        test_size: partition.test.len(),
    })
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct SusceptibilityPipeline {
    cfg: PipelineConfig,
}

impl SusceptibilityPipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Run every stage for one issue date.
    ///
    /// Order:
    ///   1. Predictor stack, normalization, overlay (baseline)
    ///   2. Sample extraction, split, training, application, validation
    ///   3. Forecast substitution with the baseline classifier
    pub fn run(&self, bundle: &InputBundle, points: &[LabeledPoint], issued: NaiveDate) -> Result<PipelineRun> {
        let cfg = &self.cfg;
        let started = Instant::now();

        // ── 1. Baseline ─────────────────────────────────────────────────────
        let baseline = run_baseline(bundle, &cfg.predictors, &cfg.normalization, &cfg.weights, &cfg.thresholds)?;

        // ── 2. Model ────────────────────────────────────────────────────────
        let model = run_model(&baseline, points, &bundle.region, cfg);
        if let Err(e) = &model {
            warn!(error = %e, "classifier unavailable, continuing with overlay surfaces only");
        }

        // ── 3. Forecast ─────────────────────────────────────────────────────
        let ctx = ForecastContext::new(issued, &cfg.forecast);
        let forecast = run_forecast(
            &baseline,
            model.as_ref().ok().map(|m| &m.classifier),
            &bundle.forecast_assets,
            &ctx,
            &bundle.region,
            &cfg.forecast,
            &cfg.weights,
            &cfg.thresholds,
        )?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(region = %bundle.region.name, elapsed_ms, "pipeline complete");
        Ok(PipelineRun { region: bundle.region.clone(), baseline, model, forecast, elapsed_ms })
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaReport {
    #[serde(flatten)]
    pub stats: ZonalStats,
    pub percentages: ClassPercentages,
    /// High-class share of the evaluated area, percent.
    pub high_share: f64,
}

impl From<ZonalStats> for AreaReport {
    fn from(stats: ZonalStats) -> Self {
        Self { percentages: stats.percentages(), high_share: stats.high_share(), stats }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceReport {
    pub label: String,
    pub index_percentiles: IndexPercentiles,
    pub weighted_risk: AreaReport,
    pub ml_prediction: Option<AreaReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub histogram: Option<ClassHistogram>,
    pub train_size: Option<usize>,
    pub test_size: Option<usize>,
    pub metrics: Option<ValidationMetrics>,
    pub trees: Option<usize>,
    pub fingerprint: Option<u64>,
    /// Why training did not produce a model.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub region: String,
    pub issued: NaiveDate,
    pub forecast_origin: RainfallOrigin,
    pub forecast_rainfall_mean_mm: Option<f64>,
    pub training: TrainingReport,
    pub baseline: SurfaceReport,
    pub forecast: SurfaceReport,
    pub elapsed_ms: u64,
}

impl PipelineRun {
    pub fn classifier(&self) -> Option<&Arc<TrainedClassifier>> {
        self.model.as_ref().ok().map(|m| &m.classifier)
    }

    pub fn baseline_ml(&self) -> Option<&RasterGrid> {
        self.model.as_ref().ok().map(|m| &m.ml_prediction)
    }

    /// Point query over every baseline and forecast layer.
    pub fn inspect(&self, location: LatLon, cfg: &AggregationConfig) -> PointQueryResult {
        let layers = PointLayers {
            stack: &self.baseline.stack,
            index: &self.baseline.index,
            weighted_risk: &self.baseline.weighted_risk,
            ml_prediction: self.baseline_ml(),
            forecast: Some(&self.forecast),
        };
        inspect_point(location, &layers, cfg)
    }

    pub fn report(&self, cfg: &AggregationConfig) -> Result<RunReport> {
        let region = &self.region;
        let areas = |g: &RasterGrid| -> Result<AreaReport> {
            Ok(zonal_areas(g, region, cfg.zonal_scale_m, cfg)?.into())
        };

        let baseline = SurfaceReport {
            label: "baseline".into(),
            index_percentiles: index_percentiles(&self.baseline.index, region, cfg)?,
            weighted_risk: areas(&self.baseline.weighted_risk)?,
            ml_prediction: self.baseline_ml().map(|g| areas(g)).transpose()?,
        };
        let forecast = SurfaceReport {
            label: self.forecast.label.clone(),
            index_percentiles: index_percentiles(&self.forecast.index, region, cfg)?,
            weighted_risk: areas(&self.forecast.weighted_risk)?,
            ml_prediction: self.forecast.ml_prediction.as_ref().map(|g| areas(g)).transpose()?,
        };

        let training = match &self.model {
            Ok(m) => TrainingReport {
                histogram: Some(m.histogram.clone()),
                train_size: Some(m.train_size),
                test_size: Some(m.test_size),
                metrics: Some(m.metrics.clone()),
                trees: Some(m.classifier.n_trees()),
                fingerprint: Some(m.classifier.fingerprint()),
                error: None,
            },
            Err(e) => TrainingReport {
                histogram: None,
                train_size: None,
                test_size: None,
                metrics: None,
                trees: None,
                fingerprint: None,
                error: Some(e.to_string()),
            },
        };

        Ok(RunReport {
            region: region.name.clone(),
            issued: self.forecast.context.issued,
            forecast_origin: self.forecast.origin.clone(),
            forecast_rainfall_mean_mm: region_mean(self.forecast.rainfall(), region, cfg.region_mean_scale_m, cfg)?,
            training,
            baseline,
            forecast,
            elapsed_ms: self.elapsed_ms,
        })
    }
}

// ── Presentation descriptors ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub code: u8,
    pub label: String,
    /// Index interval `(lower, upper]` for threshold surfaces.
    pub index_lower_exclusive: Option<f64>,
    pub index_upper_inclusive: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceKind {
    Continuous { min: Option<f64>, max: Option<f64>, unit: String },
    Categorical { classes: Vec<ClassDescriptor> },
}

/// What a presentation layer needs to style one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDescriptor {
    pub name: String,
    pub variant: String,
    #[serde(flatten)]
    pub kind: SurfaceKind,
}

fn class_descriptors(thresholds: Option<&Thresholds>) -> Vec<ClassDescriptor> {
    RiskClass::ALL
        .iter()
        .map(|&c| {
            let (lo, hi) = match (thresholds, c) {
                (None, _) => (None, None),
                (Some(t), RiskClass::Low) => (None, Some(t.low_max)),
                (Some(t), RiskClass::Medium) => (Some(t.low_max), Some(t.medium_max)),
                (Some(t), RiskClass::High) => (Some(t.medium_max), None),
            };
            ClassDescriptor {
                code: c.code(),
                label: c.label().into(),
                index_lower_exclusive: lo,
                index_upper_inclusive: hi,
            }
        })
        .collect()
}

/// Descriptors of every baseline and forecast surface.
pub fn describe_surfaces(cfg: &PipelineConfig) -> Vec<SurfaceDescriptor> {
    let mut out = Vec::new();
    let forecast = cfg.forecast.label.as_str();
    for variant in ["baseline", forecast] {
        for band in Band::ALL {
            let range = if band == Band::Rainfall && variant != "baseline" {
                Some(cfg.forecast.rainfall_range)
            } else {
                cfg.normalization.range(band)
            };
            out.push(SurfaceDescriptor {
                name: band.name().into(),
                variant: variant.into(),
                kind: SurfaceKind::Continuous {
                    min: range.map(|r| r.lo),
                    max: range.map(|r| r.hi),
                    unit: band.unit().into(),
                },
            });
        }
        out.push(SurfaceDescriptor {
            name: "index".into(),
            variant: variant.into(),
            kind: SurfaceKind::Continuous { min: Some(0.0), max: Some(1.0), unit: "index".into() },
        });
        out.push(SurfaceDescriptor {
            name: "weighted_risk".into(),
            variant: variant.into(),
            kind: SurfaceKind::Categorical { classes: class_descriptors(Some(&cfg.thresholds)) },
        });
        out.push(SurfaceDescriptor {
            name: "ml_prediction".into(),
            variant: variant.into(),
            kind: SurfaceKind::Categorical { classes: class_descriptors(None) },
        });
    }
    out
}

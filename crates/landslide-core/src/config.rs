//! Pipeline configuration. Defaults are calibrated to the Uttarakhand
//! monsoon study; any subset can be overridden from JSON.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forecast::ForecastConfig;
use crate::forest::ForestParams;
use crate::normalize::NormalizationTable;
use crate::overlay::{OverlayWeights, Thresholds};
use crate::predictors::PredictorConfig;
use crate::samples::SamplingConfig;
use crate::zonal::AggregationConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub predictors: PredictorConfig,
    pub normalization: NormalizationTable,
    pub weights: OverlayWeights,
    pub thresholds: Thresholds,
    pub sampling: SamplingConfig,
    pub forest: ForestParams,
    pub forecast: ForecastConfig,
    pub aggregation: AggregationConfig,
}

impl PipelineConfig {
    /// Load a (possibly partial) JSON config over the defaults and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: PipelineConfig = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.predictors.validate()?;
        self.normalization.validate()?;
        self.weights.validate()?;
        self.thresholds.validate()?;
        self.sampling.validate()?;
        self.forest.validate()?;
        self.forecast.validate()?;
        self.aggregation.validate()?;
        Ok(())
    }
}

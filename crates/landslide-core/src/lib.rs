//! Landslide susceptibility: predictor derivation, weighted overlay scoring,
//! random-forest classification, forecast substitution and spatial aggregation
//! over in-memory geographic rasters.
pub mod bands;
pub mod config;
pub mod coords;
pub mod error;
pub mod forecast;
pub mod forest;
pub mod grid;
pub mod inspect;
pub mod normalize;
pub mod overlay;
pub mod pipeline;
pub mod predictors;
pub mod samples;
pub mod sources;
pub mod zonal;

#[cfg(test)]
pub(crate) mod fixtures;

pub use bands::Band;
pub use config::PipelineConfig;
pub use error::{LandslideError, Result};
pub use grid::RasterGrid;
pub use overlay::RiskClass;

//! Error taxonomy for the susceptibility pipeline.
//!
//! Missing values and out-of-range inputs are deliberately absent from this
//! enum: the former travel as `None`, the latter are clamped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LandslideError {
    /// An upstream raster or sample source was missing or empty.
    #[error("source unavailable: {name}")]
    SourceUnavailable { name: String },

    /// No labelled sample survived filtering and extraction.
    #[error("no labelled training samples available")]
    NoTrainingData,

    /// The training partition holds fewer than two distinct classes.
    #[error("training partition has {found} distinct class label(s); at least 2 are required")]
    InsufficientLabelDiversity { found: usize },

    #[error("sample {id}: label {value:?} is not an integer class code")]
    InvalidLabel { id: String, value: String },

    /// A band list presented as a predictor stack does not match the canonical order.
    #[error("predictor bands {found:?} do not match the canonical order {expected:?}")]
    BandMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("band `{band}` does not share the stack's grid geometry")]
    GeometryMismatch { band: String },

    /// A strict (non best-effort) aggregation would examine too many cells.
    #[error("aggregation would examine {examined} cells, cap is {cap}")]
    ElementCapExceeded { examined: u64, cap: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LandslideError>;

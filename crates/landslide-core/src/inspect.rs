//! Point inspector: buffered means of every layer around a query coordinate,
//! and latest-result sequencing for requests that complete out of order.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bands::Band;
use crate::coords::{Buffer, LatLon};
use crate::forecast::ForecastRun;
use crate::grid::RasterGrid;
use crate::predictors::PredictorStack;
use crate::zonal::AggregationConfig;

// ── Buffered means ────────────────────────────────────────────────────────────

/// Mean of `grid` over a circular buffer, read on a lattice of `scale_m`
/// spacing centred on the buffer centre. Each grid cell counts once.
/// `None` when no lattice point lands on a valid cell.
pub fn buffer_mean(grid: &RasterGrid, buffer: &Buffer, scale_m: f64) -> Option<f64> {
    let k = (buffer.radius_m / scale_m).floor() as i64;
    let mut cells = BTreeSet::new();
    for i in -k..=k {
        for j in -k..=k {
            let (east, north) = (i as f64 * scale_m, j as f64 * scale_m);
            if !buffer.contains_offset(east, north) {
                continue;
            }
            if let Some(rc) = grid.cell_index(buffer.center.offset_m(east, north)) {
                cells.insert(rc);
            }
        }
    }
    let vals: Vec<f64> = cells.into_iter().filter_map(|(r, c)| grid.value(r, c)).map(|v| v as f64).collect();
    if vals.is_empty() {
        return None;
    }
    Some(vals.iter().sum::<f64>() / vals.len() as f64)
}

/// Surfaces a point query reads from.
pub struct PointLayers<'a> {
    pub stack: &'a PredictorStack,
    pub index: &'a RasterGrid,
    pub weighted_risk: &'a RasterGrid,
    pub ml_prediction: Option<&'a RasterGrid>,
    pub forecast: Option<&'a ForecastRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainValues {
    pub elevation: Option<f64>,
    pub slope: Option<f64>,
    pub roughness: Option<f64>,
    pub drainage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentValues {
    pub rainfall: Option<f64>,
    pub ndvi: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskValues {
    pub index: Option<f64>,
    pub weighted_risk: Option<f64>,
    pub ml_prediction: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastValues {
    pub rainfall: Option<f64>,
    pub index: Option<f64>,
    pub weighted_risk: Option<f64>,
    pub ml_prediction: Option<f64>,
}

/// Consolidated point query. Every field is absent rather than zero when no
/// valid cell falls inside the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointQueryResult {
    pub location: LatLon,
    pub radius_m: f64,
    pub terrain: TerrainValues,
    pub environment: EnvironmentValues,
    pub baseline: RiskValues,
    pub forecast: ForecastValues,
}

impl PointQueryResult {
    /// Flat key → value view for presentation layers.
    pub fn to_record(&self) -> BTreeMap<&'static str, Option<f64>> {
        BTreeMap::from([
            ("elevation", self.terrain.elevation),
            ("slope", self.terrain.slope),
            ("roughness", self.terrain.roughness),
            ("drainage", self.terrain.drainage),
            ("rainfall", self.environment.rainfall),
            ("ndvi", self.environment.ndvi),
            ("index", self.baseline.index),
            ("weighted_risk", self.baseline.weighted_risk),
            ("ml_prediction", self.baseline.ml_prediction),
            ("forecast_rainfall", self.forecast.rainfall),
            ("forecast_index", self.forecast.index),
            ("forecast_weighted_risk", self.forecast.weighted_risk),
            ("forecast_ml_prediction", self.forecast.ml_prediction),
        ])
    }
}

pub fn inspect_point(location: LatLon, layers: &PointLayers<'_>, cfg: &AggregationConfig) -> PointQueryResult {
    let buffer = Buffer::new(location, cfg.point_radius_m);
    let mean = |g: &RasterGrid| buffer_mean(g, &buffer, cfg.point_scale_m);
    let band = |b: Band| mean(layers.stack.band(b));

    let forecast = match layers.forecast {
        Some(f) => ForecastValues {
            rainfall: mean(f.rainfall()),
            index: mean(&f.index),
            weighted_risk: mean(&f.weighted_risk),
            ml_prediction: f.ml_prediction.as_ref().and_then(|g| mean(g)),
        },
        None => ForecastValues::default(),
    };

    PointQueryResult {
        location,
        radius_m: cfg.point_radius_m,
        terrain: TerrainValues {
            elevation: band(Band::Elevation),
            slope: band(Band::Slope),
            roughness: band(Band::Roughness),
            drainage: band(Band::Drainage),
        },
        environment: EnvironmentValues {
            rainfall: band(Band::Rainfall),
            ndvi: band(Band::Vegetation),
        },
        baseline: RiskValues {
            index: mean(layers.index),
            weighted_risk: mean(layers.weighted_risk),
            ml_prediction: layers.ml_prediction.and_then(|g| mean(g)),
        },
        forecast,
    }
}

// ── Request sequencing ────────────────────────────────────────────────────────

/// Routing tag of an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    pub surface: String,
    pub region: String,
}

impl RequestContext {
    pub fn new(surface: impl Into<String>, region: impl Into<String>) -> Self {
        Self { surface: surface.into(), region: region.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub seq: u64,
    pub context: RequestContext,
}

#[derive(Debug, Clone)]
pub struct Tagged<T> {
    pub ticket: Ticket,
    pub value: T,
}

/// Holds the result of the newest completed request.
///
/// Tickets carry a strictly increasing sequence number. A completion is
/// accepted only if its ticket is newer than the one currently held, so a
/// slow older request can never overwrite a newer result.
pub struct LatestResult<T> {
    next: AtomicU64,
    held: Mutex<Option<Tagged<T>>>,
}

impl<T> Default for LatestResult<T> {
    fn default() -> Self {
        Self { next: AtomicU64::new(0), held: Mutex::new(None) }
    }
}

impl<T: Clone> LatestResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, context: RequestContext) -> Ticket {
        let seq = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket { seq, context }
    }

    /// Offer a completed result. Returns `false` if it was stale and dropped.
    pub fn complete(&self, ticket: Ticket, value: T) -> bool {
        let mut held = self.held.lock();
        if held.as_ref().is_some_and(|h| h.ticket.seq >= ticket.seq) {
            debug!(seq = ticket.seq, surface = %ticket.context.surface, "discarding stale result");
            return false;
        }
        *held = Some(Tagged { ticket, value });
        true
    }

    pub fn latest(&self) -> Option<Tagged<T>> {
        self.held.lock().clone()
    }

    pub fn latest_seq(&self) -> Option<u64> {
        self.held.lock().as_ref().map(|h| h.ticket.seq)
    }
}

//! Small synthetic inputs shared by unit tests.
use chrono::NaiveDate;

use crate::coords::{BBox, LatLon, Region};
use crate::grid::RasterGrid;
use crate::samples::{LabelValue, LabeledPoint};
use crate::sources::{DailyRaster, InMemorySource, InputBundle, NamedBands, ReflectanceScene};

/// Cell size of fixture grids in degrees.
pub const CELL_DEG: f64 = 0.001;

/// Issue date whose forecast asset exists in [`bundle`].
pub const FORECAST_DATE: (i32, u32, u32) = (2025, 10, 20);

pub fn bounds(w: usize, h: usize) -> BBox {
    BBox {
        min_lon: 79.0,
        max_lon: 79.0 + w as f64 * CELL_DEG,
        min_lat: 30.0,
        max_lat: 30.0 + h as f64 * CELL_DEG,
    }
}

/// A `w × h` grid at 0.001° anchored at (30 N, 79 E).
pub fn grid(w: usize, h: usize, fill: f32) -> RasterGrid {
    RasterGrid::new(w, h, bounds(w, h), fill)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn forecast_date() -> NaiveDate {
    let (y, m, d) = FORECAST_DATE;
    date(y, m, d)
}

/// 24 × 24 study area. Slope grows eastward, rainfall grows northward.
/// The region leaves a one-cell margin so clipping is observable.
pub fn bundle() -> InputBundle {
    const N: usize = 24;
    let base = grid(N, N, 0.0);
    let elevation = RasterGrid::from_fn(&base, |r, c| 800.0 + 2.0 * (c * c) as f32 + 30.0 * r as f32);

    let day = |d: NaiveDate, f: fn(usize) -> f32| DailyRaster {
        date: d,
        grid: RasterGrid::from_fn(&base, move |r, _| f(r)),
    };
    let rainfall_days = vec![
        day(date(2024, 6, 15), |r| 300.0 + 20.0 * r as f32),
        day(date(2024, 7, 15), |r| 300.0 + 20.0 * r as f32),
        day(date(2024, 8, 15), |r| 300.0 + 20.0 * r as f32),
        day(date(2024, 10, 5), |_| 9999.0),
    ];

    let scene = |id: &str, d: NaiveDate, cloud: f64, red: f32, nir0: f32| ReflectanceScene {
        id: id.into(),
        date: d,
        cloud_pct: cloud,
        red: RasterGrid::like(&base, red),
        nir: RasterGrid::from_fn(&base, move |_, c| nir0 + 0.01 * c as f32),
    };
    let scenes = vec![
        scene("S2_A", date(2024, 7, 2), 12.0, 0.1, 0.5),
        scene("S2_B", date(2024, 8, 9), 25.0, 0.1, 0.3),
        scene("S2_CLOUDY", date(2024, 8, 20), 85.0, 0.5, 0.1),
    ];

    let mut forecast_assets = InMemorySource::default();
    forecast_assets.insert(
        "PRECIPITATION_DAILY_UTTARAKHAND_2025_10_20",
        NamedBands::single("precipitation", RasterGrid::new(6, 6, bounds(N, N), 150.0)),
    );

    InputBundle {
        region: Region::from_bounds("fixture", 79.001, 30.001, 79.023, 30.023),
        elevation,
        rainfall_days,
        scenes,
        forecast_assets,
    }
}

/// Labelled points on every other row of the fixture region.
///
/// Labels follow the column band (west → 1, middle → 2, east → 3). A few
/// points carry text labels and a few carry none.
pub fn labeled_points() -> Vec<LabeledPoint> {
    let g = grid(24, 24, 0.0);
    let mut out = Vec::new();
    for r in (1..23).step_by(2) {
        for c in 1..23 {
            let class = if c < 8 { 1 } else if c < 16 { 2 } else { 3 };
            let label = if (r + c) % 11 == 0 {
                None
            } else if c == 5 {
                Some(LabelValue::Text(class.to_string()))
            } else {
                Some(LabelValue::Number(class as f64))
            };
            out.push(LabeledPoint {
                id: Some(format!("p{r:02}_{c:02}")),
                location: g.cell_center(r, c),
                label,
            });
        }
    }
    // Outside the region entirely.
    out.push(LabeledPoint {
        id: Some("far".into()),
        location: LatLon::new(31.0, 80.0),
        label: Some(LabelValue::Number(3.0)),
    });
    out
}

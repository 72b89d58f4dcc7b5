/// Geographic coordinate types: points, study regions, circular buffers and
/// date windows. All coordinate math uses f64 for precision.
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Metres per degree of arc on the equatorial radius used throughout the crate.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// A point on the sphere in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Offset this point by metres east / north (local flat-earth approximation).
    pub fn offset_m(self, east_m: f64, north_m: f64) -> LatLon {
        let dlat = north_m / METRES_PER_DEGREE;
        let coslat = self.lat.to_radians().cos().max(1e-9);
        let dlon = east_m / (METRES_PER_DEGREE * coslat);
        LatLon::new(self.lat + dlat, self.lon + dlon)
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    pub fn contains(&self, ll: LatLon) -> bool {
        ll.lon >= self.min_lon && ll.lon <= self.max_lon && ll.lat >= self.min_lat && ll.lat <= self.max_lat
    }
}

/// A named study region bounded by a single closed polygon ring.
///
/// The ring may be given open or closed; the closing edge is implied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub ring: Vec<LatLon>,
}

impl Region {
    pub fn new(name: impl Into<String>, ring: Vec<LatLon>) -> Self {
        Self { name: name.into(), ring }
    }

    /// Rectangular region from bounds.
    pub fn from_bounds(name: impl Into<String>, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(
            name,
            vec![
                LatLon::new(min_lat, min_lon),
                LatLon::new(min_lat, max_lon),
                LatLon::new(max_lat, max_lon),
                LatLon::new(max_lat, min_lon),
            ],
        )
    }

    pub fn bbox(&self) -> BBox {
        let mut b = BBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for p in &self.ring {
            b.min_lon = b.min_lon.min(p.lon);
            b.max_lon = b.max_lon.max(p.lon);
            b.min_lat = b.min_lat.min(p.lat);
            b.max_lat = b.max_lat.max(p.lat);
        }
        b
    }

    /// Even-odd point-in-polygon test. Degenerate rings (< 3 vertices) contain nothing.
    pub fn contains(&self, ll: LatLon) -> bool {
        let n = self.ring.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (self.ring[i], self.ring[j]);
            if (pi.lat > ll.lat) != (pj.lat > ll.lat) {
                let x = (pj.lon - pi.lon) * (ll.lat - pi.lat) / (pj.lat - pi.lat) + pi.lon;
                if ll.lon < x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// A circular buffer around a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub center: LatLon,
    pub radius_m: f64,
}

impl Buffer {
    pub fn new(center: LatLon, radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    /// Whether a local offset (m east, m north) of the centre lies inside.
    /// The radius itself is inside.
    pub fn contains_offset(&self, east_m: f64, north_m: f64) -> bool {
        east_m * east_m + north_m * north_m <= self.radius_m * self.radius_m
    }
}

/// A half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `[start, start + days)`.
    pub fn days_from(start: NaiveDate, days: i64) -> Self {
        Self { start, end: start + Duration::days(days) }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_contains_interior_not_exterior() {
        let r = Region::from_bounds("box", 78.0, 29.0, 80.0, 31.0);
        assert!(r.contains(LatLon::new(30.0, 79.0)));
        assert!(!r.contains(LatLon::new(32.0, 79.0)));
        assert!(!r.contains(LatLon::new(30.0, 77.5)));
    }

    #[test]
    fn concave_polygon_excludes_notch() {
        // U shape: notch between lon 1..2 above lat 1.
        let ring = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 3.0),
            LatLon::new(3.0, 3.0),
            LatLon::new(3.0, 2.0),
            LatLon::new(1.0, 2.0),
            LatLon::new(1.0, 1.0),
            LatLon::new(3.0, 1.0),
            LatLon::new(3.0, 0.0),
        ];
        let r = Region::new("u", ring);
        assert!(r.contains(LatLon::new(2.0, 0.5)));
        assert!(!r.contains(LatLon::new(2.0, 1.5)));
        assert!(r.contains(LatLon::new(0.5, 1.5)));
    }

    #[test]
    fn offset_moves_by_metres() {
        let p = LatLon::new(30.0, 79.0);
        let q = p.offset_m(0.0, 111_320.0);
        assert!((q.lat - 31.0).abs() < 1e-9 && q.lon == 79.0);
        let e = p.offset_m(96_405.0, 0.0);
        assert!((e.lon - 80.0).abs() < 1e-3, "lon {}", e.lon);

        let b = Buffer::new(p, 150.0);
        assert!(b.contains_offset(90.0, 120.0));
        assert!(b.contains_offset(0.0, -150.0));
        assert!(!b.contains_offset(110.0, 110.0));
    }

    #[test]
    fn date_range_is_half_open() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let w = DateRange::new(d("2024-06-01"), d("2024-09-30"));
        assert!(w.contains(d("2024-06-01")));
        assert!(w.contains(d("2024-09-29")));
        assert!(!w.contains(d("2024-09-30")));
        assert_eq!(DateRange::days_from(d("2024-10-20"), 7).end, d("2024-10-27"));
    }
}

use serde::{Deserialize, Serialize};

/// Number of predictor bands presented to the classifier.
pub const BAND_COUNT: usize = 6;

/// The six canonical predictor bands, in stack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Elevation,
    Slope,
    Rainfall,
    Vegetation,
    Roughness,
    Drainage,
}

impl Band {
    /// Canonical stack order. Feature vectors are laid out in this order.
    pub const ALL: [Band; BAND_COUNT] = [
        Band::Elevation,
        Band::Slope,
        Band::Rainfall,
        Band::Vegetation,
        Band::Roughness,
        Band::Drainage,
    ];

    /// The five bands that take part in the weighted overlay.
    pub const OVERLAY: [Band; 5] = [
        Band::Slope,
        Band::Rainfall,
        Band::Vegetation,
        Band::Roughness,
        Band::Drainage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Band::Elevation => "elevation",
            Band::Slope => "slope",
            Band::Rainfall => "rainfall",
            Band::Vegetation => "ndvi",
            Band::Roughness => "roughness",
            Band::Drainage => "drainage",
        }
    }

    /// Position in the canonical stack.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn unit(self) -> &'static str {
        match self {
            Band::Elevation => "m",
            Band::Slope => "deg",
            Band::Rainfall => "mm",
            Band::Vegetation => "ndvi",
            Band::Roughness => "m",
            Band::Drainage => "deg",
        }
    }
}

/// Canonical band names in stack order.
pub fn canonical_names() -> [&'static str; BAND_COUNT] {
    Band::ALL.map(Band::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_index_agree() {
        for (i, b) in Band::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
        }
        assert_eq!(
            canonical_names(),
            ["elevation", "slope", "rainfall", "ndvi", "roughness", "drainage"]
        );
    }
}

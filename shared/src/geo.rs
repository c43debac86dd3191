use serde::{Deserialize, Serialize};

const DEGENERATE_SPAN: f64 = 1e-9;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both components finite and inside the valid degree ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Axis-aligned lat/lon rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Smallest bounds enclosing every point, or `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first.lat, first.lon, first.lat, first.lon);
        for point in iter {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: LatLng) {
        self.south = self.south.min(point.lat);
        self.west = self.west.min(point.lon);
        self.north = self.north.max(point.lat);
        self.east = self.east.max(point.lon);
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Bounds that cannot drive a viewport fit: non-finite edges or a
    /// collapsed rectangle (a single point).
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return true;
        }
        (self.north - self.south) <= DEGENERATE_SPAN && (self.east - self.west) <= DEGENERATE_SPAN
    }

    /// Grow each edge by `ratio` of the corresponding span.
    pub fn pad(&self, ratio: f64) -> Self {
        let dlat = (self.north - self.south).abs() * ratio;
        let dlon = (self.east - self.west).abs() * ratio;
        Self::new(
            self.south - dlat,
            self.west - dlon,
            self.north + dlat,
            self.east + dlon,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{LatLng, LatLngBounds};

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn validity_rejects_non_finite_and_out_of_range() {
        assert!(LatLng::new(40.4, -3.7).is_valid());
        assert!(!LatLng::new(f64::NAN, -3.7).is_valid());
        assert!(!LatLng::new(40.4, f64::INFINITY).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -181.0).is_valid());
    }

    #[test]
    fn from_points_encloses_all() {
        let bounds = LatLngBounds::from_points([
            LatLng::new(36.7, -4.4),
            LatLng::new(43.3, -8.4),
            LatLng::new(41.4, 2.2),
        ])
        .expect("non-empty");
        assert_eq!(bounds, LatLngBounds::new(36.7, -8.4, 43.3, 2.2));
        assert!(bounds.contains(LatLng::new(40.4, -3.7)));
        assert!(!bounds.contains(LatLng::new(28.1, -15.4)));
    }

    #[test]
    fn from_points_empty_is_none() {
        assert_eq!(LatLngBounds::from_points(Vec::new()), None);
    }

    #[test]
    fn single_point_is_degenerate() {
        let bounds = LatLngBounds::from_points([LatLng::new(40.0, -3.0), LatLng::new(40.0, -3.0)])
            .expect("non-empty");
        assert!(bounds.is_degenerate());
    }

    #[test]
    fn line_of_points_is_not_degenerate() {
        let bounds = LatLngBounds::from_points([LatLng::new(40.0, -3.0), LatLng::new(40.0, -1.0)])
            .expect("non-empty");
        assert!(!bounds.is_degenerate());
    }

    #[test]
    fn pad_grows_by_ratio_of_span() {
        let padded = LatLngBounds::new(40.0, -4.0, 42.0, 0.0).pad(0.1);
        assert_close(padded.south, 39.8);
        assert_close(padded.north, 42.2);
        assert_close(padded.west, -4.4);
        assert_close(padded.east, 0.4);
        let center = padded.center();
        assert_close(center.lat, 41.0);
        assert_close(center.lon, -2.0);
    }
}

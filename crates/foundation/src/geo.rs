use serde::{Deserialize, Serialize};

/// A WGS84 position on an entity trajectory, in degrees.
///
/// Feeds disagree on field names, so `lat`/`lon` are accepted on input.
/// Unknown fields (altitude, timestamp, ...) are ignored.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
}

impl TrajectoryPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `[lat, lon]` pair, the order polyline renderers expect.
    pub fn lat_lon(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

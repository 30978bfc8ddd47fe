use foundation::TrajectoryPoint;
use serde_json::Value;

/// Ordered positions of the selected entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryBuffer {
    points: Vec<TrajectoryPoint>,
}

impl TrajectoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn replace(&mut self, points: Vec<TrajectoryPoint>) {
        self.points = points;
    }

    pub fn push(&mut self, point: TrajectoryPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Applies one inbound push.
    ///
    /// An array replaces the whole buffer; a single object is appended.
    /// Returns the buffer length afterwards. On error the buffer is untouched.
    pub fn apply_payload(&mut self, payload: &Value) -> Result<usize, serde_json::Error> {
        if payload.is_array() {
            let points: Vec<TrajectoryPoint> = serde_json::from_value(payload.clone())?;
            self.replace(points);
        } else {
            let point: TrajectoryPoint = serde_json::from_value(payload.clone())?;
            self.push(point);
        }
        Ok(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::TrajectoryBuffer;
    use foundation::TrajectoryPoint;
    use serde_json::json;

    #[test]
    fn array_payload_replaces() {
        let mut b = TrajectoryBuffer::new();
        b.push(TrajectoryPoint::new(9.0, 9.0));
        let n = b
            .apply_payload(&json!([{"lat": 1, "lon": 2}, {"lat": 3, "lon": 4}]))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            b.points(),
            &[TrajectoryPoint::new(1.0, 2.0), TrajectoryPoint::new(3.0, 4.0)]
        );
    }

    #[test]
    fn object_payload_appends() {
        let mut b = TrajectoryBuffer::new();
        b.apply_payload(&json!({"latitude": 1.5, "longitude": 2.5}))
            .unwrap();
        b.apply_payload(&json!({"latitude": 1.6, "longitude": 2.6}))
            .unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.points()[1], TrajectoryPoint::new(1.6, 2.6));
    }

    #[test]
    fn malformed_payload_leaves_buffer_alone() {
        let mut b = TrajectoryBuffer::new();
        b.push(TrajectoryPoint::new(1.0, 1.0));
        assert!(b.apply_payload(&json!([{"lat": "north"}])).is_err());
        assert!(b.apply_payload(&json!("nope")).is_err());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn empty_array_clears() {
        let mut b = TrajectoryBuffer::new();
        b.push(TrajectoryPoint::new(1.0, 1.0));
        b.apply_payload(&json!([])).unwrap();
        assert!(b.is_empty());
    }
}

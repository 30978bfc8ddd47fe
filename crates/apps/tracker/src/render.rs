use foundation::{EntityId, TrajectoryPoint};
use selection::TrajectoryRenderer;
use tracing::info;

/// Renders the trajectory as a log line: length plus first and last fix.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl TrajectoryRenderer for LogRenderer {
    fn render(&mut self, entity: Option<&EntityId>, points: &[TrajectoryPoint]) {
        let Some(entity) = entity else {
            return;
        };
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => info!(
                "{entity}: {} points, {:?} .. {:?}",
                points.len(),
                first.lat_lon(),
                last.lat_lon()
            ),
            _ => info!("{entity}: no trajectory"),
        }
    }
}

use foundation::{EntityId, TrajectoryPoint};

/// Drawing collaborator for the selected entity's trajectory.
///
/// Called with the full current buffer every time it changes; an empty
/// slice means "clear".
pub trait TrajectoryRenderer {
    fn render(&mut self, entity: Option<&EntityId>, points: &[TrajectoryPoint]);
}

/// Renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl TrajectoryRenderer for NullRenderer {
    fn render(&mut self, _entity: Option<&EntityId>, _points: &[TrajectoryPoint]) {}
}

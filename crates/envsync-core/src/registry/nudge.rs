//! Keyboard goal nudging

use super::ActorRegistry;
use crate::sim::tensor::cols;
use crate::sim::{PhysicsBackend, ViewerEvent};
use crate::Result;

/// Name of the actor moved by viewer events
pub const GOAL_ACTOR_NAME: &str = "goal";

/// Distance moved per viewer event, in meters
pub const NUDGE_STEP: f32 = 0.1;

impl ViewerEvent {
    /// World-frame displacement for one event
    pub fn goal_delta(self, step: f32) -> [f32; 3] {
        match self {
            ViewerEvent::Up => [0.0, -step, 0.0],
            ViewerEvent::Down => [0.0, step, 0.0],
            ViewerEvent::Left => [step, 0.0, 0.0],
            ViewerEvent::Right => [-step, 0.0, 0.0],
            ViewerEvent::High => [0.0, 0.0, step],
            ViewerEvent::Low => [0.0, 0.0, -step],
        }
    }
}

impl<B: PhysicsBackend> ActorRegistry<B> {
    /// Move the goal actor by [`NUDGE_STEP`] per event in every environment
    pub fn nudge_goal(&mut self, events: &[ViewerEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let handle = self.handle_of(GOAL_ACTOR_NAME)?;
        let session = self.session.as_mut().ok_or_else(super::no_session)?;

        for event in events {
            let delta = event.goal_delta(NUDGE_STEP);
            let mut position = session
                .tensors
                .root_state
                .columns_mut(handle.index(), cols::POSITION)?;
            for mut row in position.row_iter_mut() {
                row.iter_mut().zip(delta).for_each(|(p, d)| *p += d);
            }
            self.backend
                .set_actor_root_state_indexed(&session.tensors.root_state, &[handle])?;
            tracing::trace!("goal nudged {:?}", event);
        }
        Ok(())
    }
}

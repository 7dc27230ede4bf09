//! Dynamic obstacle reconciliation
//!
//! An external tracker reports obstacles by id. Unknown ids become new
//! fixed spheres, and a changed collision size is written into the
//! descriptor. Both force a session rebuild, since asset geometry is frozen
//! once a session is prepared. Pose and velocity are then written for every
//! reported obstacle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{no_session, ActorRegistry};
use crate::actor::ActorDescriptor;
use crate::sim::tensor::cols;
use crate::sim::PhysicsBackend;
use crate::{Error, Result};

/// Tracker observation of one obstacle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleObservation {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// `[radius]` for spheres, `[x, y, z]` for boxes
    pub size: Vec<f32>,
}

impl ObstacleObservation {
    pub fn sphere(position: [f32; 3], velocity: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            velocity,
            size: vec![radius],
        }
    }

    fn root_state(&self) -> [f32; 13] {
        let mut row = [0.0; 13];
        row[cols::POSITION].copy_from_slice(&self.position);
        row[cols::ORIENTATION].copy_from_slice(&[0.0, 0.0, 0.0, 1.0]);
        row[cols::LINEAR_VELOCITY].copy_from_slice(&self.velocity);
        row
    }
}

/// Actor name used for a tracked obstacle id
pub fn obstacle_actor_name(id: &str) -> String {
    format!("sphere{id}")
}

enum Change {
    Resize(usize, Vec<f32>),
    Spawn(ActorDescriptor),
}

impl<B: PhysicsBackend> ActorRegistry<B> {
    /// Bring obstacle actors in line with the latest observations
    ///
    /// Returns `true` when the session was rebuilt. Observations are checked
    /// before any descriptor changes, so a malformed entry leaves the
    /// registry untouched.
    pub fn reconcile_obstacles(
        &mut self,
        observed: &BTreeMap<String, ObstacleObservation>,
    ) -> Result<bool> {
        self.session()?;

        let mut changes = Vec::new();
        for (id, obs) in observed {
            let name = obstacle_actor_name(id);
            match self.find(&name) {
                Some(index) => {
                    if self.descriptors[index].kind.size() != obs.size {
                        let mut resized = self.descriptors[index].kind.clone();
                        resized.resize(&obs.size)?;
                        changes.push(Change::Resize(index, obs.size.clone()));
                    }
                }
                None => {
                    let radius = match obs.size.as_slice() {
                        [r] => *r,
                        other => {
                            return Err(Error::DimensionMismatch {
                                what: "new obstacle size",
                                expected: 1,
                                actual: other.len(),
                            })
                        }
                    };
                    let descriptor = ActorDescriptor::sphere(name, radius)
                        .with_position(obs.position)
                        .fixed();
                    descriptor.validate()?;
                    changes.push(Change::Spawn(descriptor));
                }
            }
        }

        let rebuild = !changes.is_empty();
        for change in changes {
            match change {
                Change::Resize(index, size) => {
                    tracing::debug!("{}: resized to {:?}", self.descriptors[index].name, size);
                    self.descriptors[index].kind.resize(&size)?;
                }
                Change::Spawn(descriptor) => {
                    tracing::debug!("{}: new obstacle", descriptor.name);
                    self.descriptors.push(descriptor);
                }
            }
        }
        if rebuild {
            self.reindex();
            tracing::info!("Obstacle set changed, rebuilding session");
            self.rebuild()?;
        }

        let mut handles = Vec::with_capacity(observed.len());
        for (id, obs) in observed {
            let handle = self.handle_of(obstacle_actor_name(id).as_str())?;
            let session = self.session.as_mut().ok_or_else(no_session)?;
            session
                .tensors
                .root_state
                .fill_columns(handle.index(), cols::ALL, &obs.root_state())?;
            handles.push(handle);
        }
        if !handles.is_empty() {
            let session = self.session.as_ref().ok_or_else(no_session)?;
            self.backend
                .set_actor_root_state(&session.tensors.root_state)?;
        }
        Ok(rebuild)
    }
}

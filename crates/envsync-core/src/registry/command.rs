//! Robot command dispatch
//!
//! An upstream command has one column block per robot, in registration
//! order. A differential-drive robot's block starts with `(v, ω)` for its
//! base, followed by one column per non-wheel joint. Every other robot takes
//! one column per DOF. The command is expanded into a full
//! `num_envs × num_dofs` target matrix and handed to the backend through the
//! setter that matches the shared drive mode.

use nalgebra::DMatrix;

use super::{ActorRegistry, DofLayout};
use crate::actor::{ActorDescriptor, DriveMode, WheelSide};
use crate::sim::tensor::DOF_STATE_WIDTH;
use crate::sim::{PhysicsBackend, StateTensor};
use crate::{Error, Result};

impl<B: PhysicsBackend> ActorRegistry<B> {
    /// Number of command columns expected by [`apply_robot_command`](Self::apply_robot_command)
    pub fn command_columns(&self) -> Result<usize> {
        Ok(self
            .session()?
            .dof_layouts
            .iter()
            .map(|dofs| dofs.command_columns)
            .sum())
    }

    /// Translate a command into DOF targets and push them to the backend
    ///
    /// `u` has either one row, broadcast to every environment, or one row per
    /// environment. Shape errors are reported before anything reaches the
    /// backend.
    pub fn apply_robot_command(&mut self, u: &DMatrix<f32>) -> Result<()> {
        let session = self.session()?;
        let mode = self.drive_mode()?;

        let expected = self.command_columns()?;
        if u.ncols() != expected {
            return Err(Error::DimensionMismatch {
                what: "command columns",
                expected,
                actual: u.ncols(),
            });
        }
        if u.nrows() != 1 && u.nrows() != self.num_envs {
            return Err(Error::DimensionMismatch {
                what: "command rows",
                expected: self.num_envs,
                actual: u.nrows(),
            });
        }

        let Some(mode) = mode else {
            return Ok(());
        };

        let num_dofs = session.tensors.layout().dofs;
        let targets = expand_command(
            u,
            &session.dof_layouts,
            &self.descriptors,
            self.num_envs,
            num_dofs,
        );
        tracing::trace!("dispatching {}x{} {} targets", targets.nrows(), targets.ncols(), mode);

        match mode {
            DriveMode::Velocity => self.backend.set_dof_velocity_targets(&targets),
            DriveMode::Effort => self.backend.set_dof_actuation_forces(&targets),
            DriveMode::Position => {
                let mut dof_state = StateTensor::zeros(self.num_envs, num_dofs, DOF_STATE_WIDTH);
                let m = dof_state.as_matrix_mut();
                for e in 0..self.num_envs {
                    for d in 0..num_dofs {
                        m[(e, d * DOF_STATE_WIDTH)] = targets[(e, d)];
                    }
                }
                self.backend.set_dof_state(&dof_state)
            }
        }
    }
}

/// Expand a validated command into per-DOF targets
pub(crate) fn expand_command(
    u: &DMatrix<f32>,
    layouts: &[DofLayout],
    descriptors: &[ActorDescriptor],
    num_envs: usize,
    num_dofs: usize,
) -> DMatrix<f32> {
    let broadcast = u.nrows() == 1;
    let at = |e: usize, c: usize| if broadcast { u[(0, c)] } else { u[(e, c)] };

    let mut targets = DMatrix::zeros(num_envs, num_dofs);
    let mut cursor = 0;

    for dofs in layouts {
        let Some(spec) = descriptors[dofs.actor].kind.as_robot() else {
            continue;
        };

        let base = spec.differential_drive.as_ref().map(|drive| {
            let c = cursor;
            cursor += 2;
            (drive, c)
        });

        for (j, wheel) in dofs.wheels.iter().enumerate() {
            let d = dofs.offset + j;
            match (wheel, base) {
                (Some(side), Some((drive, c))) => {
                    for e in 0..num_envs {
                        let (left, right) = drive.wheel_speeds(at(e, c), at(e, c + 1));
                        targets[(e, d)] = match side {
                            WheelSide::Left => left,
                            WheelSide::Right => right,
                        };
                    }
                }
                _ => {
                    for e in 0..num_envs {
                        targets[(e, d)] = at(e, cursor);
                    }
                    cursor += 1;
                }
            }
        }

        // fingers are the last two DOFs
        if let Some(policy) = spec.gripper {
            let n = dofs.joints.len();
            if n >= 2 {
                let last = dofs.offset + n - 1;
                for e in 0..num_envs {
                    let finger = policy.target(targets[(e, last)]);
                    targets[(e, last)] = finger;
                    targets[(e, last - 1)] = finger;
                }
            }
        }
    }
    targets
}

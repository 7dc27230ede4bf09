//! Actor/state registry
//!
//! [`ActorRegistry`] owns the actor descriptors and one backend session built
//! from them. It remembers which tensor row belongs to which actor, serves
//! zero-copy views into the cached state tensors and pushes writes back to
//! the backend one actor at a time.
//!
//! # Sessions
//!
//! Asset composition is fixed when a session is built. Adding an actor or
//! changing an obstacle's collision size tears the session down and builds a
//! new one, and every handle is reassigned. A failed build leaves the
//! registry without a session; every session-dependent call then returns
//! [`Error::Backend`] until [`ActorRegistry::build_session`] succeeds again.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ActorRegistry::new(backend, SimConfig::default());
//! registry.build_session(actors, 1)?;
//! loop {
//!     let u = planner.compute_action(registry.dof_state()?, registry.root_state_tensor()?)?;
//!     registry.apply_robot_command(&u)?;
//!     registry.step()?;
//! }
//! ```

mod command;
mod nudge;
mod obstacles;

pub use nudge::{GOAL_ACTOR_NAME, NUDGE_STEP};
pub use obstacles::{obstacle_actor_name, ObstacleObservation};

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use nalgebra::{DMatrix, DMatrixView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actor::{ActorDescriptor, ActorHandle, ActorKind, DriveMode, WheelSide};
use crate::math::Quaternion;
use crate::sim::tensor::{cols, CONTACT_FORCE_WIDTH, DOF_STATE_WIDTH};
use crate::sim::{
    ActorProperties, ActorSpawn, DofDrive, EnvId, PhysicsBackend, ShapeFriction, SimConfig,
    SimTensors, StateTensor, GOAL_KEY_BINDINGS,
};
use crate::{Error, Result};

/// Ways to address an actor; all resolve to the same tensor row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRef<'a> {
    /// Unique actor name
    Name(&'a str),
    /// Position among robot descriptors, in registration order
    Robot(usize),
    /// Position in the full descriptor list
    Index(usize),
}

impl<'a> From<&'a str> for ActorRef<'a> {
    fn from(name: &'a str) -> Self {
        ActorRef::Name(name)
    }
}

impl<'a> From<&'a String> for ActorRef<'a> {
    fn from(name: &'a String) -> Self {
        ActorRef::Name(name)
    }
}

impl std::fmt::Display for ActorRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRef::Name(name) => write!(f, "actor '{name}'"),
            ActorRef::Robot(i) => write!(f, "robot {i}"),
            ActorRef::Index(i) => write!(f, "actor index {i}"),
        }
    }
}

/// DOF bookkeeping for one robot
#[derive(Debug, Clone)]
pub(crate) struct DofLayout {
    /// Index into the descriptor list
    pub actor: usize,
    /// First DOF of this robot in the environment's DOF tensor
    pub offset: usize,
    pub joints: Vec<String>,
    /// Wheel group per joint, `None` for non-wheel joints
    pub wheels: Vec<Option<WheelSide>>,
    /// Columns this robot consumes from an upstream command
    pub command_columns: usize,
}

impl DofLayout {
    fn non_wheel_joints(&self) -> usize {
        self.wheels.iter().filter(|w| w.is_none()).count()
    }
}

/// One built backend session
#[derive(Debug)]
pub(crate) struct Session {
    pub envs: Vec<EnvId>,
    pub tensors: SimTensors,
    pub dof_layouts: Vec<DofLayout>,
    /// Rigid-body row whose position is recorded every step
    pub visualized_link: Option<usize>,
    pub trail: Vec<DMatrix<f32>>,
    pub saved_root_state: Option<StateTensor>,
}

pub(crate) fn no_session() -> Error {
    Error::Backend("no active session".into())
}

/// Registry of actors mapped onto a physics backend's state tensors
pub struct ActorRegistry<B: PhysicsBackend> {
    backend: B,
    config: SimConfig,
    descriptors: Vec<ActorDescriptor>,
    name_index: HashMap<String, usize>,
    robot_indices: Vec<usize>,
    obstacle_indices: Vec<usize>,
    num_envs: usize,
    session: Option<Session>,
    /// Number of build attempts, stamped into every handle of a session
    generation: u32,
    rng: StdRng,
}

impl<B: PhysicsBackend> ActorRegistry<B> {
    /// Create a registry with no actors and no session
    pub fn new(backend: B, config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            backend,
            config,
            descriptors: Vec::new(),
            name_index: HashMap::new(),
            robot_indices: Vec::new(),
            obstacle_indices: Vec::new(),
            num_envs: 0,
            session: None,
            generation: 0,
            rng,
        }
    }

    /// Validate `descriptors`, tear down any current session and build a new one
    ///
    /// Returns the handle of every descriptor in order. The build is
    /// all-or-nothing: on failure no session remains.
    pub fn build_session(
        &mut self,
        mut descriptors: Vec<ActorDescriptor>,
        num_envs: usize,
    ) -> Result<Vec<ActorHandle>> {
        self.config.validate()?;
        if num_envs == 0 {
            return Err(Error::Config("num_envs must be at least 1".into()));
        }
        for descriptor in &mut descriptors {
            descriptor.apply_reserved_policies();
            descriptor.validate()?;
        }
        validate_actor_set(&descriptors)?;

        self.stop();
        self.descriptors = descriptors;
        self.num_envs = num_envs;
        self.reindex();
        self.rebuild()
    }

    /// Append actors and rebuild the session
    pub fn add_actors(&mut self, additions: Vec<ActorDescriptor>) -> Result<Vec<ActorHandle>> {
        let mut descriptors = self.descriptors.clone();
        descriptors.extend(additions);
        let num_envs = self.num_envs.max(1);
        self.build_session(descriptors, num_envs)
    }

    /// Tear down the current session and build a new one from the stored descriptors
    pub(crate) fn rebuild(&mut self) -> Result<Vec<ActorHandle>> {
        self.stop();
        self.generation = self.generation.wrapping_add(1).max(1);
        let (session, handles) = match self.start_session() {
            Ok(built) => built,
            Err(e) => return Err(self.abort_build(e)),
        };
        let handles: Vec<ActorHandle> = handles
            .into_iter()
            .map(|h| h.in_session(self.generation))
            .collect();
        for (descriptor, handle) in self.descriptors.iter_mut().zip(&handles) {
            descriptor.handle = Some(*handle);
        }
        self.session = Some(session);
        if let Err(e) = self.apply_initial_dof_state() {
            return Err(self.abort_build(e));
        }
        tracing::info!(
            "Session {} built on {} backend: {} actors x {} envs",
            self.generation,
            self.backend.name(),
            self.descriptors.len(),
            self.num_envs
        );
        Ok(handles)
    }

    fn abort_build(&mut self, e: Error) -> Error {
        tracing::error!("Session build failed: {}", e);
        self.session = None;
        self.backend.destroy_session();
        self.clear_handles();
        e
    }

    fn start_session(&mut self) -> Result<(Session, Vec<ActorHandle>)> {
        let num_envs = self.num_envs;
        self.backend.create_session(&self.config)?;
        if self.config.viewer {
            self.backend.create_viewer()?;
            if self.config.interactive_goal {
                self.backend.subscribe_viewer_keys(&GOAL_KEY_BINDINGS)?;
            }
        }

        let assets = self
            .descriptors
            .iter()
            .map(|d| self.backend.create_asset(d))
            .collect::<Result<Vec<_>>>()?;

        let envs_per_row = ((num_envs as f64).sqrt() as usize).max(1);
        let mut envs = Vec::with_capacity(num_envs);
        let mut handles: Vec<ActorHandle> = Vec::with_capacity(self.descriptors.len());

        for env_idx in 0..num_envs {
            let env = self
                .backend
                .create_env(env_idx, self.config.spacing, envs_per_row)?;

            for (i, descriptor) in self.descriptors.iter().enumerate() {
                let asset = match descriptor.noise_sigma_size {
                    Some(sigma) => {
                        let perturbed = perturb_size(&mut self.rng, descriptor, sigma);
                        self.backend.create_asset(&perturbed)?
                    }
                    None => assets[i],
                };
                let group = if descriptor.collision {
                    env_idx
                } else {
                    env_idx + num_envs
                };
                let spawn = ActorSpawn {
                    name: &descriptor.name,
                    position: descriptor.init_pos,
                    orientation: descriptor.init_ori,
                    collision_group: group as u32,
                };
                let handle = self.backend.create_actor(env, asset, &spawn)?;

                if env_idx == 0 {
                    handles.push(handle);
                } else if handles[i] != handle {
                    return Err(Error::Backend(format!(
                        "{}: handle {} in env {env_idx} differs from {} in env 0",
                        descriptor.name, handle, handles[i]
                    )));
                }

                let properties =
                    actor_properties(&self.backend, &mut self.rng, env, handle, descriptor)?;
                self.backend.configure_actor(env, handle, &properties)?;
                tracing::debug!(
                    "Registered {} '{}' as {} in env {}",
                    descriptor.kind.label(),
                    descriptor.name,
                    handle,
                    env_idx
                );
            }
            envs.push(env);
        }

        let unique: HashSet<ActorHandle> = handles.iter().copied().collect();
        if unique.len() != handles.len() {
            return Err(Error::Backend("backend assigned duplicate actor handles".into()));
        }

        let layout = self.backend.prepare()?;
        if layout.actors != self.descriptors.len()
            || handles.iter().any(|h| h.index() >= layout.actors)
        {
            return Err(Error::Backend(format!(
                "backend reports {} actors for {} descriptors",
                layout.actors,
                self.descriptors.len()
            )));
        }

        let tensors = self.backend.acquire_state_tensors()?;
        if tensors.layout() != layout || tensors.num_envs() != num_envs {
            return Err(Error::Backend(format!(
                "acquired tensors hold {} envs, expected {num_envs}",
                tensors.num_envs()
            )));
        }

        let dof_layouts = self.dof_layouts(envs[0], &handles, layout.dofs)?;
        let visualized_link = self.visualized_link(envs[0], &handles)?;

        Ok((
            Session {
                envs,
                tensors,
                dof_layouts,
                visualized_link,
                trail: Vec::new(),
                saved_root_state: None,
            },
            handles,
        ))
    }

    fn dof_layouts(
        &self,
        env: EnvId,
        handles: &[ActorHandle],
        num_dofs: usize,
    ) -> Result<Vec<DofLayout>> {
        let mut layouts = Vec::new();
        let mut offset = 0;
        for (i, (descriptor, handle)) in self.descriptors.iter().zip(handles).enumerate() {
            let joints = self.backend.actor_dof_names(env, *handle)?;
            let count = joints.len();
            if let ActorKind::Robot(spec) = &descriptor.kind {
                let wheels: Vec<Option<WheelSide>> = joints
                    .iter()
                    .map(|j| {
                        spec.differential_drive
                            .as_ref()
                            .and_then(|drive| drive.wheel_side(j))
                    })
                    .collect();
                if let Some(drive) = &spec.differential_drive {
                    let missing = drive
                        .left_wheel_joints
                        .iter()
                        .chain(&drive.right_wheel_joints)
                        .find(|w| !joints.contains(*w));
                    if let Some(wheel) = missing {
                        return Err(Error::Config(format!(
                            "{}: wheel joint '{wheel}' is not a DOF of the robot",
                            descriptor.name
                        )));
                    }
                }
                let free = wheels.iter().filter(|w| w.is_none()).count();
                let command_columns = match spec.differential_drive {
                    Some(_) => 2 + free,
                    None => count,
                };
                if let Some(pose) = &spec.init_joint_pose {
                    if pose.len() != count {
                        return Err(Error::Config(format!(
                            "{}: init_joint_pose has {} entries for {count} DOFs",
                            descriptor.name,
                            pose.len()
                        )));
                    }
                }
                if spec.gripper.is_some() && count < 2 {
                    return Err(Error::Config(format!(
                        "{}: gripper policy needs at least two DOFs",
                        descriptor.name
                    )));
                }
                layouts.push(DofLayout {
                    actor: i,
                    offset,
                    joints,
                    wheels,
                    command_columns,
                });
            }
            offset += count;
        }
        if offset != num_dofs {
            return Err(Error::Backend(format!(
                "actor DOF counts sum to {offset}, tensor holds {num_dofs}"
            )));
        }
        Ok(layouts)
    }

    fn visualized_link(&self, env: EnvId, handles: &[ActorHandle]) -> Result<Option<usize>> {
        let mut found = None;
        for (descriptor, handle) in self.descriptors.iter().zip(handles) {
            let Some(link) = descriptor
                .kind
                .as_robot()
                .and_then(|spec| spec.visualize_link.as_deref())
            else {
                continue;
            };
            if found.is_some() {
                tracing::warn!(
                    "{}: only the first visualized link is recorded, ignoring '{}'",
                    descriptor.name,
                    link
                );
                continue;
            }
            let body = self
                .backend
                .find_actor_rigid_body_index(env, *handle, link)
                .ok_or_else(|| {
                    Error::NotFound(format!("link '{link}' of actor '{}'", descriptor.name))
                })?;
            found = Some(body);
        }
        Ok(found)
    }

    /// Destroy the current session, if any
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            self.backend.destroy_session();
            self.clear_handles();
            tracing::info!("Session stopped");
        }
    }

    fn clear_handles(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.handle = None;
        }
    }

    /// Rebuild the name map and robot/obstacle index lists
    pub(crate) fn reindex(&mut self) {
        self.name_index = self
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        self.robot_indices = indices_where(&self.descriptors, |d| d.is_robot());
        self.obstacle_indices = indices_where(&self.descriptors, |d| d.kind.is_obstacle());
    }

    pub(crate) fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(no_session)
    }

    /// Whether a session is currently built
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    // --- Resolution ---

    /// Index of a descriptor by name, if present
    pub fn find(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Resolve any addressing mode to a descriptor index
    pub fn resolve<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<usize> {
        let actor = actor.into();
        let index = match actor {
            ActorRef::Name(name) => self.find(name),
            ActorRef::Robot(i) => self.robot_indices.get(i).copied(),
            ActorRef::Index(i) => (i < self.descriptors.len()).then_some(i),
        };
        index.ok_or_else(|| Error::NotFound(actor.to_string()))
    }

    /// Handle of an actor in the current session
    pub fn handle_of<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<ActorHandle> {
        let index = self.resolve(actor)?;
        self.session()?;
        self.descriptors[index].handle.ok_or_else(no_session)
    }

    // --- Read accessors ---

    fn root_columns<'a>(
        &self,
        actor: impl Into<ActorRef<'a>>,
        range: Range<usize>,
    ) -> Result<DMatrixView<'_, f32>> {
        let handle = self.handle_of(actor)?;
        self.session()?.tensors.root_state.columns(handle.index(), range)
    }

    /// `num_envs × 3` positions
    pub fn position<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<DMatrixView<'_, f32>> {
        self.root_columns(actor, cols::POSITION)
    }

    /// `num_envs × 4` orientations (x, y, z, w)
    pub fn orientation<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<DMatrixView<'_, f32>> {
        self.root_columns(actor, cols::ORIENTATION)
    }

    /// `num_envs × 3` linear velocities
    pub fn velocity<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<DMatrixView<'_, f32>> {
        self.root_columns(actor, cols::LINEAR_VELOCITY)
    }

    /// `num_envs × 3` angular velocities
    pub fn angular_velocity<'a>(
        &self,
        actor: impl Into<ActorRef<'a>>,
    ) -> Result<DMatrixView<'_, f32>> {
        self.root_columns(actor, cols::ANGULAR_VELOCITY)
    }

    /// `num_envs × 13` root states
    pub fn root_state<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<DMatrixView<'_, f32>> {
        self.root_columns(actor, cols::ALL)
    }

    fn link_row(&self, actor: &str, link: &str) -> Result<usize> {
        let handle = self.handle_of(actor)?;
        let env = self.session()?.envs[0];
        self.backend
            .find_actor_rigid_body_index(env, handle, link)
            .ok_or_else(|| Error::NotFound(format!("link '{link}' of actor '{actor}'")))
    }

    /// `num_envs × 13` rigid-body state of one link
    pub fn link_state(&self, actor: &str, link: &str) -> Result<DMatrixView<'_, f32>> {
        let row = self.link_row(actor, link)?;
        self.session()?
            .tensors
            .rigid_body_state
            .columns(row, cols::ALL)
    }

    /// `num_envs × 3` net contact force on one link
    pub fn contact_force(&self, actor: &str, link: &str) -> Result<DMatrixView<'_, f32>> {
        let row = self.link_row(actor, link)?;
        self.session()?
            .tensors
            .contact_force
            .columns(row, 0..CONTACT_FORCE_WIDTH)
    }

    /// Whole root-state tensor
    pub fn root_state_tensor(&self) -> Result<&StateTensor> {
        Ok(&self.session()?.tensors.root_state)
    }

    /// Whole DOF-state tensor
    pub fn dof_state(&self) -> Result<&StateTensor> {
        Ok(&self.session()?.tensors.dof_state)
    }

    /// Whole rigid-body-state tensor
    pub fn rigid_body_state(&self) -> Result<&StateTensor> {
        Ok(&self.session()?.tensors.rigid_body_state)
    }

    // --- Write accessors ---

    pub(crate) fn write_root_columns(
        &mut self,
        actor: ActorRef<'_>,
        range: Range<usize>,
        values: &[f32],
    ) -> Result<()> {
        let handle = self.handle_of(actor)?;
        let session = self.session.as_mut().ok_or_else(no_session)?;
        session
            .tensors
            .root_state
            .fill_columns(handle.index(), range, values)?;
        self.backend
            .set_actor_root_state_indexed(&session.tensors.root_state, &[handle])
    }

    fn write_root_rows(
        &mut self,
        actor: ActorRef<'_>,
        range: Range<usize>,
        values: &DMatrix<f32>,
    ) -> Result<()> {
        let handle = self.handle_of(actor)?;
        let expected = (self.num_envs, range.len());
        if values.shape() != expected {
            return Err(Error::DimensionMismatch {
                what: "per-env rows",
                expected: expected.0 * expected.1,
                actual: values.len(),
            });
        }
        let session = self.session.as_mut().ok_or_else(no_session)?;
        session
            .tensors
            .root_state
            .columns_mut(handle.index(), range)?
            .copy_from(values);
        self.backend
            .set_actor_root_state_indexed(&session.tensors.root_state, &[handle])
    }

    /// Set one actor's position in every environment
    pub fn set_position<'a>(
        &mut self,
        actor: impl Into<ActorRef<'a>>,
        position: [f32; 3],
    ) -> Result<()> {
        self.write_root_columns(actor.into(), cols::POSITION, &position)
    }

    /// Set one actor's linear velocity in every environment
    pub fn set_velocity<'a>(
        &mut self,
        actor: impl Into<ActorRef<'a>>,
        velocity: [f32; 3],
    ) -> Result<()> {
        self.write_root_columns(actor.into(), cols::LINEAR_VELOCITY, &velocity)
    }

    /// Set one actor's position per environment from a `num_envs × 3` matrix
    pub fn set_position_rows<'a>(
        &mut self,
        actor: impl Into<ActorRef<'a>>,
        positions: &DMatrix<f32>,
    ) -> Result<()> {
        self.write_root_rows(actor.into(), cols::POSITION, positions)
    }

    /// Set one actor's velocity per environment from a `num_envs × 3` matrix
    pub fn set_velocity_rows<'a>(
        &mut self,
        actor: impl Into<ActorRef<'a>>,
        velocities: &DMatrix<f32>,
    ) -> Result<()> {
        self.write_root_rows(actor.into(), cols::LINEAR_VELOCITY, velocities)
    }

    /// Set one actor's full 13-value root state in every environment
    pub fn set_root_state_row<'a>(
        &mut self,
        actor: impl Into<ActorRef<'a>>,
        state: [f32; 13],
    ) -> Result<()> {
        self.write_root_columns(actor.into(), cols::ALL, &state)
    }

    // --- Stepping ---

    /// Advance the simulation by one timestep and refresh every cached tensor
    pub fn step(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(no_session)?;
        self.backend.simulate()?;
        self.backend.fetch_results()?;
        self.backend.refresh_state_tensors(&mut session.tensors)?;

        if self.config.viewer {
            self.backend.render()?;
        }

        if let Some(body) = session.visualized_link {
            let position = session
                .tensors
                .rigid_body_state
                .columns(body, cols::POSITION)?
                .into_owned();
            session.trail.push(position);
        }

        if self.config.viewer && self.config.interactive_goal {
            let events = self.backend.poll_viewer_events();
            if !events.is_empty() {
                tracing::trace!("viewer events: {:?}", events);
                match self.nudge_goal(&events) {
                    Err(Error::NotFound(what)) => {
                        tracing::warn!("Ignoring viewer events, {} not found", what);
                    }
                    other => other?,
                }
            }
        }
        Ok(())
    }

    // --- Snapshot / restore ---

    /// Deep-copy the root-state tensor
    pub fn save_root_state(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(no_session)?;
        session.saved_root_state = Some(session.tensors.root_state.clone());
        Ok(())
    }

    /// Last saved root-state tensor
    pub fn saved_root_state(&self) -> Option<&StateTensor> {
        self.session.as_ref()?.saved_root_state.as_ref()
    }

    /// Push the saved root state back verbatim and clear the link trail
    ///
    /// Without a saved state this only clears the trail.
    pub fn restore_root_state(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(no_session)?;
        session.trail.clear();
        if let Some(saved) = session.saved_root_state.as_ref() {
            self.backend.set_actor_root_state(saved)?;
            session.tensors.root_state.clone_from(saved);
        }
        Ok(())
    }

    /// Positions of the visualized link recorded since the last restore
    pub fn visualized_link_trail(&self) -> &[DMatrix<f32>] {
        self.session
            .as_ref()
            .map(|s| s.trail.as_slice())
            .unwrap_or_default()
    }

    // --- Resets ---

    fn initial_dof_state(&self, session: &Session) -> StateTensor {
        let layout = session.tensors.layout();
        let mut dof_state = StateTensor::zeros(self.num_envs, layout.dofs, DOF_STATE_WIDTH);
        for dofs in &session.dof_layouts {
            let pose = self.descriptors[dofs.actor]
                .kind
                .as_robot()
                .and_then(|spec| spec.init_joint_pose.as_ref());
            if let Some(pose) = pose {
                let m = dof_state.as_matrix_mut();
                for e in 0..self.num_envs {
                    for (j, q) in pose.iter().enumerate() {
                        m[(e, (dofs.offset + j) * DOF_STATE_WIDTH)] = *q;
                    }
                }
            }
        }
        dof_state
    }

    fn apply_initial_dof_state(&mut self) -> Result<()> {
        let dof_state = self.initial_dof_state(self.session()?);
        self.backend.set_dof_state(&dof_state)?;
        let session = self.session.as_mut().ok_or_else(no_session)?;
        session.tensors.dof_state = dof_state;
        Ok(())
    }

    /// Move every actor back to its initial pose and reset joint states
    pub fn reset_to_initial_poses(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(no_session)?;
        for descriptor in &self.descriptors {
            let handle = descriptor.handle.ok_or_else(no_session)?;
            let mut row = [0.0f32; 13];
            row[cols::POSITION].copy_from_slice(&descriptor.init_pos);
            row[cols::ORIENTATION].copy_from_slice(&descriptor.init_ori);
            session
                .tensors
                .root_state
                .fill_columns(handle.index(), cols::ALL, &row)?;
        }
        self.backend
            .set_actor_root_state(&session.tensors.root_state)?;
        self.apply_initial_dof_state()
    }

    /// Set robot joint states from flat `q`/`qdot` vectors
    ///
    /// Robots consume entries in registration order. A differential-drive
    /// robot takes `(x, y, yaw)` for its base first, then one entry per
    /// non-wheel joint; its wheels are zeroed. Other robots take one entry
    /// per DOF.
    pub fn reset_robot_state(&mut self, q: &[f32], qdot: &[f32]) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(no_session)?;
        let expected: usize = session
            .dof_layouts
            .iter()
            .map(|dofs| {
                let diff = self.descriptors[dofs.actor]
                    .kind
                    .as_robot()
                    .is_some_and(|s| s.differential_drive.is_some());
                if diff {
                    3 + dofs.non_wheel_joints()
                } else {
                    dofs.joints.len()
                }
            })
            .sum();
        for (what, len) in [("joint positions", q.len()), ("joint velocities", qdot.len())] {
            if len != expected {
                return Err(Error::DimensionMismatch {
                    what,
                    expected,
                    actual: len,
                });
            }
        }

        let layout = session.tensors.layout();
        let mut dof_state = StateTensor::zeros(self.num_envs, layout.dofs, DOF_STATE_WIDTH);
        let mut cursor = 0;
        for dofs in &session.dof_layouts {
            let descriptor = &self.descriptors[dofs.actor];
            let diff = descriptor
                .kind
                .as_robot()
                .is_some_and(|s| s.differential_drive.is_some());

            if diff {
                let handle = descriptor.handle.ok_or_else(no_session)?;
                let (x, y, yaw) = (q[cursor], q[cursor + 1], q[cursor + 2]);
                let (vx, vy, yaw_rate) = (qdot[cursor], qdot[cursor + 1], qdot[cursor + 2]);
                let orientation = Quaternion::from_yaw(yaw).to_xyzw();
                let root = &mut session.tensors.root_state;
                root.fill_columns(handle.index(), 0..2, &[x, y])?;
                root.fill_columns(handle.index(), cols::ORIENTATION, &orientation)?;
                root.fill_columns(handle.index(), cols::LINEAR_VELOCITY, &[vx, vy, 0.0])?;
                root.fill_columns(handle.index(), cols::ANGULAR_VELOCITY, &[0.0, 0.0, yaw_rate])?;
                cursor += 3;
            }

            let m = dof_state.as_matrix_mut();
            for (j, wheel) in dofs.wheels.iter().enumerate() {
                if wheel.is_some() {
                    continue;
                }
                let col = (dofs.offset + j) * DOF_STATE_WIDTH;
                for e in 0..self.num_envs {
                    m[(e, col)] = q[cursor];
                    m[(e, col + 1)] = qdot[cursor];
                }
                cursor += 1;
            }
        }

        self.backend.set_dof_state(&dof_state)?;
        session.tensors.dof_state = dof_state;
        self.backend
            .set_actor_root_state(&session.tensors.root_state)
    }

    // --- Viewer ---

    /// Draw a polyline as green segments in one environment
    pub fn draw_lines(&mut self, points: &[[f32; 3]], env: usize) -> Result<()> {
        let env_id = *self
            .session()?
            .envs
            .get(env)
            .ok_or_else(|| Error::NotFound(format!("environment {env}")))?;
        let segments: Vec<[f32; 6]> = points
            .windows(2)
            .map(|w| [w[0][0], w[0][1], w[0][2], w[1][0], w[1][1], w[1][2]])
            .collect();
        let colors = vec![[0.0, 1.0, 0.0]; segments.len()];
        self.backend.add_lines(env_id, &segments, &colors)
    }

    /// Remove all debug lines
    pub fn clear_lines(&mut self) {
        self.backend.clear_lines();
    }

    // --- Accessors ---

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &[ActorDescriptor] {
        &self.descriptors
    }

    pub fn descriptor<'a>(&self, actor: impl Into<ActorRef<'a>>) -> Result<&ActorDescriptor> {
        Ok(&self.descriptors[self.resolve(actor)?])
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    pub fn num_robots(&self) -> usize {
        self.robot_indices.len()
    }

    /// Descriptor indices of robots, in registration order
    pub fn robot_indices(&self) -> &[usize] {
        &self.robot_indices
    }

    /// Descriptor indices of spheres and boxes
    pub fn obstacle_indices(&self) -> &[usize] {
        &self.obstacle_indices
    }

    /// Drive mode shared by all robots, `None` without robots
    pub fn drive_mode(&self) -> Result<Option<DriveMode>> {
        common_drive_mode(&self.descriptors)
    }
}

impl<B: PhysicsBackend> Drop for ActorRegistry<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: PhysicsBackend + std::fmt::Debug> std::fmt::Debug for ActorRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRegistry")
            .field("backend", &self.backend)
            .field("actors", &self.descriptors.len())
            .field("num_envs", &self.num_envs)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

fn indices_where(
    descriptors: &[ActorDescriptor],
    predicate: impl Fn(&ActorDescriptor) -> bool,
) -> Vec<usize> {
    descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| predicate(d))
        .map(|(i, _)| i)
        .collect()
}

fn common_drive_mode(descriptors: &[ActorDescriptor]) -> Result<Option<DriveMode>> {
    let mut mode: Option<(DriveMode, &str)> = None;
    for descriptor in descriptors {
        let Some(current) = descriptor.drive_mode() else {
            continue;
        };
        match mode {
            None => mode = Some((current, &descriptor.name)),
            Some((first, first_name)) if first != current => {
                return Err(Error::Config(format!(
                    "all robots must share one drive mode: '{first_name}' uses {first}, '{}' uses {current}",
                    descriptor.name
                )));
            }
            Some(_) => {}
        }
    }
    Ok(mode.map(|(m, _)| m))
}

/// Names must be unique and robots must agree on the drive mode
fn validate_actor_set(descriptors: &[ActorDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(Error::Config(format!(
                "duplicate actor name '{}'",
                descriptor.name
            )));
        }
    }
    common_drive_mode(descriptors).map(|_| ())
}

fn jitter(rng: &mut StdRng, amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..=amplitude)
    } else {
        0.0
    }
}

/// Copy of `descriptor` with each size component jittered by up to `sigma`
fn perturb_size(rng: &mut StdRng, descriptor: &ActorDescriptor, sigma: [f32; 3]) -> ActorDescriptor {
    const MIN_SIZE: f32 = 1e-3;
    let mut perturbed = descriptor.clone();
    match &mut perturbed.kind {
        ActorKind::Sphere { radius } => {
            *radius = (*radius + jitter(rng, sigma[0])).max(MIN_SIZE);
        }
        ActorKind::Axis { size } | ActorKind::Box { size } => {
            for (s, sig) in size.iter_mut().zip(sigma) {
                *s = (*s + jitter(rng, sig)).max(MIN_SIZE);
            }
        }
        ActorKind::Robot(_) => {}
    }
    perturbed
}

fn actor_properties<B: PhysicsBackend>(
    backend: &B,
    rng: &mut StdRng,
    env: EnvId,
    handle: ActorHandle,
    descriptor: &ActorDescriptor,
) -> Result<ActorProperties> {
    let robot = descriptor.kind.as_robot();
    let casters: &[String] = robot.map(|s| s.caster_links.as_slice()).unwrap_or_default();

    let shape_friction = backend
        .actor_shapes(env, handle)?
        .iter()
        .map(|body| {
            if casters.contains(body) {
                return ShapeFriction::NONE;
            }
            let noise = jitter(rng, descriptor.noise_percentage_friction * descriptor.friction);
            ShapeFriction {
                friction: descriptor.friction + noise,
                torsion_friction: rng.gen_range(0.001..0.01),
                rolling_friction: descriptor.friction + noise,
            }
        })
        .collect();

    let color = if descriptor.noise_sigma_size.is_some() {
        [rng.gen(), rng.gen(), rng.gen()]
    } else {
        descriptor.color
    };

    Ok(ActorProperties {
        color,
        mass: descriptor.mass + jitter(rng, descriptor.noise_percentage_mass * descriptor.mass),
        shape_friction,
        dof_drive: robot.map(|spec| DofDrive {
            mode: spec.drive_mode,
            gains: spec.drive_mode.gains(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{DifferentialDrive, RobotSpec};
    use crate::sim::{MockBackend, RobotModel};
    use approx::assert_relative_eq;

    fn boxer() -> ActorDescriptor {
        ActorDescriptor::robot(
            "boxer",
            RobotSpec::new("boxer.urdf")
                .with_differential_drive(DifferentialDrive {
                    wheel_radius: 0.1,
                    wheel_base: 0.5,
                    wheel_count: 2,
                    left_wheel_joints: vec!["wheel_left".into()],
                    right_wheel_joints: vec!["wheel_right".into()],
                })
                .with_visualize_link("ee_link"),
        )
        .with_position([0.0, 0.0, 0.1])
    }

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_robot_model(
                "boxer.urdf",
                RobotModel::new(
                    ["wheel_left", "wheel_right", "lift"],
                    ["base_link", "caster", "ee_link"],
                ),
            )
            .with_robot_model("arm.urdf", RobotModel::new(["j1", "j2"], ["base", "hand"]))
    }

    fn scene() -> Vec<ActorDescriptor> {
        vec![
            ActorDescriptor::sphere("goal", 0.1).with_position([2.0, 0.0, 0.5]),
            boxer(),
            ActorDescriptor::cuboid("wall", [1.0, 0.1, 0.5]).fixed(),
        ]
    }

    fn registry(num_envs: usize) -> ActorRegistry<MockBackend> {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        registry.build_session(scene(), num_envs).unwrap();
        registry
    }

    #[test]
    fn test_build_session_assigns_handles() {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        let handles = registry.build_session(scene(), 4).unwrap();

        let rows: Vec<usize> = handles.iter().map(|h| h.index()).collect();
        assert_eq!(rows, vec![0, 1, 2]);
        assert!(handles.iter().all(|h| h.session() == 1));
        assert!(registry.has_session());
        assert_eq!(registry.num_robots(), 1);
        assert_eq!(registry.robot_indices(), &[1]);
        assert_eq!(registry.obstacle_indices(), &[0, 2]);
        assert_eq!(registry.handle_of("wall").unwrap(), handles[2]);
        assert_eq!(registry.descriptors()[1].handle(), Some(handles[1]));
    }

    #[test]
    fn test_addressing_modes_agree() {
        let registry = registry(2);
        let by_name = registry.resolve("boxer").unwrap();
        assert_eq!(registry.resolve(ActorRef::Robot(0)).unwrap(), by_name);
        assert_eq!(registry.resolve(ActorRef::Index(1)).unwrap(), by_name);

        assert!(matches!(registry.resolve("nope"), Err(Error::NotFound(_))));
        assert!(matches!(registry.resolve(ActorRef::Robot(1)), Err(Error::NotFound(_))));
        assert!(matches!(registry.resolve(ActorRef::Index(3)), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_views_have_env_rows() {
        let registry = registry(3);
        assert_eq!(registry.position("goal").unwrap().shape(), (3, 3));
        assert_eq!(registry.orientation("goal").unwrap().shape(), (3, 4));
        assert_eq!(registry.root_state("goal").unwrap().shape(), (3, 13));
        assert_relative_eq!(registry.position("goal").unwrap()[(2, 0)], 2.0);
        assert_relative_eq!(registry.orientation("wall").unwrap()[(0, 3)], 1.0);
    }

    #[test]
    fn test_link_state_and_contact_force() {
        let registry = registry(2);
        let link = registry.link_state("boxer", "ee_link").unwrap();
        assert_eq!(link.shape(), (2, 13));
        assert_relative_eq!(link[(0, 2)], 0.1);
        assert_eq!(registry.contact_force("boxer", "ee_link").unwrap().shape(), (2, 3));
        assert!(matches!(
            registry.link_state("boxer", "gripper"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_set_position_touches_one_actor() {
        let mut registry = registry(2);
        let before = registry.backend().state().unwrap().root_state.clone();

        registry.set_position("goal", [5.0, 6.0, 7.0]).unwrap();

        let goal = registry.handle_of("goal").unwrap();
        assert_eq!(registry.backend().indexed_pushes(), 1);
        assert_eq!(registry.backend().last_indexed_push(), &[goal]);
        let after = &registry.backend().state().unwrap().root_state;
        assert_eq!(&after.item(1, 0).unwrap()[0..3], &[5.0, 6.0, 7.0]);
        assert_eq!(after.item(1, 1), before.item(1, 1));
        assert_eq!(after.item(1, 2), before.item(1, 2));
        assert_relative_eq!(registry.position("goal").unwrap()[(0, 1)], 6.0);
    }

    #[test]
    fn test_set_velocity_rows() {
        let mut registry = registry(2);
        let rows = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
        registry.set_velocity_rows("goal", &rows).unwrap();
        assert_relative_eq!(registry.velocity("goal").unwrap()[(1, 1)], 2.0);

        let bad = DMatrix::zeros(3, 3);
        assert!(matches!(
            registry.set_position_rows("goal", &bad),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_step_integrates_velocity() {
        let mut registry = registry(1);
        registry.set_velocity("goal", [1.0, 0.0, 0.0]).unwrap();
        registry.step().unwrap();
        assert_relative_eq!(registry.position("goal").unwrap()[(0, 0)], 2.05, epsilon = 1e-6);
        assert_relative_eq!(registry.backend().sim_time(), 0.05, epsilon = 1e-6);
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut registry = registry(2);
        registry.save_root_state().unwrap();
        let saved = registry.saved_root_state().unwrap().clone();

        registry.set_velocity("goal", [1.0, 1.0, 0.0]).unwrap();
        for _ in 0..5 {
            registry.step().unwrap();
        }
        assert_eq!(registry.visualized_link_trail().len(), 5);

        registry.restore_root_state().unwrap();
        assert_eq!(&registry.backend().state().unwrap().root_state, &saved);
        assert_eq!(registry.root_state_tensor().unwrap(), &saved);
        assert!(registry.visualized_link_trail().is_empty());
    }

    #[test]
    fn test_restore_without_save_is_noop() {
        let mut registry = registry(1);
        let pushes = registry.backend().full_root_pushes();
        registry.restore_root_state().unwrap();
        assert_eq!(registry.backend().full_root_pushes(), pushes);
    }

    #[test]
    fn test_failed_build_leaves_no_session() {
        let mut backend = backend();
        backend.fail_asset("wall");
        let mut registry = ActorRegistry::new(backend, SimConfig::headless());

        assert!(matches!(registry.build_session(scene(), 2), Err(Error::Backend(_))));
        assert!(!registry.has_session());
        assert!(!registry.backend().is_active());
        assert!(registry.descriptors().iter().all(|d| d.handle().is_none()));
        assert!(matches!(registry.position("goal"), Err(Error::Backend(_))));
        assert!(matches!(registry.step(), Err(Error::Backend(_))));

        registry.backend_mut().clear_failures();
        registry.build_session(scene(), 2).unwrap();
        assert!(registry.position("goal").is_ok());
    }

    #[test]
    fn test_config_errors_keep_session() {
        let mut registry = registry(1);
        let duplicate = vec![
            ActorDescriptor::sphere("goal", 0.1),
            ActorDescriptor::sphere("goal", 0.2),
        ];
        assert!(matches!(registry.build_session(duplicate, 1), Err(Error::Config(_))));
        assert!(registry.has_session());
        assert!(matches!(registry.build_session(scene(), 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_mixed_drive_modes_rejected() {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        let arm = ActorDescriptor::robot(
            "arm",
            RobotSpec::new("arm.urdf").with_drive_mode(DriveMode::Effort),
        );
        let err = registry.build_session(vec![boxer(), arm], 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(registry.backend().sessions_created(), 0);
    }

    #[test]
    fn test_velocity_and_position_robots_rejected() {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        let arm = ActorDescriptor::robot(
            "arm",
            RobotSpec::new("arm.urdf").with_drive_mode(DriveMode::Position),
        );
        let err = registry.build_session(vec![boxer(), arm], 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(registry.backend().sessions_created(), 0);
    }

    #[test]
    fn test_unknown_wheel_joints_rejected() {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        let robot = ActorDescriptor::robot(
            "boxer",
            RobotSpec::new("boxer.urdf").with_differential_drive(DifferentialDrive {
                wheel_radius: 0.1,
                wheel_base: 0.5,
                wheel_count: 2,
                left_wheel_joints: vec!["left".into()],
                right_wheel_joints: vec!["right".into()],
            }),
        );

        let err = registry.build_session(vec![robot], 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!registry.has_session());
        assert!(!registry.backend().is_active());
    }

    #[test]
    fn test_failed_initial_dof_write_leaves_no_session() {
        let mut backend = backend();
        backend.fail_dof_state();
        let mut registry = ActorRegistry::new(backend, SimConfig::headless());

        assert!(matches!(registry.build_session(scene(), 2), Err(Error::Backend(_))));
        assert!(!registry.has_session());
        assert!(!registry.backend().is_active());
        assert!(registry.handle_of("goal").is_err());
        assert!(registry.descriptors().iter().all(|d| d.handle().is_none()));
        assert!(matches!(registry.position("goal"), Err(Error::Backend(_))));

        registry.backend_mut().clear_failures();
        registry.build_session(scene(), 2).unwrap();
        assert!(registry.has_session());
    }

    #[test]
    fn test_rebuild_never_reuses_handles() {
        let mut registry = registry(1);
        let before = registry.handle_of("goal").unwrap();

        registry.build_session(scene(), 1).unwrap();
        let after = registry.handle_of("goal").unwrap();

        assert_eq!(before.index(), after.index());
        assert_ne!(before, after);
        assert!(after.session() > before.session());
    }

    #[test]
    fn test_init_joint_pose() {
        let arm = ActorDescriptor::robot(
            "arm",
            RobotSpec::new("arm.urdf").with_init_joint_pose(vec![0.5, -0.5]),
        );
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        registry.build_session(vec![boxer(), arm], 2).unwrap();

        let dof_state = registry.dof_state().unwrap();
        assert_eq!(dof_state.items(), 5);
        assert_eq!(dof_state.item(1, 3), Some(vec![0.5, 0.0]));
        assert_eq!(dof_state.item(1, 4), Some(vec![-0.5, 0.0]));

        let bad = ActorDescriptor::robot(
            "arm",
            RobotSpec::new("arm.urdf").with_init_joint_pose(vec![0.5]),
        );
        assert!(matches!(
            registry.build_session(vec![bad], 1),
            Err(Error::Config(_))
        ));
        assert!(!registry.has_session());
    }

    #[test]
    fn test_reset_robot_state_diff_drive() {
        let mut registry = registry(2);
        registry
            .reset_robot_state(&[1.0, 2.0, std::f32::consts::FRAC_PI_2, 0.3], &[0.5, 0.0, 0.2, 0.1])
            .unwrap();

        let position = registry.position("boxer").unwrap();
        assert_relative_eq!(position[(1, 0)], 1.0);
        assert_relative_eq!(position[(1, 1)], 2.0);
        assert_relative_eq!(position[(1, 2)], 0.1);
        let orientation = registry.orientation("boxer").unwrap();
        assert_relative_eq!(orientation[(0, 2)], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-5);
        assert_relative_eq!(registry.angular_velocity("boxer").unwrap()[(0, 2)], 0.2);

        let dof_state = registry.dof_state().unwrap();
        assert_eq!(dof_state.item(0, 0), Some(vec![0.0, 0.0]));
        assert_eq!(dof_state.item(0, 2), Some(vec![0.3, 0.1]));

        assert!(matches!(
            registry.reset_robot_state(&[1.0, 2.0], &[0.0, 0.0]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_reset_to_initial_poses() {
        let mut registry = registry(1);
        registry.set_position("goal", [9.0, 9.0, 9.0]).unwrap();
        registry.set_velocity("goal", [1.0, 0.0, 0.0]).unwrap();

        registry.reset_to_initial_poses().unwrap();
        assert_relative_eq!(registry.position("goal").unwrap()[(0, 0)], 2.0);
        assert_relative_eq!(registry.velocity("goal").unwrap()[(0, 0)], 0.0);
        assert_relative_eq!(
            registry.backend().state().unwrap().root_state.item(0, 0).unwrap()[0],
            2.0
        );
    }

    #[test]
    fn test_collision_groups() {
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        let ghost = ActorDescriptor::sphere("ghost", 0.1).without_collision();
        registry
            .build_session(vec![ActorDescriptor::sphere("goal", 0.1), ghost], 3)
            .unwrap();

        let backend = registry.backend();
        assert_eq!(backend.actor_collision_group(2, ActorHandle::new(0)), Some(2));
        assert_eq!(backend.actor_collision_group(2, ActorHandle::new(1)), Some(5));
    }

    #[test]
    fn test_actor_properties() {
        let mut boxer = boxer();
        if let ActorKind::Robot(spec) = &mut boxer.kind {
            spec.caster_links = vec!["caster".into()];
        }
        boxer.noise_percentage_mass = 0.1;
        let mut registry = ActorRegistry::new(backend(), SimConfig::headless());
        registry.build_session(vec![boxer], 1).unwrap();

        let props = registry.backend().actor_properties(0, ActorHandle::new(0)).unwrap();
        assert_eq!(props.shape_friction.len(), 3);
        assert_eq!(props.shape_friction[1], ShapeFriction::NONE);
        assert_relative_eq!(props.shape_friction[0].friction, 1.0);
        assert!((0.001..0.01).contains(&props.shape_friction[0].torsion_friction));
        assert!((0.9..=1.1).contains(&props.mass));
        assert_eq!(props.dof_drive.map(|d| d.mode), Some(DriveMode::Velocity));
    }

    #[test]
    fn test_randomisation_is_seeded() {
        let build = || {
            let mut sphere = ActorDescriptor::sphere("ball", 0.1);
            sphere.noise_percentage_mass = 0.5;
            let mut registry = ActorRegistry::new(backend(), SimConfig::headless().with_seed(7));
            registry.build_session(vec![sphere], 2).unwrap();
            registry.backend().actor_properties(1, ActorHandle::new(0)).unwrap().mass
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_viewer_setup() {
        let config = SimConfig::headless().with_viewer(true).with_interactive_goal(false);
        let mut registry = ActorRegistry::new(backend(), config);
        registry.build_session(scene(), 1).unwrap();
        assert!(registry.backend().has_viewer());
        assert!(registry.backend().key_bindings().is_empty());
    }

    #[test]
    fn test_draw_lines() {
        let mut registry = registry(2);
        registry
            .draw_lines(&[[0.0; 3], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]], 1)
            .unwrap();
        assert_eq!(registry.backend().lines().len(), 2);
        assert_eq!(registry.backend().lines()[1], [1.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        assert!(matches!(
            registry.draw_lines(&[[0.0; 3], [1.0; 3]], 5),
            Err(Error::NotFound(_))
        ));

        registry.clear_lines();
        assert!(registry.backend().lines().is_empty());
    }

    #[test]
    fn test_add_actors_rebuilds() {
        let mut registry = registry(2);
        registry.save_root_state().unwrap();
        let handles = registry
            .add_actors(vec![ActorDescriptor::sphere("extra", 0.2)])
            .unwrap();
        assert_eq!(handles.len(), 4);
        assert_eq!(registry.backend().sessions_created(), 2);
        assert!(registry.saved_root_state().is_none());
        assert_eq!(registry.handle_of("extra").unwrap().index(), 3);
        assert_eq!(registry.position("extra").unwrap().shape(), (2, 3));
        assert!(registry.add_actors(vec![ActorDescriptor::sphere("extra", 0.2)]).is_err());
    }

    #[test]
    fn test_stop() {
        let mut registry = registry(1);
        registry.stop();
        assert!(!registry.has_session());
        assert!(!registry.backend().is_active());
        assert!(registry.handle_of("goal").is_err());
        registry.stop();
    }
}

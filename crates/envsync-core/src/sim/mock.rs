//! Mock physics backend for testing
//!
//! Keeps the simulator-side state tensors in memory and integrates them with
//! a very simple model so registry code can be exercised without a GPU.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use nalgebra::DMatrix;

use super::backend::{
    ActorProperties, ActorSpawn, AssetId, EnvId, KeyBinding, PhysicsBackend, ViewerEvent,
};
use super::tensor::{cols, ROOT_STATE_WIDTH};
use super::{SimConfig, SimTensors, StateTensor, TensorLayout};
use crate::actor::{ActorDescriptor, ActorHandle, ActorKind, DriveMode};
use crate::{Error, Result};

/// Joint and link names of a robot asset known to the mock
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RobotModel {
    pub dofs: Vec<String>,
    pub links: Vec<String>,
}

impl RobotModel {
    pub fn new<D, L>(dofs: D, links: L) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            dofs: dofs.into_iter().map(Into::into).collect(),
            links: links.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct MockAsset {
    dofs: Vec<String>,
    links: Vec<String>,
    fixed: bool,
}

#[derive(Debug, Clone)]
struct MockActor {
    asset: usize,
    position: [f32; 3],
    orientation: [f32; 4],
    collision_group: u32,
    properties: Option<ActorProperties>,
    dof_offset: usize,
    body_offset: usize,
}

#[derive(Debug, Clone, Default)]
struct MockEnv {
    actors: Vec<MockActor>,
    num_dofs: usize,
    num_bodies: usize,
}

/// A mock physics backend for testing without a real simulator
#[derive(Debug, Default)]
pub struct MockBackend {
    config: SimConfig,
    robot_models: HashMap<PathBuf, RobotModel>,
    failing_assets: HashSet<String>,
    fail_dof_writes: bool,
    active: bool,
    viewer: bool,
    key_bindings: Vec<KeyBinding>,
    pending_events: Vec<ViewerEvent>,
    assets: Vec<MockAsset>,
    envs: Vec<MockEnv>,
    state: Option<SimTensors>,
    dof_modes: Vec<Option<DriveMode>>,
    velocity_targets: Option<DMatrix<f32>>,
    actuation_forces: Option<DMatrix<f32>>,
    sim_time: f64,
    sessions_created: usize,
    indexed_pushes: usize,
    last_indexed_push: Vec<ActorHandle>,
    full_root_pushes: usize,
    dof_state_pushes: usize,
    lines: Vec<[f32; 6]>,
}

impl MockBackend {
    /// Create a new mock backend with no robot models
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the joints and links behind a URDF path
    pub fn with_robot_model(mut self, urdf_file: impl Into<PathBuf>, model: RobotModel) -> Self {
        self.robot_models.insert(urdf_file.into(), model);
        self
    }

    /// Make asset creation fail for the named actor
    pub fn fail_asset(&mut self, actor_name: impl Into<String>) {
        self.failing_assets.insert(actor_name.into());
    }

    /// Make every DOF state write fail
    pub fn fail_dof_state(&mut self) {
        self.fail_dof_writes = true;
    }

    pub fn clear_failures(&mut self) {
        self.failing_assets.clear();
        self.fail_dof_writes = false;
    }

    /// Queue a viewer event for the next poll
    pub fn push_viewer_event(&mut self, event: ViewerEvent) {
        self.pending_events.push(event);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_viewer(&self) -> bool {
        self.viewer
    }

    pub fn key_bindings(&self) -> &[KeyBinding] {
        &self.key_bindings
    }

    /// Number of sessions created so far
    pub fn sessions_created(&self) -> usize {
        self.sessions_created
    }

    /// Simulator-side tensors
    pub fn state(&self) -> Option<&SimTensors> {
        self.state.as_ref()
    }

    pub fn velocity_targets(&self) -> Option<&DMatrix<f32>> {
        self.velocity_targets.as_ref()
    }

    pub fn actuation_forces(&self) -> Option<&DMatrix<f32>> {
        self.actuation_forces.as_ref()
    }

    /// Number of indexed root-state writes
    pub fn indexed_pushes(&self) -> usize {
        self.indexed_pushes
    }

    /// Actors of the most recent indexed root-state write
    pub fn last_indexed_push(&self) -> &[ActorHandle] {
        &self.last_indexed_push
    }

    pub fn full_root_pushes(&self) -> usize {
        self.full_root_pushes
    }

    pub fn dof_state_pushes(&self) -> usize {
        self.dof_state_pushes
    }

    pub fn actor_properties(&self, env: usize, actor: ActorHandle) -> Option<&ActorProperties> {
        self.envs
            .get(env)?
            .actors
            .get(actor.index())?
            .properties
            .as_ref()
    }

    pub fn actor_collision_group(&self, env: usize, actor: ActorHandle) -> Option<u32> {
        Some(self.envs.get(env)?.actors.get(actor.index())?.collision_group)
    }

    pub fn lines(&self) -> &[[f32; 6]] {
        &self.lines
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn require_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::Backend("mock session not created".into()))
        }
    }

    fn actor(&self, env: EnvId, actor: ActorHandle) -> Result<&MockActor> {
        self.envs
            .get(env.0 as usize)
            .and_then(|e| e.actors.get(actor.index()))
            .ok_or_else(|| Error::Backend(format!("unknown actor {actor} in env {}", env.0)))
    }

    fn state_mut(&mut self) -> Result<&mut SimTensors> {
        self.state
            .as_mut()
            .ok_or_else(|| Error::Backend("mock session not prepared".into()))
    }

    fn check_dof_matrix(&self, m: &DMatrix<f32>, what: &'static str) -> Result<()> {
        let layout = self.state.as_ref().map(SimTensors::layout).unwrap_or_default();
        let num_envs = self.envs.len();
        if m.nrows() != num_envs {
            return Err(Error::DimensionMismatch {
                what,
                expected: num_envs,
                actual: m.nrows(),
            });
        }
        if m.ncols() != layout.dofs {
            return Err(Error::DimensionMismatch {
                what,
                expected: layout.dofs,
                actual: m.ncols(),
            });
        }
        Ok(())
    }

    /// Copy each actor's root pose onto all of its rigid bodies
    fn sync_bodies(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        for (e, env) in self.envs.iter().enumerate() {
            for (a, actor) in env.actors.iter().enumerate() {
                let Some(root) = state.root_state.item(e, a) else {
                    continue;
                };
                let bodies = self.assets[actor.asset].links.len();
                let rb = state.rigid_body_state.as_matrix_mut();
                for b in 0..bodies {
                    let start = (actor.body_offset + b) * ROOT_STATE_WIDTH;
                    for (c, v) in root.iter().enumerate() {
                        rb[(e, start + c)] = *v;
                    }
                }
            }
        }
    }
}

fn check_same_shape(expected: &StateTensor, actual: &StateTensor, what: &'static str) -> Result<()> {
    if expected.as_matrix().shape() != actual.as_matrix().shape() {
        return Err(Error::DimensionMismatch {
            what,
            expected: expected.as_matrix().ncols(),
            actual: actual.as_matrix().ncols(),
        });
    }
    Ok(())
}

impl PhysicsBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_session(&mut self, config: &SimConfig) -> Result<()> {
        if self.active {
            return Err(Error::Backend("mock session already active".into()));
        }
        self.config = config.clone();
        self.active = true;
        self.sim_time = 0.0;
        self.sessions_created += 1;
        Ok(())
    }

    fn destroy_session(&mut self) {
        self.active = false;
        self.viewer = false;
        self.key_bindings.clear();
        self.pending_events.clear();
        self.assets.clear();
        self.envs.clear();
        self.state = None;
        self.dof_modes.clear();
        self.velocity_targets = None;
        self.actuation_forces = None;
        self.lines.clear();
    }

    fn create_viewer(&mut self) -> Result<()> {
        self.require_active()?;
        self.viewer = true;
        Ok(())
    }

    fn subscribe_viewer_keys(&mut self, bindings: &[KeyBinding]) -> Result<()> {
        if !self.viewer {
            return Err(Error::Backend("no viewer to subscribe to".into()));
        }
        self.key_bindings.extend_from_slice(bindings);
        Ok(())
    }

    fn poll_viewer_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn create_asset(&mut self, descriptor: &ActorDescriptor) -> Result<AssetId> {
        self.require_active()?;
        if self.failing_assets.contains(&descriptor.name) {
            return Err(Error::Backend(format!(
                "failed to load asset for {}",
                descriptor.name
            )));
        }
        let (dofs, links) = match &descriptor.kind {
            ActorKind::Robot(spec) => {
                let model = self.robot_models.get(&spec.urdf_file).ok_or_else(|| {
                    Error::Backend(format!("asset not found: {}", spec.urdf_file.display()))
                })?;
                (model.dofs.clone(), model.links.clone())
            }
            _ => (Vec::new(), vec!["base".to_string()]),
        };
        self.assets.push(MockAsset {
            dofs,
            links,
            fixed: descriptor.fixed,
        });
        Ok(AssetId(self.assets.len() as u32 - 1))
    }

    fn create_env(&mut self, _index: usize, _spacing: f32, _envs_per_row: usize) -> Result<EnvId> {
        self.require_active()?;
        if self.state.is_some() {
            return Err(Error::Backend("mock session already prepared".into()));
        }
        self.envs.push(MockEnv::default());
        Ok(EnvId(self.envs.len() as u32 - 1))
    }

    fn create_actor(
        &mut self,
        env: EnvId,
        asset: AssetId,
        spawn: &ActorSpawn<'_>,
    ) -> Result<ActorHandle> {
        self.require_active()?;
        let mock_asset = self
            .assets
            .get(asset.0 as usize)
            .ok_or_else(|| Error::Backend(format!("unknown asset {}", asset.0)))?;
        let (dofs, bodies) = (mock_asset.dofs.len(), mock_asset.links.len());
        let mock_env = self
            .envs
            .get_mut(env.0 as usize)
            .ok_or_else(|| Error::Backend(format!("unknown env {}", env.0)))?;

        mock_env.actors.push(MockActor {
            asset: asset.0 as usize,
            position: spawn.position,
            orientation: spawn.orientation,
            collision_group: spawn.collision_group,
            properties: None,
            dof_offset: mock_env.num_dofs,
            body_offset: mock_env.num_bodies,
        });
        mock_env.num_dofs += dofs;
        mock_env.num_bodies += bodies;
        Ok(ActorHandle::new(mock_env.actors.len() as u32 - 1))
    }

    fn actor_shapes(&self, env: EnvId, actor: ActorHandle) -> Result<Vec<String>> {
        let actor = self.actor(env, actor)?;
        Ok(self.assets[actor.asset].links.clone())
    }

    fn configure_actor(
        &mut self,
        env: EnvId,
        actor: ActorHandle,
        properties: &ActorProperties,
    ) -> Result<()> {
        let shapes = self.actor_shapes(env, actor)?.len();
        if properties.shape_friction.len() != shapes {
            return Err(Error::DimensionMismatch {
                what: "shape friction",
                expected: shapes,
                actual: properties.shape_friction.len(),
            });
        }
        self.envs[env.0 as usize].actors[actor.index()].properties = Some(properties.clone());
        Ok(())
    }

    fn actor_dof_names(&self, env: EnvId, actor: ActorHandle) -> Result<Vec<String>> {
        let actor = self.actor(env, actor)?;
        Ok(self.assets[actor.asset].dofs.clone())
    }

    fn find_actor_rigid_body_index(
        &self,
        env: EnvId,
        actor: ActorHandle,
        link: &str,
    ) -> Option<usize> {
        let actor = self.actor(env, actor).ok()?;
        let local = self.assets[actor.asset].links.iter().position(|l| l == link)?;
        Some(actor.body_offset + local)
    }

    fn prepare(&mut self) -> Result<TensorLayout> {
        self.require_active()?;
        let first = self
            .envs
            .first()
            .ok_or_else(|| Error::Backend("no environments created".into()))?;
        let layout = TensorLayout {
            actors: first.actors.len(),
            dofs: first.num_dofs,
            rigid_bodies: first.num_bodies,
        };
        if self.envs.iter().any(|e| e.actors.len() != layout.actors) {
            return Err(Error::Backend("environments differ in actor count".into()));
        }

        let mut state = SimTensors::zeros(self.envs.len(), layout);
        for (e, env) in self.envs.iter().enumerate() {
            for (a, actor) in env.actors.iter().enumerate() {
                let mut row = [0.0f32; ROOT_STATE_WIDTH];
                row[cols::POSITION].copy_from_slice(&actor.position);
                row[cols::ORIENTATION].copy_from_slice(&actor.orientation);
                let rs = state.root_state.as_matrix_mut();
                for (c, v) in row.iter().enumerate() {
                    rs[(e, a * ROOT_STATE_WIDTH + c)] = *v;
                }
            }
        }

        self.dof_modes = vec![None; layout.dofs];
        for actor in &first.actors {
            let mode = actor
                .properties
                .as_ref()
                .and_then(|p| p.dof_drive)
                .map(|d| d.mode);
            let count = self.assets[actor.asset].dofs.len();
            for slot in &mut self.dof_modes[actor.dof_offset..actor.dof_offset + count] {
                *slot = mode;
            }
        }

        self.state = Some(state);
        self.sync_bodies();
        tracing::debug!(
            "mock prepared: {} envs, {} actors, {} dofs",
            self.envs.len(),
            layout.actors,
            layout.dofs
        );
        Ok(layout)
    }

    fn acquire_state_tensors(&self) -> Result<SimTensors> {
        self.state
            .clone()
            .ok_or_else(|| Error::Backend("mock session not prepared".into()))
    }

    fn refresh_state_tensors(&self, tensors: &mut SimTensors) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::Backend("mock session not prepared".into()))?;
        if tensors.layout() != state.layout() || tensors.num_envs() != state.num_envs() {
            return Err(Error::DimensionMismatch {
                what: "state tensors",
                expected: state.layout().actors,
                actual: tensors.layout().actors,
            });
        }
        tensors.clone_from(state);
        Ok(())
    }

    fn simulate(&mut self) -> Result<()> {
        let dt = self.config.dt;
        let fixed: Vec<Vec<bool>> = self
            .envs
            .iter()
            .map(|env| env.actors.iter().map(|a| self.assets[a.asset].fixed).collect())
            .collect();
        let dof_modes = self.dof_modes.clone();
        let velocity_targets = self.velocity_targets.clone();
        let actuation_forces = self.actuation_forces.clone();

        let state = self.state_mut()?;
        let num_envs = state.num_envs();
        let layout = state.layout();

        let rs = state.root_state.as_matrix_mut();
        for e in 0..num_envs {
            for a in 0..layout.actors {
                if fixed[e][a] {
                    continue;
                }
                let base = a * ROOT_STATE_WIDTH;
                for k in 0..3 {
                    let vel = rs[(e, base + cols::LINEAR_VELOCITY.start + k)];
                    rs[(e, base + k)] += vel * dt;
                }
            }
        }

        let ds = state.dof_state.as_matrix_mut();
        for e in 0..num_envs {
            for (d, mode) in dof_modes.iter().enumerate() {
                let (pos, vel) = (2 * d, 2 * d + 1);
                match mode {
                    Some(DriveMode::Velocity) => {
                        if let Some(t) = &velocity_targets {
                            ds[(e, vel)] = t[(e, d)];
                        }
                    }
                    Some(DriveMode::Effort) => {
                        if let Some(f) = &actuation_forces {
                            ds[(e, vel)] += f[(e, d)] * dt;
                        }
                    }
                    Some(DriveMode::Position) | None => {}
                }
                let v = ds[(e, vel)];
                ds[(e, pos)] += v * dt;
            }
        }

        self.sync_bodies();
        self.sim_time += dt as f64;
        Ok(())
    }

    fn set_actor_root_state(&mut self, root_state: &StateTensor) -> Result<()> {
        let state = self.state_mut()?;
        check_same_shape(&state.root_state, root_state, "root state")?;
        state.root_state.clone_from(root_state);
        self.full_root_pushes += 1;
        self.sync_bodies();
        Ok(())
    }

    fn set_actor_root_state_indexed(
        &mut self,
        root_state: &StateTensor,
        actors: &[ActorHandle],
    ) -> Result<()> {
        let state = self.state_mut()?;
        check_same_shape(&state.root_state, root_state, "root state")?;
        for actor in actors {
            state.root_state.copy_item_from(root_state, actor.index())?;
        }
        self.indexed_pushes += 1;
        self.last_indexed_push.clear();
        self.last_indexed_push.extend_from_slice(actors);
        self.sync_bodies();
        Ok(())
    }

    fn set_dof_state(&mut self, dof_state: &StateTensor) -> Result<()> {
        if self.fail_dof_writes {
            return Err(Error::Backend("dof state write rejected".into()));
        }
        let state = self.state_mut()?;
        check_same_shape(&state.dof_state, dof_state, "dof state")?;
        state.dof_state.clone_from(dof_state);
        self.dof_state_pushes += 1;
        Ok(())
    }

    fn set_dof_velocity_targets(&mut self, targets: &DMatrix<f32>) -> Result<()> {
        self.check_dof_matrix(targets, "velocity targets")?;
        self.velocity_targets = Some(targets.clone());
        Ok(())
    }

    fn set_dof_actuation_forces(&mut self, forces: &DMatrix<f32>) -> Result<()> {
        self.check_dof_matrix(forces, "actuation forces")?;
        self.actuation_forces = Some(forces.clone());
        Ok(())
    }

    fn add_lines(&mut self, _env: EnvId, segments: &[[f32; 6]], colors: &[[f32; 3]]) -> Result<()> {
        if segments.len() != colors.len() {
            return Err(Error::DimensionMismatch {
                what: "line colors",
                expected: segments.len(),
                actual: colors.len(),
            });
        }
        self.lines.extend_from_slice(segments);
        Ok(())
    }

    fn clear_lines(&mut self) {
        self.lines.clear();
    }
}

//! Physics backend trait
//!
//! The registry treats the simulator as an opaque capability surface: any
//! engine that can create assets and actors, expose flat per-environment
//! state tensors and accept indexed root-state writes can sit behind
//! [`PhysicsBackend`].

use nalgebra::DMatrix;

use super::{SimConfig, SimTensors, StateTensor, TensorLayout};
use crate::actor::{ActorDescriptor, ActorHandle, DriveGains, DriveMode};
use crate::Result;

/// Backend identifier of one environment replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub u32);

/// Backend identifier of a loaded asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(pub u32);

/// Placement of a new actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorSpawn<'a> {
    pub name: &'a str,
    pub position: [f32; 3],
    /// (x, y, z, w)
    pub orientation: [f32; 4],
    /// Actors only collide within the same group
    pub collision_group: u32,
}

/// Friction of one collision shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeFriction {
    pub friction: f32,
    pub torsion_friction: f32,
    pub rolling_friction: f32,
}

impl ShapeFriction {
    /// Frictionless shape, used for caster wheels
    pub const NONE: ShapeFriction = ShapeFriction {
        friction: 0.0,
        torsion_friction: 0.0,
        rolling_friction: 0.0,
    };
}

/// Drive configuration written to every DOF of a robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofDrive {
    pub mode: DriveMode,
    pub gains: DriveGains,
}

/// Per-instance properties applied right after actor creation
#[derive(Debug, Clone, PartialEq)]
pub struct ActorProperties {
    pub color: [f32; 3],
    /// Mass of the base rigid body
    pub mass: f32,
    /// One entry per collision shape, in backend shape order
    pub shape_friction: Vec<ShapeFriction>,
    /// Robots only
    pub dof_drive: Option<DofDrive>,
}

/// Viewer keys the registry subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A,
    S,
    D,
    W,
    E,
    Q,
}

/// Goal-nudge action raised by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerEvent {
    Up,
    Down,
    Left,
    Right,
    High,
    Low,
}

/// A key subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub key: Key,
    pub event: ViewerEvent,
}

/// Key layout for moving the goal actor
pub const GOAL_KEY_BINDINGS: [KeyBinding; 6] = [
    KeyBinding { key: Key::A, event: ViewerEvent::Left },
    KeyBinding { key: Key::S, event: ViewerEvent::Down },
    KeyBinding { key: Key::D, event: ViewerEvent::Right },
    KeyBinding { key: Key::W, event: ViewerEvent::Up },
    KeyBinding { key: Key::E, event: ViewerEvent::High },
    KeyBinding { key: Key::Q, event: ViewerEvent::Low },
];

/// Trait for vectorized physics backends
///
/// Indices returned by [`find_actor_rigid_body_index`](Self::find_actor_rigid_body_index)
/// are in the environment domain, i.e. rows of the rigid-body tensors.
/// DOF names are returned in the actor's DOF order.
pub trait PhysicsBackend {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Create the simulation and ground plane
    fn create_session(&mut self, config: &SimConfig) -> Result<()>;

    /// Destroy the viewer, every environment and the simulation
    fn destroy_session(&mut self);

    /// Open a viewer window
    fn create_viewer(&mut self) -> Result<()>;

    /// Subscribe viewer keys to events
    fn subscribe_viewer_keys(&mut self, bindings: &[KeyBinding]) -> Result<()>;

    /// Drain pending viewer events
    fn poll_viewer_events(&mut self) -> Vec<ViewerEvent>;

    /// Load or build the asset for a descriptor
    fn create_asset(&mut self, descriptor: &ActorDescriptor) -> Result<AssetId>;

    /// Create one environment replica on a grid
    fn create_env(&mut self, index: usize, spacing: f32, envs_per_row: usize) -> Result<EnvId>;

    /// Instantiate an asset in an environment
    fn create_actor(
        &mut self,
        env: EnvId,
        asset: AssetId,
        spawn: &ActorSpawn<'_>,
    ) -> Result<ActorHandle>;

    /// Owning rigid-body name of each collision shape of an actor
    fn actor_shapes(&self, env: EnvId, actor: ActorHandle) -> Result<Vec<String>>;

    /// Apply color, mass, friction and drive properties
    fn configure_actor(
        &mut self,
        env: EnvId,
        actor: ActorHandle,
        properties: &ActorProperties,
    ) -> Result<()>;

    /// DOF names of an actor
    fn actor_dof_names(&self, env: EnvId, actor: ActorHandle) -> Result<Vec<String>>;

    /// Rigid-body row of an actor's link
    fn find_actor_rigid_body_index(&self, env: EnvId, actor: ActorHandle, link: &str)
        -> Option<usize>;

    /// Finalize the session; tensor sizes are fixed from here on
    fn prepare(&mut self) -> Result<TensorLayout>;

    /// Root, DOF, rigid-body and contact-force tensors of the prepared session
    fn acquire_state_tensors(&self) -> Result<SimTensors>;

    /// Copy the current simulator state into `tensors`
    fn refresh_state_tensors(&self, tensors: &mut SimTensors) -> Result<()>;

    /// Advance the simulation by one timestep
    fn simulate(&mut self) -> Result<()>;

    /// Wait for the step to complete
    fn fetch_results(&mut self) -> Result<()> {
        Ok(())
    }

    /// Draw a frame (if a viewer exists)
    fn render(&mut self) -> Result<()> {
        Ok(())
    }

    /// Overwrite the whole root-state tensor
    fn set_actor_root_state(&mut self, root_state: &StateTensor) -> Result<()>;

    /// Overwrite only the rows of `actors`
    fn set_actor_root_state_indexed(
        &mut self,
        root_state: &StateTensor,
        actors: &[ActorHandle],
    ) -> Result<()>;

    /// Overwrite the DOF state tensor
    fn set_dof_state(&mut self, dof_state: &StateTensor) -> Result<()>;

    /// Set velocity targets, `num_envs × num_dofs`
    fn set_dof_velocity_targets(&mut self, targets: &DMatrix<f32>) -> Result<()>;

    /// Set actuation forces, `num_envs × num_dofs`
    fn set_dof_actuation_forces(&mut self, forces: &DMatrix<f32>) -> Result<()>;

    /// Draw line segments `[x0, y0, z0, x1, y1, z1]` in an environment
    fn add_lines(&mut self, _env: EnvId, _segments: &[[f32; 6]], _colors: &[[f32; 3]]) -> Result<()> {
        // Default: headless backends draw nothing
        Ok(())
    }

    /// Remove all debug lines
    fn clear_lines(&mut self) {}
}

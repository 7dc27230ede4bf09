//! Simulation backend abstraction
//!
//! This module provides the trait the registry drives, the session
//! configuration, the per-environment state tensors and an in-memory mock
//! backend.
//!
//! # Backends
//!
//! - **GPU simulators** (Isaac Gym style tensor APIs): implement [`PhysicsBackend`]
//! - **Mock**: [`MockBackend`], for testing without a simulator

mod backend;
mod config;
mod mock;
pub mod tensor;

pub use backend::{
    ActorProperties, ActorSpawn, AssetId, DofDrive, EnvId, Key, KeyBinding, PhysicsBackend,
    ShapeFriction, ViewerEvent, GOAL_KEY_BINDINGS,
};
pub use config::{PhysxConfig, SimConfig};
pub use mock::{MockBackend, RobotModel};
pub use tensor::{SimTensors, StateTensor, TensorLayout};

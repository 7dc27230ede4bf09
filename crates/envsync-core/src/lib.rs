//! envsync-core: actor/state registry for vectorized physics simulators
//!
//! Maps a heterogeneous set of simulated bodies (robots, spheres, boxes,
//! axis markers) onto the flat per-environment state tensors exposed by a
//! GPU physics backend, and keeps handle/index bookkeeping consistent across
//! session rebuilds.
//!
//! # Modules
//!
//! - [`actor`] - Actor descriptors, drive modes, differential drive, gripper policy
//! - [`sim`] - Backend trait, session configuration, state tensors, mock backend
//! - [`registry`] - The registry: session build, accessors, commands, obstacles
//! - [`math`] - Quaternion helper for planar root poses
//!
//! # Architecture
//!
//! ```text
//! planner process                      envsync-core
//! ┌──────────────┐                    ┌──────────────────┐      ┌─────────────────┐
//! │  MPPI / RPC  │───command tensor──►│  ActorRegistry   │─────►│ PhysicsBackend  │
//! │              │◄──root/dof state───│  (handles, DOFs) │◄─────│ (GPU simulator) │
//! └──────────────┘                    └──────────────────┘      └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use envsync_core::{ActorRegistry, ActorDescriptor, SimConfig};
//! use envsync_core::sim::MockBackend;
//!
//! let actors = vec![ActorDescriptor::sphere("goal", 0.05)];
//! let mut registry = ActorRegistry::new(MockBackend::new(), SimConfig::default());
//! registry.build_session(actors, 4)?;
//! registry.step()?;
//! let goal = registry.position("goal")?;
//! ```

#![warn(unused_must_use)]

pub mod actor;
pub mod math;
pub mod registry;
pub mod sim;

// Re-exports for convenience
pub use actor::{
    ActorDescriptor, ActorHandle, ActorKind, DifferentialDrive, DriveMode, GripperPolicy,
    RobotSpec,
};
pub use math::Quaternion;
pub use registry::{ActorRef, ActorRegistry, ObstacleObservation};
pub use sim::{PhysicsBackend, SimConfig, StateTensor, ViewerEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for envsync-core
///
/// Configuration and dimension errors are raised eagerly, before any backend
/// call is made, so the caller can fix its inputs and resubmit. Nothing in
/// this crate retries.
///
/// # Example
/// ```ignore
/// match registry.apply_robot_command(&u) {
///     Ok(()) => {}
///     Err(Error::DimensionMismatch { expected, actual, .. }) => {
///         eprintln!("planner sent {actual} columns, expected {expected}");
///     }
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// Malformed descriptor, duplicate actor name or mixed drive modes.
    /// Handle by: fixing the actor configuration and rebuilding the session.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Name, robot index, actor index or link lookup miss.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Asset/actor creation failed or no session is active.
    /// Handle by: calling `build_session` again once the cause is fixed.
    #[error("Backend failure: {0}")]
    Backend(String),

    /// A tensor argument has the wrong shape.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A configuration file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

/// Result type alias for envsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

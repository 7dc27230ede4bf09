//! Actor descriptors and configuration loading
//!
//! Descriptors are static configuration: they are built once (in code or
//! from TOML files) and only gain a [`ActorHandle`] when a session
//! registers them.

mod descriptor;
mod loader;

pub use descriptor::{
    ActorDescriptor, ActorKind, DifferentialDrive, DriveGains, DriveMode, GripperPolicy,
    RobotSpec, WheelSide, RESERVED_GRIPPER_NAME,
};
pub use loader::{apply_initial_positions, load_actor_descriptors};

use serde::{Deserialize, Serialize};

/// Row of an actor in the per-env tensors, tagged with the session that assigned it
///
/// Backends hand out untagged handles (session 0). The registry stamps each
/// one with its build generation, so a handle from an earlier session never
/// compares equal to one from the current session even when the row matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorHandle {
    index: u32,
    session: u32,
}

impl ActorHandle {
    /// Untagged handle for tensor row `index`
    pub const fn new(index: u32) -> Self {
        Self { index, session: 0 }
    }

    pub(crate) const fn in_session(self, session: u32) -> Self {
        Self {
            index: self.index,
            session,
        }
    }

    /// Row index into per-env actor tensors
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Registry session that assigned this handle, 0 if untagged
    pub const fn session(self) -> u32 {
        self.session
    }
}

impl std::fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)?;
        if self.session > 0 {
            write!(f, "@{}", self.session)?;
        }
        Ok(())
    }
}

//! Actor descriptors
//!
//! One [`ActorDescriptor`] per simulated body. Kind-specific parameters live
//! in the [`ActorKind`] variant so a sphere never carries wheel geometry and
//! a robot never carries a radius.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ActorHandle;
use crate::{Error, Result};

/// Robot name that receives the default [`GripperPolicy`] when it declares none.
pub const RESERVED_GRIPPER_NAME: &str = "panda_gripper";

const fn default_orientation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
const fn default_mass() -> f32 {
    1.0
}
const fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}
const fn default_friction() -> f32 {
    1.0
}
const fn default_true() -> bool {
    true
}

/// How robot joints are actuated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Commands are joint efforts (forces/torques)
    Effort,
    /// Commands are joint velocity targets
    #[default]
    Velocity,
    /// Commands are joint positions
    Position,
}

/// PD gains written to every DOF of a robot at creation time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGains {
    pub stiffness: f32,
    pub damping: f32,
    /// Only overridden in effort mode
    pub armature: Option<f32>,
}

impl DriveMode {
    /// Gains used for this drive mode
    pub fn gains(self) -> DriveGains {
        match self {
            DriveMode::Effort => DriveGains {
                stiffness: 0.0,
                damping: 10.0,
                armature: Some(0.0),
            },
            DriveMode::Velocity => DriveGains {
                stiffness: 0.0,
                damping: 600.0,
                armature: None,
            },
            DriveMode::Position => DriveGains {
                stiffness: 80.0,
                damping: 0.0,
                armature: None,
            },
        }
    }
}

impl std::fmt::Display for DriveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Effort => write!(f, "effort"),
            Self::Velocity => write!(f, "velocity"),
            Self::Position => write!(f, "position"),
        }
    }
}

/// Which wheel group a joint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelSide {
    Left,
    Right,
}

/// Differential-drive base parameters
///
/// Upstream commands for such a base are `(v, ω)` pairs; the wheel joints
/// never receive raw per-wheel commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialDrive {
    /// Wheel radius `r` in meters
    pub wheel_radius: f32,
    /// Distance between left and right wheels `L` in meters
    pub wheel_base: f32,
    /// Total number of wheel joints
    pub wheel_count: usize,
    pub left_wheel_joints: Vec<String>,
    pub right_wheel_joints: Vec<String>,
}

impl DifferentialDrive {
    /// Wheel angular velocities for a body linear velocity and yaw rate
    ///
    /// `ω_left = v/r − L·ω/(2r)`, `ω_right = v/r + L·ω/(2r)`
    #[inline]
    pub fn wheel_speeds(&self, v: f32, yaw_rate: f32) -> (f32, f32) {
        let r = self.wheel_radius;
        let turn = (self.wheel_base * yaw_rate) / (2.0 * r);
        (v / r - turn, v / r + turn)
    }

    /// Wheel group of a joint, if it is a wheel
    pub fn wheel_side(&self, joint: &str) -> Option<WheelSide> {
        if self.left_wheel_joints.iter().any(|j| j == joint) {
            Some(WheelSide::Left)
        } else if self.right_wheel_joints.iter().any(|j| j == joint) {
            Some(WheelSide::Right)
        } else {
            None
        }
    }

    fn validate(&self, actor: &str) -> Result<()> {
        if !(self.wheel_radius.is_finite() && self.wheel_radius > 0.0) {
            return Err(Error::Config(format!(
                "{actor}: wheel_radius must be positive, got {}",
                self.wheel_radius
            )));
        }
        if !(self.wheel_base.is_finite() && self.wheel_base > 0.0) {
            return Err(Error::Config(format!(
                "{actor}: wheel_base must be positive, got {}",
                self.wheel_base
            )));
        }
        if self.left_wheel_joints.is_empty() || self.right_wheel_joints.is_empty() {
            return Err(Error::Config(format!(
                "{actor}: differential drive needs left and right wheel joints"
            )));
        }
        let named = self.left_wheel_joints.len() + self.right_wheel_joints.len();
        if self.wheel_count < named {
            return Err(Error::Config(format!(
                "{actor}: wheel_count {} is smaller than the {named} named wheel joints",
                self.wheel_count
            )));
        }
        Ok(())
    }
}

/// Threshold policy for a two-finger gripper
///
/// Overrides the last two DOF targets of the robot that carries it: when the
/// robot's last DOF command is above `threshold` both fingers get `close`,
/// otherwise both get `open`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperPolicy {
    pub threshold: f32,
    pub close: f32,
    pub open: f32,
}

impl Default for GripperPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            close: 0.1,
            open: -0.1,
        }
    }
}

impl GripperPolicy {
    /// Finger target for a raw command
    #[inline]
    pub fn target(&self, command: f32) -> f32 {
        if command > self.threshold {
            self.close
        } else {
            self.open
        }
    }
}

/// Robot-only parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotSpec {
    /// URDF asset path, resolved by the backend
    pub urdf_file: PathBuf,
    #[serde(default)]
    pub drive_mode: DriveMode,
    #[serde(default)]
    pub differential_drive: Option<DifferentialDrive>,
    /// Initial joint positions, one per DOF
    #[serde(default)]
    pub init_joint_pose: Option<Vec<f32>>,
    /// Links whose shapes are made frictionless
    #[serde(default)]
    pub caster_links: Vec<String>,
    /// Link whose position is recorded every step
    #[serde(default)]
    pub visualize_link: Option<String>,
    #[serde(default)]
    pub gripper: Option<GripperPolicy>,
    #[serde(default)]
    pub flip_visual: bool,
}

impl RobotSpec {
    /// Create a robot spec for a URDF asset
    pub fn new(urdf_file: impl Into<PathBuf>) -> Self {
        Self {
            urdf_file: urdf_file.into(),
            ..Default::default()
        }
    }

    /// Set the drive mode
    pub fn with_drive_mode(mut self, drive_mode: DriveMode) -> Self {
        self.drive_mode = drive_mode;
        self
    }

    /// Make this a differential-drive base
    pub fn with_differential_drive(mut self, drive: DifferentialDrive) -> Self {
        self.differential_drive = Some(drive);
        self
    }

    /// Set initial joint positions
    pub fn with_init_joint_pose(mut self, pose: Vec<f32>) -> Self {
        self.init_joint_pose = Some(pose);
        self
    }

    /// Attach a gripper policy
    pub fn with_gripper(mut self, policy: GripperPolicy) -> Self {
        self.gripper = Some(policy);
        self
    }

    /// Record this link's position every step
    pub fn with_visualize_link(mut self, link: impl Into<String>) -> Self {
        self.visualize_link = Some(link.into());
        self
    }
}

/// Kind of simulated body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorKind {
    /// Coordinate-frame marker
    Axis { size: [f32; 3] },
    /// Articulated robot loaded from URDF
    Robot(RobotSpec),
    Sphere { radius: f32 },
    Box { size: [f32; 3] },
}

impl ActorKind {
    /// Short kind name for logs
    pub fn label(&self) -> &'static str {
        match self {
            ActorKind::Axis { .. } => "axis",
            ActorKind::Robot(_) => "robot",
            ActorKind::Sphere { .. } => "sphere",
            ActorKind::Box { .. } => "box",
        }
    }

    /// Collision geometry size as a flat list (`[radius]` for spheres)
    pub fn size(&self) -> Vec<f32> {
        match self {
            ActorKind::Axis { size } | ActorKind::Box { size } => size.to_vec(),
            ActorKind::Sphere { radius } => vec![*radius],
            ActorKind::Robot(_) => Vec::new(),
        }
    }

    /// Replace the collision geometry size
    pub fn resize(&mut self, new_size: &[f32]) -> Result<()> {
        match self {
            ActorKind::Sphere { radius } => match new_size {
                [r] => *radius = *r,
                _ => {
                    return Err(Error::DimensionMismatch {
                        what: "sphere size",
                        expected: 1,
                        actual: new_size.len(),
                    })
                }
            },
            ActorKind::Axis { size } | ActorKind::Box { size } => {
                *size = new_size.try_into().map_err(|_| Error::DimensionMismatch {
                    what: "box size",
                    expected: 3,
                    actual: new_size.len(),
                })?;
            }
            ActorKind::Robot(_) => {
                return Err(Error::Config("robots cannot be resized".into()));
            }
        }
        Ok(())
    }

    /// Robot parameters, if this is a robot
    pub fn as_robot(&self) -> Option<&RobotSpec> {
        match self {
            ActorKind::Robot(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn is_robot(&self) -> bool {
        matches!(self, ActorKind::Robot(_))
    }

    /// Spheres and boxes count as obstacles
    pub fn is_obstacle(&self) -> bool {
        matches!(self, ActorKind::Sphere { .. } | ActorKind::Box { .. })
    }
}

/// Static configuration record for one simulated body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: ActorKind,
    #[serde(default)]
    pub init_pos: [f32; 3],
    /// Initial orientation as (x, y, z, w)
    #[serde(default = "default_orientation")]
    pub init_ori: [f32; 4],
    #[serde(default = "default_mass")]
    pub mass: f32,
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default = "default_true")]
    pub collision: bool,
    #[serde(default = "default_true")]
    pub gravity: bool,
    /// Per-env uniform jitter bound on box/sphere dimensions
    #[serde(default)]
    pub noise_sigma_size: Option<[f32; 3]>,
    /// Uniform mass noise as a fraction of `mass`
    #[serde(default)]
    pub noise_percentage_mass: f32,
    /// Uniform friction noise as a fraction of `friction`
    #[serde(default)]
    pub noise_percentage_friction: f32,
    #[serde(skip)]
    pub(crate) handle: Option<ActorHandle>,
}

impl ActorDescriptor {
    /// Create a descriptor with default physical parameters
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            init_pos: [0.0; 3],
            init_ori: default_orientation(),
            mass: default_mass(),
            color: default_color(),
            friction: default_friction(),
            fixed: false,
            collision: true,
            gravity: true,
            noise_sigma_size: None,
            noise_percentage_mass: 0.0,
            noise_percentage_friction: 0.0,
            handle: None,
        }
    }

    pub fn sphere(name: impl Into<String>, radius: f32) -> Self {
        Self::new(name, ActorKind::Sphere { radius })
    }

    pub fn cuboid(name: impl Into<String>, size: [f32; 3]) -> Self {
        Self::new(name, ActorKind::Box { size })
    }

    pub fn axis(name: impl Into<String>, size: [f32; 3]) -> Self {
        Self::new(name, ActorKind::Axis { size })
    }

    pub fn robot(name: impl Into<String>, spec: RobotSpec) -> Self {
        Self::new(name, ActorKind::Robot(spec))
    }

    /// Set the initial position
    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.init_pos = position;
        self
    }

    /// Set the initial orientation (x, y, z, w)
    pub fn with_orientation(mut self, orientation: [f32; 4]) -> Self {
        self.init_ori = orientation;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Pin the base in place
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Put the actor in its own collision group
    pub fn without_collision(mut self) -> Self {
        self.collision = false;
        self
    }

    /// Handle assigned by the current session, `None` before registration
    pub fn handle(&self) -> Option<ActorHandle> {
        self.handle
    }

    pub fn is_robot(&self) -> bool {
        self.kind.is_robot()
    }

    /// Robot drive mode, `None` for non-robots
    pub fn drive_mode(&self) -> Option<DriveMode> {
        self.kind.as_robot().map(|spec| spec.drive_mode)
    }

    /// Check every field for consistency
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("actor name must not be empty".into()));
        }
        let name = &self.name;

        let finite = self
            .init_pos
            .iter()
            .chain(self.init_ori.iter())
            .chain(self.color.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::Config(format!("{name}: non-finite pose or color")));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(Error::Config(format!(
                "{name}: mass must be positive, got {}",
                self.mass
            )));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(Error::Config(format!(
                "{name}: friction must be non-negative, got {}",
                self.friction
            )));
        }
        for (label, pct) in [
            ("noise_percentage_mass", self.noise_percentage_mass),
            ("noise_percentage_friction", self.noise_percentage_friction),
        ] {
            if !(0.0..=1.0).contains(&pct) {
                return Err(Error::Config(format!(
                    "{name}: {label} must be in [0, 1], got {pct}"
                )));
            }
        }

        match &self.kind {
            ActorKind::Sphere { radius } => {
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(Error::Config(format!(
                        "{name}: sphere radius must be positive, got {radius}"
                    )));
                }
            }
            ActorKind::Axis { size } | ActorKind::Box { size } => {
                if size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                    return Err(Error::Config(format!(
                        "{name}: size components must be positive, got {size:?}"
                    )));
                }
            }
            ActorKind::Robot(spec) => {
                if spec.urdf_file.as_os_str().is_empty() {
                    return Err(Error::Config(format!("{name}: robot needs a urdf_file")));
                }
                if let Some(drive) = &spec.differential_drive {
                    drive.validate(name)?;
                }
            }
        }
        Ok(())
    }

    /// Attach policies implied by reserved names
    pub(crate) fn apply_reserved_policies(&mut self) {
        if self.name != RESERVED_GRIPPER_NAME {
            return;
        }
        if let ActorKind::Robot(spec) = &mut self.kind {
            if spec.gripper.is_none() {
                tracing::debug!("{}: attaching default gripper policy", self.name);
                spec.gripper = Some(GripperPolicy::default());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn boxer_drive() -> DifferentialDrive {
        DifferentialDrive {
            wheel_radius: 0.1,
            wheel_base: 0.5,
            wheel_count: 2,
            left_wheel_joints: vec!["wheel_left_joint".into()],
            right_wheel_joints: vec!["wheel_right_joint".into()],
        }
    }

    #[test]
    fn test_wheel_speeds_straight() {
        let (left, right) = boxer_drive().wheel_speeds(1.0, 0.0);
        assert_relative_eq!(left, 10.0);
        assert_relative_eq!(right, 10.0);
    }

    #[test]
    fn test_wheel_speeds_turn_in_place() {
        let (left, right) = boxer_drive().wheel_speeds(0.0, 2.0);
        assert_relative_eq!(left, -5.0);
        assert_relative_eq!(right, 5.0);
    }

    #[test]
    fn test_wheel_side() {
        let drive = boxer_drive();
        assert_eq!(drive.wheel_side("wheel_left_joint"), Some(WheelSide::Left));
        assert_eq!(drive.wheel_side("wheel_right_joint"), Some(WheelSide::Right));
        assert_eq!(drive.wheel_side("arm_joint_1"), None);
    }

    #[test]
    fn test_gripper_policy() {
        let policy = GripperPolicy::default();
        assert_relative_eq!(policy.target(1.0), 0.1);
        assert_relative_eq!(policy.target(0.0), -0.1);
        assert_relative_eq!(policy.target(-3.0), -0.1);
    }

    #[test]
    fn test_drive_gains() {
        assert_eq!(DriveMode::Velocity.gains().damping, 600.0);
        assert_eq!(DriveMode::Position.gains().stiffness, 80.0);
        assert_eq!(DriveMode::Effort.gains().armature, Some(0.0));
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        assert!(ActorDescriptor::sphere("", 0.1).validate().is_err());
        assert!(ActorDescriptor::sphere("s", 0.0).validate().is_err());
        assert!(ActorDescriptor::cuboid("b", [1.0, -1.0, 1.0]).validate().is_err());
        assert!(ActorDescriptor::sphere("s", 0.1).with_mass(0.0).validate().is_err());

        let mut drive = boxer_drive();
        drive.right_wheel_joints.clear();
        let robot = ActorDescriptor::robot(
            "boxer",
            RobotSpec::new("boxer.urdf").with_differential_drive(drive),
        );
        assert!(matches!(robot.validate(), Err(Error::Config(_))));

        let robot = ActorDescriptor::robot("arm", RobotSpec::default());
        assert!(robot.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let robot = ActorDescriptor::robot(
            "boxer",
            RobotSpec::new("boxer.urdf").with_differential_drive(boxer_drive()),
        );
        assert!(robot.validate().is_ok());
        assert!(ActorDescriptor::axis("frame", [0.3, 0.3, 0.3]).validate().is_ok());
    }

    #[test]
    fn test_resize() {
        let mut kind = ActorKind::Sphere { radius: 0.1 };
        kind.resize(&[0.4]).unwrap();
        assert_eq!(kind.size(), vec![0.4]);
        assert!(kind.resize(&[0.1, 0.2]).is_err());

        let mut kind = ActorKind::Box { size: [1.0; 3] };
        kind.resize(&[0.5, 0.6, 0.7]).unwrap();
        assert_eq!(kind.size(), vec![0.5, 0.6, 0.7]);
    }

    #[test]
    fn test_reserved_gripper_name() {
        let mut gripper = ActorDescriptor::robot(RESERVED_GRIPPER_NAME, RobotSpec::new("panda.urdf"));
        gripper.apply_reserved_policies();
        assert_eq!(
            gripper.kind.as_robot().and_then(|s| s.gripper),
            Some(GripperPolicy::default())
        );

        let mut other = ActorDescriptor::robot("panda", RobotSpec::new("panda.urdf"));
        other.apply_reserved_policies();
        assert!(other.kind.as_robot().and_then(|s| s.gripper).is_none());
    }
}

//! Simulation session configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// PhysX solver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysxConfig {
    /// 0 = PGS, 1 = TGS
    pub solver_type: u32,
    pub num_position_iterations: u32,
    pub num_velocity_iterations: u32,
    pub contact_offset: f32,
    pub rest_offset: f32,
    pub friction_offset_threshold: f32,
    pub friction_correlation_distance: f32,
}

impl Default for PhysxConfig {
    fn default() -> Self {
        Self {
            solver_type: 1,
            num_position_iterations: 6,
            num_velocity_iterations: 1,
            contact_offset: 0.01,
            rest_offset: 0.0,
            friction_offset_threshold: 0.01,
            friction_correlation_distance: 0.001,
        }
    }
}

/// Overall session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation timestep in seconds
    pub dt: f32,
    /// Number of physics substeps per step
    pub substeps: u32,
    /// Compute device, e.g. "cuda:0" or "cpu"
    pub device: String,
    pub num_client_threads: u32,
    /// Open a viewer window
    pub viewer: bool,
    /// Move the `goal` actor from viewer key events
    pub interactive_goal: bool,
    /// Expected obstacle count, used by callers to size obstacle feeds
    pub num_obstacles: usize,
    /// Half-extent of each environment cell
    pub spacing: f32,
    /// Gravity vector [x, y, z] in m/s² (Z up)
    pub gravity: [f32; 3],
    /// Seed for mass/friction/size randomisation
    pub seed: u64,
    pub physx: PhysxConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.05,
            substeps: 2,
            device: "cuda:0".into(),
            num_client_threads: 0,
            viewer: false,
            interactive_goal: true,
            num_obstacles: 10,
            spacing: 6.0,
            gravity: [0.0, 0.0, -9.8],
            seed: 42,
            physx: PhysxConfig::default(),
        }
    }
}

impl SimConfig {
    /// Headless CPU configuration, as used by planner-side rollouts
    pub fn headless() -> Self {
        Self {
            device: "cpu".into(),
            viewer: false,
            interactive_goal: false,
            ..Default::default()
        }
    }

    /// Set the timestep
    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    /// Enable or disable the viewer
    pub fn with_viewer(mut self, viewer: bool) -> Self {
        self.viewer = viewer;
        self
    }

    /// Enable or disable keyboard goal control
    pub fn with_interactive_goal(mut self, enabled: bool) -> Self {
        self.interactive_goal = enabled;
        self
    }

    /// Set the compute device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Set the randomisation seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The GPU tensor pipeline is only used on the primary CUDA device
    pub fn use_gpu_pipeline(&self) -> bool {
        self.device == "cuda:0"
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(Error::Config(format!("dt must be positive, got {}", self.dt)));
        }
        if self.substeps == 0 {
            return Err(Error::Config("substeps must be at least 1".into()));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(Error::Config(format!(
                "spacing must be positive, got {}",
                self.spacing
            )));
        }
        Ok(())
    }

    /// Parse and validate from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.dt, 0.05);
        assert_eq!(config.substeps, 2);
        assert_eq!(config.gravity[2], -9.8);
        assert!(config.use_gpu_pipeline());
        assert_eq!(config.physx.num_position_iterations, 6);
    }

    #[test]
    fn test_builder() {
        let config = SimConfig::headless().with_dt(0.01).with_viewer(true);
        assert!(!config.use_gpu_pipeline());
        assert!(config.viewer);
        assert!(!config.interactive_goal);
        assert_eq!(config.dt, 0.01);
    }

    #[test]
    fn test_toml_partial() {
        let config = SimConfig::from_toml_str(
            r#"
            dt = 0.01
            viewer = true

            [physx]
            num_position_iterations = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.dt, 0.01);
        assert!(config.viewer);
        assert_eq!(config.spacing, 6.0);
        assert_eq!(config.physx.num_position_iterations, 8);
        assert_eq!(config.physx.solver_type, 1);
    }

    #[test]
    fn test_validate() {
        assert!(SimConfig::default().with_dt(0.0).validate().is_err());
        assert!(SimConfig::from_toml_str("substeps = 0").is_err());
        assert!(SimConfig::from_file("/nonexistent/sim.toml").is_err());
    }
}

//! Loading actor descriptors from TOML files

use std::path::Path;

use super::ActorDescriptor;
use crate::{Error, Result};

impl ActorDescriptor {
    /// Parse and validate a descriptor from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let descriptor: Self = toml::from_str(content)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load a descriptor from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }
}

/// Load `<dir>/<name>.toml` for every name, in order
pub fn load_actor_descriptors<S: AsRef<str>>(
    dir: impl AsRef<Path>,
    names: &[S],
) -> Result<Vec<ActorDescriptor>> {
    let dir = dir.as_ref();
    names
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.toml", name.as_ref()));
            tracing::debug!("Loading actor config {}", path.display());
            ActorDescriptor::from_file(path)
        })
        .collect()
}

/// Override the initial positions of the robots, in registration order
pub fn apply_initial_positions(
    descriptors: &mut [ActorDescriptor],
    positions: &[[f32; 3]],
) -> Result<()> {
    let robots = descriptors.iter().filter(|d| d.is_robot()).count();
    if robots != positions.len() {
        return Err(Error::Config(format!(
            "{} initial positions given for {robots} robots",
            positions.len()
        )));
    }
    descriptors
        .iter_mut()
        .filter(|d| d.is_robot())
        .zip(positions)
        .for_each(|(robot, pos)| robot.init_pos = *pos);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorKind, DriveMode, RobotSpec};

    const BOXER: &str = r#"
        name = "boxer"
        type = "robot"
        urdf_file = "boxer.urdf"
        drive_mode = "velocity"
        init_pos = [0.0, 0.0, 0.05]
        caster_links = ["caster_link"]

        [differential_drive]
        wheel_radius = 0.08
        wheel_base = 0.494
        wheel_count = 2
        left_wheel_joints = ["wheel_left_joint"]
        right_wheel_joints = ["wheel_right_joint"]
    "#;

    #[test]
    fn test_robot_from_toml() {
        let boxer = ActorDescriptor::from_toml_str(BOXER).unwrap();
        assert_eq!(boxer.name, "boxer");
        assert_eq!(boxer.init_pos, [0.0, 0.0, 0.05]);
        assert_eq!(boxer.init_ori, [0.0, 0.0, 0.0, 1.0]);
        assert!(boxer.handle().is_none());

        let spec = boxer.kind.as_robot().unwrap();
        assert_eq!(spec.drive_mode, DriveMode::Velocity);
        assert_eq!(spec.caster_links, vec!["caster_link".to_string()]);
        let drive = spec.differential_drive.as_ref().unwrap();
        assert_eq!(drive.wheel_count, 2);
    }

    #[test]
    fn test_obstacle_from_toml() {
        let toml_str = r#"
            name = "goal"
            type = "sphere"
            radius = 0.05
            fixed = true
            collision = false
            color = [0.5, 1.0, 0.5]
        "#;
        let goal = ActorDescriptor::from_toml_str(toml_str).unwrap();
        assert_eq!(goal.kind, ActorKind::Sphere { radius: 0.05 });
        assert!(goal.fixed);
        assert!(!goal.collision);
        assert_eq!(goal.mass, 1.0);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let toml_str = r#"
            name = "wall"
            type = "box"
            size = [1.0, 0.0, 1.0]
        "#;
        assert!(matches!(
            ActorDescriptor::from_toml_str(toml_str),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ActorDescriptor::from_toml_str("name = \"x\"\ntype = \"teapot\""),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = std::env::temp_dir().join(format!("envsync_actors_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("boxer.toml"), BOXER).unwrap();

        let actors = load_actor_descriptors(&dir, &["boxer"]).unwrap();
        assert_eq!(actors.len(), 1);
        assert!(matches!(
            load_actor_descriptors(&dir, &["missing"]),
            Err(Error::Io(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_apply_initial_positions() {
        let mut actors = vec![
            ActorDescriptor::robot("a", RobotSpec::new("a.urdf")),
            ActorDescriptor::sphere("goal", 0.1),
            ActorDescriptor::robot("b", RobotSpec::new("b.urdf")),
        ];
        apply_initial_positions(&mut actors, &[[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();
        assert_eq!(actors[0].init_pos, [1.0, 0.0, 0.0]);
        assert_eq!(actors[1].init_pos, [0.0, 0.0, 0.0]);
        assert_eq!(actors[2].init_pos, [2.0, 0.0, 0.0]);

        assert!(apply_initial_positions(&mut actors, &[[0.0; 3]]).is_err());
    }
}

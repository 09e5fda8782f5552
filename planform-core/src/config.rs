//! Engine tunables, deserializable from the host's configuration file.

use crate::containment::{ContainmentPolicy, PolicyError};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: ContainmentPolicy,
    /// Pixels within this distance of a planform edge are part of its mask.
    pub boundary_tolerance: f64,
    /// Brush width for stroke-mode elements, in pixels.
    pub stroke_thickness: f32,
    /// Threads for deferred recomputation. Zero runs deferred work on the caller.
    pub background_workers: usize,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: ContainmentPolicy::default(),
            boundary_tolerance: crate::raster::BOUNDARY_TOLERANCE,
            stroke_thickness: 3.0,
            background_workers: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("boundary tolerance must be finite and non-negative, got {0}")]
    Tolerance(f64),
    #[error("stroke thickness must be finite and positive, got {0}")]
    StrokeThickness(f32),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        if !(self.boundary_tolerance.is_finite() && self.boundary_tolerance >= 0.0) {
            return Err(ConfigError::Tolerance(self.boundary_tolerance));
        }
        if !(self.stroke_thickness.is_finite() && self.stroke_thickness > 0.0) {
            return Err(ConfigError::StrokeThickness(self.stroke_thickness));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig {
            boundary_tolerance: -1.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Tolerance(_))));
    }
}

//! Validated configuration for worlds, particle systems and steps.

use crate::core::math::Vector2D;
use crate::error::{Error, Result};

/// Standard gravity, pointing down the y axis.
pub const STANDARD_GRAVITY: Vector2D = Vector2D::new(0.0, -9.80665);

/// Physical parameters of a particle system.
///
/// Everything except `max_particles` is fixed once the system is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSystemDef {
    /// Particle radius (> 0). Lattice spacing and interaction distance are `2 * radius`.
    pub radius: f32,
    /// Fractional velocity loss per second (>= 0).
    pub damping_strength: f32,
    /// Multiplier on world gravity; negative values make the fluid buoyant.
    pub gravity_scale: f32,
    /// Target (rest) density (> 0).
    pub density: f32,
    /// Particle cap; `None` is unbounded.
    pub max_particles: Option<usize>,
}

impl Default for ParticleSystemDef {
    fn default() -> Self {
        Self {
            radius: 1.0,
            damping_strength: 1.0,
            gravity_scale: 1.0,
            density: 1.0,
            max_particles: None,
        }
    }
}

impl ParticleSystemDef {
    pub fn new(radius: f32, damping_strength: f32, gravity_scale: f32, density: f32) -> Self {
        Self {
            radius,
            damping_strength,
            gravity_scale,
            density,
            max_particles: None,
        }
    }

    pub fn with_max_particles(mut self, max_particles: usize) -> Self {
        self.max_particles = Some(max_particles);
        self
    }

    /// Errors: `Error::InvalidArgument` naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::invalid("radius must be finite and > 0"));
        }
        // The diameter is the grid cell size and the interaction distance.
        if !(2.0 * self.radius).is_finite() {
            return Err(Error::invalid("radius is too large: diameter overflows"));
        }
        if !self.density.is_finite() || self.density <= 0.0 {
            return Err(Error::invalid("density must be finite and > 0"));
        }
        if !self.damping_strength.is_finite() || self.damping_strength < 0.0 {
            return Err(Error::invalid("damping_strength must be finite and >= 0"));
        }
        if !self.gravity_scale.is_finite() {
            return Err(Error::invalid("gravity_scale must be finite"));
        }
        Ok(())
    }
}

/// Solver tunables shared by every particle system of a world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Scales how hard crowded particles push each other apart.
    pub pressure_strength: f32,
    /// XSPH velocity smoothing in `[0, 1]`; 0 disables it.
    pub viscosity: f32,
    /// Fraction of normal speed kept when bouncing off a boundary, in `[0, 1]`.
    pub restitution: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            pressure_strength: 0.05,
            viscosity: 0.0,
            restitution: 0.0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.pressure_strength.is_finite() || self.pressure_strength < 0.0 {
            return Err(Error::invalid("pressure_strength must be finite and >= 0"));
        }
        if !(0.0..=1.0).contains(&self.viscosity) {
            return Err(Error::invalid("viscosity must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(Error::invalid("restitution must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Everything needed to construct a world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldDef {
    pub gravity: Vector2D,
    pub solver: SolverConfig,
}

impl Default for WorldDef {
    fn default() -> Self {
        Self {
            gravity: STANDARD_GRAVITY,
            solver: SolverConfig::default(),
        }
    }
}

impl WorldDef {
    pub fn validate(&self) -> Result<()> {
        validate_gravity(self.gravity)?;
        self.solver.validate()
    }
}

/// Arguments of a single step.
///
/// Iteration counts are signed so that out-of-range values coming from a host
/// are rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepConfig {
    pub dt: f32,
    pub velocity_iterations: i32,
    pub position_iterations: i32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            velocity_iterations: 6,
            position_iterations: 2,
        }
    }
}

impl StepConfig {
    pub fn new(dt: f32, velocity_iterations: i32, position_iterations: i32) -> Self {
        Self {
            dt,
            velocity_iterations,
            position_iterations,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(Error::invalid("dt must be finite and > 0"));
        }
        if self.velocity_iterations < 1 {
            return Err(Error::invalid("velocity_iterations must be >= 1"));
        }
        if self.position_iterations < 1 {
            return Err(Error::invalid("position_iterations must be >= 1"));
        }
        Ok(())
    }
}

pub(crate) fn validate_gravity(gravity: Vector2D) -> Result<()> {
    if !gravity.is_finite() {
        return Err(Error::invalid("gravity components must be finite"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        ParticleSystemDef::default().validate()?;
        SolverConfig::default().validate()?;
        WorldDef::default().validate()?;
        StepConfig::default().validate()?;
        Ok(())
    }

    #[test]
    fn particle_def_rejects_bad_radius_and_density() {
        let err = ParticleSystemDef::new(-1.0, 0.2, 1.0, 1.2)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("radius"));

        let err = ParticleSystemDef::new(0.5, 0.2, 1.0, 0.0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("density"));

        let err = ParticleSystemDef::new(f32::MAX, 0.2, 1.0, 1.2)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("radius"));
        assert!(ParticleSystemDef::new(1e38, 0.2, 1.0, 1.2).validate().is_ok());

        let err = ParticleSystemDef::new(0.5, f32::NAN, 1.0, 1.0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("damping"));
    }

    #[test]
    fn step_config_rejects_bad_values() {
        assert!(StepConfig::new(0.0, 1, 1).validate().is_err());
        assert!(StepConfig::new(-0.1, 1, 1).validate().is_err());
        assert!(StepConfig::new(f32::INFINITY, 1, 1).validate().is_err());
        assert!(StepConfig::new(0.1, 0, 1).validate().is_err());
        assert!(StepConfig::new(0.1, 1, -3).validate().is_err());
        assert!(StepConfig::new(0.1, 1, 1).validate().is_ok());
    }

    #[test]
    fn solver_config_ranges() {
        let bad = SolverConfig {
            viscosity: 1.5,
            ..SolverConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = SolverConfig {
            pressure_strength: -0.1,
            ..SolverConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}

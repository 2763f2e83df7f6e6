//! Core simulation types: geometry, configuration, spatial grid, particle systems,
//! boundaries, the stepper and the world that ties them together.

pub mod boundary;
pub mod config;
pub mod grid;
pub mod math;
pub mod particle;
mod solver;
pub mod units;
pub mod world;

pub use boundary::{Boundary, BoundaryKind, Edge};
pub use config::{ParticleSystemDef, SolverConfig, StepConfig, WorldDef, STANDARD_GRAVITY};
pub use grid::SpatialGrid;
pub use math::{Size2D, Vector2D};
pub use particle::{ParticleSystem, MAX_SYSTEM_PARTICLES};
pub use units::PtmRatio;
pub use world::{BoundaryHandle, ParticleSystemHandle, StepReport, World};

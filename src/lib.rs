//! liquid2d: a self-contained 2D particle fluid simulation core.
//!
//! The API follows the shape of the LiquidFun wrapper it replaces: create a [`World`]
//! with gravity, create particle systems with fluid parameters, fill them with
//! particle boxes, register static edge boundaries, step, and read back positions.
//!
//! ```
//! use liquid2d::core::{ParticleSystemDef, Size2D, Vector2D, World};
//!
//! # fn main() -> liquid2d::error::Result<()> {
//! let mut world = World::new(Vector2D::new(0.0, -9.80665))?;
//! let water = world.create_particle_system(ParticleSystemDef::new(0.28, 0.2, 1.0, 1.2))?;
//! world.create_particle_box(water, Vector2D::new(5.0, 7.5), Size2D::new(1.5, 1.5))?;
//! world.create_edge_boundary(Vector2D::ZERO, Size2D::new(10.0, 15.0))?;
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0, 6, 2)?;
//! }
//! assert!(world.particle_positions(water).iter().all(|p| p.y > 0.0));
//! # Ok(())
//! # }
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod core;
pub mod error;
pub mod shared;

#[cfg(feature = "python")]
mod python;

pub use crate::core::{
    BoundaryHandle, ParticleSystemDef, ParticleSystemHandle, Size2D, StepReport, Vector2D, World,
};
pub use crate::error::{Error, Result};
pub use crate::shared::{SharedWorld, WeakWorld};

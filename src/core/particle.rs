use crate::core::config::ParticleSystemDef;
use crate::core::grid::SpatialGrid;
use crate::core::math::{Size2D, Vector2D};
use crate::error::{Error, Result};
use std::f32::consts::PI;

/// Relative tolerance when counting how many lattice points fit along an axis.
const LATTICE_EPS: f32 = 1e-4;

/// Most particles one system can hold; the solver indexes particles with `u32`.
pub const MAX_SYSTEM_PARTICLES: usize = u32::MAX as usize;

/// A pair of particles closer than one diameter, gathered once per step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contact {
    pub a: u32,
    pub b: u32,
    /// `1 - dist / diameter`, in `(0, 1]`.
    pub weight: f32,
    /// Unit vector from `a` to `b`.
    pub normal: Vector2D,
}

/// A collection of particles sharing physical parameters.
///
/// Particles are stored in dense arrays in creation order. Indices are stable: nothing
/// removes a particle except lowering the limit, which only drops from the end.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    def: ParticleSystemDef,
    pub(crate) positions: Vec<Vector2D>,
    pub(crate) velocities: Vec<Vector2D>,

    // Solver scratch, reused across steps.
    pub(crate) grid: SpatialGrid,
    pub(crate) contacts: Vec<Contact>,
    pub(crate) weights: Vec<f32>,
    pub(crate) pressures: Vec<f32>,
    /// State of the step in progress; swapped in only once every system succeeded.
    pub(crate) next_positions: Vec<Vector2D>,
    pub(crate) next_velocities: Vec<Vector2D>,
}

impl ParticleSystem {
    /// Create an empty particle system after validating `def`.
    ///
    /// Errors:
    /// - `Error::InvalidArgument` if `radius <= 0`, `density <= 0`, `damping_strength < 0`
    ///   or any parameter is NaN/inf.
    pub fn new(def: ParticleSystemDef) -> Result<Self> {
        def.validate()?;
        Ok(Self {
            def,
            positions: Vec::new(),
            velocities: Vec::new(),
            grid: SpatialGrid::new(2.0 * def.radius),
            contacts: Vec::new(),
            weights: Vec::new(),
            pressures: Vec::new(),
            next_positions: Vec::new(),
            next_velocities: Vec::new(),
        })
    }

    pub fn def(&self) -> &ParticleSystemDef {
        &self.def
    }

    pub fn radius(&self) -> f32 {
        self.def.radius
    }

    /// Lattice spacing and interaction distance.
    pub fn diameter(&self) -> f32 {
        2.0 * self.def.radius
    }

    pub fn damping_strength(&self) -> f32 {
        self.def.damping_strength
    }

    pub fn gravity_scale(&self) -> f32 {
        self.def.gravity_scale
    }

    pub fn density(&self) -> f32 {
        self.def.density
    }

    /// Mass of one particle: `density * π r²`.
    pub fn particle_mass(&self) -> f32 {
        self.def.density * PI * self.def.radius * self.def.radius
    }

    /// Current cap, `None` if unbounded.
    pub fn max_particles(&self) -> Option<usize> {
        self.def.max_particles
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Live positions in index order.
    pub fn positions(&self) -> &[Vector2D] {
        &self.positions
    }

    /// Live velocities in index order.
    pub fn velocities(&self) -> &[Vector2D] {
        &self.velocities
    }

    /// Total kinetic energy: sum of 1/2 m |v|^2.
    pub fn kinetic_energy(&self) -> f64 {
        let m = self.particle_mass() as f64;
        self.velocities
            .iter()
            .map(|v| 0.5 * m * v.length_squared() as f64)
            .sum()
    }

    /// How many more particles fit under the cap.
    fn remaining_capacity(&self) -> usize {
        match self.def.max_particles {
            Some(max) => max.saturating_sub(self.positions.len()),
            None => usize::MAX,
        }
    }

    /// Make room for `additional` particles without aborting on allocation failure.
    fn reserve(&mut self, additional: usize) -> Result<()> {
        if self.positions.len().saturating_add(additional) > MAX_SYSTEM_PARTICLES {
            return Err(Error::invalid(format!(
                "a particle system holds at most {MAX_SYSTEM_PARTICLES} particles"
            )));
        }
        self.positions
            .try_reserve(additional)
            .and_then(|()| self.velocities.try_reserve(additional))
            .map_err(|e| Error::invalid(format!("cannot allocate {additional} particles: {e}")))
    }

    /// Append one particle at rest. Returns `false` if the cap is reached.
    pub fn push_particle(&mut self, position: Vector2D, velocity: Vector2D) -> Result<bool> {
        if !position.is_finite() || !velocity.is_finite() {
            return Err(Error::invalid("particle position and velocity must be finite"));
        }
        if self.remaining_capacity() == 0 {
            return Ok(false);
        }
        self.reserve(1)?;
        self.positions.push(position);
        self.velocities.push(velocity);
        Ok(true)
    }

    /// Fill the rectangle centred on `center` with a lattice of particles at rest.
    ///
    /// Spacing is one diameter; the lattice is centred in the rectangle and emitted
    /// row by row from the bottom, left to right. Points beyond the particle cap are
    /// dropped. Returns `(created, requested)`.
    ///
    /// Errors: `Error::InvalidArgument` if `center` is non-finite, `size` is not finite
    /// and > 0 in both dimensions, or the particles that would be created exceed
    /// [`MAX_SYSTEM_PARTICLES`] or cannot be allocated. Nothing is created in that case.
    pub fn create_particle_box(&mut self, center: Vector2D, size: Size2D) -> Result<(usize, usize)> {
        if !center.is_finite() {
            return Err(Error::invalid("particle box position must be finite"));
        }
        if !size.is_positive() {
            return Err(Error::invalid(
                "particle box size must be finite with width > 0 and height > 0",
            ));
        }

        let stride = self.diameter();
        let nx = lattice_points(size.width, stride);
        let ny = lattice_points(size.height, stride);
        let requested = nx.saturating_mul(ny);

        let span = Vector2D::new((nx - 1) as f32 * stride, (ny - 1) as f32 * stride);
        let start = center - span * 0.5;

        let created = requested.min(self.remaining_capacity());
        self.reserve(created)?;
        for k in 0..created {
            let (ix, iy) = (k % nx, k / nx);
            self.positions.push(Vector2D::new(
                start.x + ix as f32 * stride,
                start.y + iy as f32 * stride,
            ));
            self.velocities.push(Vector2D::ZERO);
        }
        Ok((created, requested))
    }

    /// Change the particle cap. Lowering it below the live count drops the newest
    /// particles. Returns the number evicted.
    pub fn set_max_particles(&mut self, max_particles: Option<usize>) -> usize {
        self.def.max_particles = max_particles;
        match max_particles {
            Some(max) if max < self.positions.len() => {
                let evicted = self.positions.len() - max;
                self.positions.truncate(max);
                self.velocities.truncate(max);
                evicted
            }
            _ => 0,
        }
    }
}

/// Lattice points along an axis of length `extent` with spacing `stride`; at least one.
fn lattice_points(extent: f32, stride: f32) -> usize {
    let n = (extent / stride + LATTICE_EPS).floor();
    if n.is_finite() && n >= 0.0 {
        (n as usize).saturating_add(1)
    } else {
        1
    }
}

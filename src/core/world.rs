use crate::core::boundary::Boundary;
use crate::core::config::{validate_gravity, ParticleSystemDef, SolverConfig, StepConfig, WorldDef};
use crate::core::math::{Size2D, Vector2D};
use crate::core::particle::ParticleSystem;
use crate::core::solver::{commit_step, step_system, StepContext};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, trace, warn};

/// Source of world ids; handles carry the id of the world that issued them.
static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a particle system inside the world that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleSystemHandle {
    world: u32,
    index: u32,
}

impl ParticleSystemHandle {
    /// Position of the system in creation order.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Identifies a boundary inside the world that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryHandle {
    world: u32,
    index: u32,
}

impl BoundaryHandle {
    /// Position of the boundary in registration order.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Summary handed to the step hook at the end of each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// 1-based index of the step that just finished.
    pub step_index: u64,
    pub dt: f32,
    /// Simulated time after the step.
    pub time: f64,
    /// Live particles over all systems.
    pub particle_count: usize,
}

type StepHook = Box<dyn FnMut(&StepReport) + Send + 'static>;

/// A 2D particle-fluid world.
///
/// Owns gravity, the particle systems (in creation order) and the static boundaries
/// (in registration order). Each world is independent; handles issued by one world
/// are rejected by every other.
pub struct World {
    id: u32,
    gravity: Vector2D,
    solver: SolverConfig,
    systems: Vec<ParticleSystem>,
    boundaries: Vec<Boundary>,
    step_count: u64,
    time: f64,
    hook: Option<StepHook>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("gravity", &self.gravity)
            .field("solver", &self.solver)
            .field("systems", &self.systems.len())
            .field("boundaries", &self.boundaries.len())
            .field("step_count", &self.step_count)
            .field("time", &self.time)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl World {
    /// Create an empty world with the given gravity and default solver settings.
    ///
    /// Errors: `Error::InvalidArgument` if a gravity component is NaN/inf.
    pub fn new(gravity: Vector2D) -> Result<Self> {
        Self::with_def(WorldDef {
            gravity,
            ..WorldDef::default()
        })
    }

    /// Create an empty world from a full definition.
    pub fn with_def(def: WorldDef) -> Result<Self> {
        def.validate()?;
        let id = NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed);
        debug!(world = id, gravity = ?def.gravity, solver = ?def.solver, "created world");
        Ok(Self {
            id,
            gravity: def.gravity,
            solver: def.solver,
            systems: Vec::new(),
            boundaries: Vec::new(),
            step_count: 0,
            time: 0.0,
            hook: None,
        })
    }

    pub fn gravity(&self) -> Vector2D {
        self.gravity
    }

    /// Replace the gravity vector; takes effect on the next step.
    pub fn set_gravity(&mut self, gravity: Vector2D) -> Result<()> {
        validate_gravity(gravity)?;
        self.gravity = gravity;
        Ok(())
    }

    pub fn solver(&self) -> &SolverConfig {
        &self.solver
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated time, the sum of all step `dt`s.
    pub fn time(&self) -> f64 {
        self.time
    }

    // ============ Particle systems ============

    /// Create an empty particle system.
    ///
    /// Errors: `Error::InvalidArgument` if `radius <= 0`, `density <= 0`,
    /// `damping_strength < 0` or any parameter is NaN/inf.
    pub fn create_particle_system(&mut self, def: ParticleSystemDef) -> Result<ParticleSystemHandle> {
        let system = ParticleSystem::new(def)?;
        let index = u32::try_from(self.systems.len())
            .map_err(|_| Error::invalid("too many particle systems"))?;
        self.systems.push(system);
        debug!(
            world = self.id,
            system = index,
            radius = def.radius,
            damping_strength = def.damping_strength,
            gravity_scale = def.gravity_scale,
            density = def.density,
            "created particle system"
        );
        Ok(ParticleSystemHandle {
            world: self.id,
            index,
        })
    }

    pub fn particle_system_count(&self) -> usize {
        self.systems.len()
    }

    /// Checked access to a particle system.
    ///
    /// Errors: `Error::InvalidArgument` if the handle was issued by another world.
    pub fn particle_system(&self, handle: ParticleSystemHandle) -> Result<&ParticleSystem> {
        self.check_world(handle.world)?;
        self.systems
            .get(handle.index())
            .ok_or_else(|| Error::invalid("unknown particle system handle"))
    }

    fn particle_system_mut(&mut self, handle: ParticleSystemHandle) -> Result<&mut ParticleSystem> {
        self.check_world(handle.world)?;
        self.systems
            .get_mut(handle.index())
            .ok_or_else(|| Error::invalid("unknown particle system handle"))
    }

    /// Particle systems in creation order.
    pub fn particle_systems(&self) -> &[ParticleSystem] {
        &self.systems
    }

    /// Emit a lattice of particles filling the rectangle centred on `position`.
    ///
    /// Points beyond the system's particle limit are dropped. Returns the number of
    /// particles created.
    ///
    /// Errors: `Error::InvalidArgument` on a foreign handle, non-finite position, a
    /// size that is not positive in both dimensions, or a box too large to store.
    pub fn create_particle_box(
        &mut self,
        handle: ParticleSystemHandle,
        position: Vector2D,
        size: Size2D,
    ) -> Result<usize> {
        let world = self.id;
        let system = self.particle_system_mut(handle)?;
        let (created, requested) = system.create_particle_box(position, size)?;
        if created < requested {
            warn!(
                world,
                system = handle.index,
                requested,
                created,
                "particle box truncated by particle limit"
            );
        } else {
            debug!(world, system = handle.index, created, "created particle box");
        }
        Ok(created)
    }

    /// Set the maximum particle count of a system.
    ///
    /// Lowering the limit below the live count evicts the newest particles; a limit
    /// of zero empties the system.
    ///
    /// Errors: `Error::InvalidArgument` if `max_particles < 0` or the handle is foreign.
    pub fn set_particle_limit(&mut self, handle: ParticleSystemHandle, max_particles: i64) -> Result<()> {
        let max = usize::try_from(max_particles)
            .map_err(|_| Error::invalid("max_particles must be >= 0"))?;
        let world = self.id;
        let evicted = self.particle_system_mut(handle)?.set_max_particles(Some(max));
        if evicted > 0 {
            info!(world, system = handle.index, max, evicted, "particle limit evicted particles");
        }
        Ok(())
    }

    /// Remove the particle limit of a system.
    pub fn clear_particle_limit(&mut self, handle: ParticleSystemHandle) -> Result<()> {
        self.particle_system_mut(handle)?.set_max_particles(None);
        Ok(())
    }

    /// Live particle count; 0 for a handle this world did not issue.
    pub fn particle_count(&self, handle: ParticleSystemHandle) -> usize {
        self.particle_system(handle)
            .map(ParticleSystem::particle_count)
            .unwrap_or(0)
    }

    /// Owned copy of the live positions in index order; empty for a foreign handle.
    pub fn particle_positions(&self, handle: ParticleSystemHandle) -> Vec<Vector2D> {
        self.particle_system(handle)
            .map(|s| s.positions().to_vec())
            .unwrap_or_default()
    }

    /// Owned copy of the live velocities in index order; empty for a foreign handle.
    pub fn particle_velocities(&self, handle: ParticleSystemHandle) -> Vec<Vector2D> {
        self.particle_system(handle)
            .map(|s| s.velocities().to_vec())
            .unwrap_or_default()
    }

    /// Total kinetic energy over all systems.
    pub fn kinetic_energy(&self) -> f64 {
        self.systems.iter().map(ParticleSystem::kinetic_energy).sum()
    }

    // ============ Boundaries ============

    /// Register a closed rectangular boundary spanning `origin .. origin + size`.
    ///
    /// Errors: `Error::InvalidArgument` if `size.width <= 0 || size.height <= 0` or any
    /// input is NaN/inf.
    pub fn create_edge_boundary(&mut self, origin: Vector2D, size: Size2D) -> Result<BoundaryHandle> {
        self.add_boundary(Boundary::edge_box(origin, size)?)
    }

    /// Register a single edge from `a` to `b`.
    pub fn create_edge(&mut self, a: Vector2D, b: Vector2D) -> Result<BoundaryHandle> {
        self.add_boundary(Boundary::edge(a, b)?)
    }

    fn add_boundary(&mut self, boundary: Boundary) -> Result<BoundaryHandle> {
        let index = u32::try_from(self.boundaries.len())
            .map_err(|_| Error::invalid("too many boundaries"))?;
        debug!(world = self.id, boundary = index, kind = ?boundary.kind(), "created boundary");
        self.boundaries.push(boundary);
        Ok(BoundaryHandle {
            world: self.id,
            index,
        })
    }

    pub fn boundary(&self, handle: BoundaryHandle) -> Result<&Boundary> {
        self.check_world(handle.world)?;
        self.boundaries
            .get(handle.index())
            .ok_or_else(|| Error::invalid("unknown boundary handle"))
    }

    /// Boundaries in registration order.
    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    // ============ Stepping ============

    /// Install a callback run at the end of every successful step, replacing any
    /// previous one.
    pub fn set_step_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&StepReport) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    pub fn clear_step_hook(&mut self) {
        self.hook = None;
    }

    /// Advance every particle system by `dt`.
    ///
    /// Errors:
    /// - `Error::InvalidArgument` if `dt <= 0`, `dt` is NaN/inf, or either iteration
    ///   count is `< 1`;
    /// - `Error::InvalidArgument` if the step would produce a non-finite position or
    ///   velocity in any system. No system is advanced in that case and the step
    ///   counter, clock and hook are untouched.
    pub fn step(&mut self, dt: f32, velocity_iterations: i32, position_iterations: i32) -> Result<()> {
        self.step_with(&StepConfig::new(dt, velocity_iterations, position_iterations))
    }

    pub fn step_with(&mut self, step: &StepConfig) -> Result<()> {
        step.validate()?;

        let ctx = StepContext {
            gravity: self.gravity,
            solver: &self.solver,
            boundaries: &self.boundaries,
            step,
        };
        for (index, system) in self.systems.iter_mut().enumerate() {
            if let Err(e) = step_system(&ctx, system) {
                warn!(world = self.id, system = index, error = %e, "step rejected, world unchanged");
                return Err(e);
            }
        }
        for system in &mut self.systems {
            commit_step(system);
        }

        self.step_count += 1;
        self.time += step.dt as f64;
        let report = StepReport {
            step_index: self.step_count,
            dt: step.dt,
            time: self.time,
            particle_count: self.systems.iter().map(ParticleSystem::particle_count).sum(),
        };
        trace!(
            world = self.id,
            step = report.step_index,
            dt = step.dt,
            velocity_iterations = step.velocity_iterations,
            position_iterations = step.position_iterations,
            particles = report.particle_count,
            "stepped world"
        );
        if let Some(hook) = self.hook.as_mut() {
            hook(&report);
        }
        Ok(())
    }

    fn check_world(&self, world: u32) -> Result<()> {
        if world != self.id {
            return Err(Error::invalid("handle belongs to a different world"));
        }
        Ok(())
    }
}

//! A cloneable, lock-guarded world handle.
//!
//! `World` methods take `&mut self`, so the borrow checker already forbids stepping a
//! world from inside its own step. Hosts that hand the same world to several owners,
//! such as a step hook that refers back to its world, use `SharedWorld` instead: every
//! call acquires the world with `try_lock`, and a call made while a step holds the
//! lock fails with `Error::Reentrancy` instead of deadlocking.

use crate::core::{
    BoundaryHandle, ParticleSystemDef, ParticleSystemHandle, Size2D, StepReport, Vector2D, World,
};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

#[derive(Debug, Clone)]
pub struct SharedWorld {
    inner: Arc<Mutex<World>>,
}

/// Non-owning counterpart of [`SharedWorld`], for hooks that refer back to their world.
#[derive(Debug, Clone)]
pub struct WeakWorld {
    inner: Weak<Mutex<World>>,
}

impl WeakWorld {
    pub fn upgrade(&self) -> Option<SharedWorld> {
        self.inner.upgrade().map(|inner| SharedWorld { inner })
    }
}

impl From<World> for SharedWorld {
    fn from(world: World) -> Self {
        Self::new(world)
    }
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
        }
    }

    pub fn downgrade(&self) -> WeakWorld {
        WeakWorld {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Exclusive access to the world.
    ///
    /// Errors: `Error::Reentrancy` while a step is in progress, `Error::Poisoned` if
    /// a previous step panicked.
    pub fn lock(&self) -> Result<MutexGuard<'_, World>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(Error::Reentrancy),
            Err(TryLockError::Poisoned(_)) => Err(Error::Poisoned),
        }
    }

    /// Run `f` with exclusive access to the world.
    pub fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> Result<R> {
        let mut world = self.lock()?;
        Ok(f(&mut world))
    }

    pub fn set_gravity(&self, gravity: Vector2D) -> Result<()> {
        self.lock()?.set_gravity(gravity)
    }

    pub fn create_particle_system(&self, def: ParticleSystemDef) -> Result<ParticleSystemHandle> {
        self.lock()?.create_particle_system(def)
    }

    pub fn create_particle_box(
        &self,
        handle: ParticleSystemHandle,
        position: Vector2D,
        size: Size2D,
    ) -> Result<usize> {
        self.lock()?.create_particle_box(handle, position, size)
    }

    pub fn set_particle_limit(&self, handle: ParticleSystemHandle, max_particles: i64) -> Result<()> {
        self.lock()?.set_particle_limit(handle, max_particles)
    }

    pub fn create_edge_boundary(&self, origin: Vector2D, size: Size2D) -> Result<BoundaryHandle> {
        self.lock()?.create_edge_boundary(origin, size)
    }

    pub fn create_edge(&self, a: Vector2D, b: Vector2D) -> Result<BoundaryHandle> {
        self.lock()?.create_edge(a, b)
    }

    pub fn clear_particle_limit(&self, handle: ParticleSystemHandle) -> Result<()> {
        self.lock()?.clear_particle_limit(handle)
    }

    pub fn particle_count(&self, handle: ParticleSystemHandle) -> Result<usize> {
        Ok(self.lock()?.particle_count(handle))
    }

    pub fn particle_positions(&self, handle: ParticleSystemHandle) -> Result<Vec<Vector2D>> {
        Ok(self.lock()?.particle_positions(handle))
    }

    pub fn particle_velocities(&self, handle: ParticleSystemHandle) -> Result<Vec<Vector2D>> {
        Ok(self.lock()?.particle_velocities(handle))
    }

    pub fn clear_step_hook(&self) -> Result<()> {
        self.lock()?.clear_step_hook();
        Ok(())
    }

    pub fn set_step_hook<F>(&self, hook: F) -> Result<()>
    where
        F: FnMut(&StepReport) + Send + 'static,
    {
        self.lock()?.set_step_hook(hook);
        Ok(())
    }

    /// Step the world. The lock is held for the whole step, hook included.
    pub fn step(&self, dt: f32, velocity_iterations: i32, position_iterations: i32) -> Result<()> {
        self.lock()?
            .step(dt, velocity_iterations, position_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_to_world() -> Result<()> {
        let shared = SharedWorld::new(World::new(Vector2D::new(0.0, -10.0))?);
        let h = shared.create_particle_system(ParticleSystemDef::new(0.5, 0.0, 1.0, 1.0))?;
        shared.create_particle_box(h, Vector2D::ZERO, Size2D::new(1.0, 1.0))?;
        shared.step(1.0 / 60.0, 1, 1)?;
        assert_eq!(shared.particle_count(h)?, 4);
        assert_eq!(shared.with(|w| w.step_count())?, 1);
        Ok(())
    }

    #[test]
    fn weak_handle_does_not_keep_world_alive() -> Result<()> {
        let shared = SharedWorld::new(World::new(Vector2D::ZERO)?);
        let weak = shared.downgrade();
        assert!(weak.upgrade().is_some());
        drop(shared);
        assert!(weak.upgrade().is_none());
        Ok(())
    }

    #[test]
    fn held_lock_reports_reentrancy() -> Result<()> {
        let shared = SharedWorld::new(World::new(Vector2D::ZERO)?);
        let _guard = shared.lock()?;
        assert!(matches!(shared.step(0.1, 1, 1), Err(Error::Reentrancy)));
        Ok(())
    }
}

use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::core::{
    BoundaryHandle, ParticleSystemDef, ParticleSystemHandle, Size2D, Vector2D, World,
};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Opaque handle to a particle system of a `LiquidWorld`.
#[pyclass(name = "ParticleSystem", frozen)]
#[derive(Clone, Copy)]
pub struct PyParticleSystem {
    handle: ParticleSystemHandle,
}

#[pymethods]
impl PyParticleSystem {
    /// Position of the system in creation order.
    #[getter]
    fn index(&self) -> usize {
        self.handle.index()
    }
}

/// Opaque handle to a boundary of a `LiquidWorld`.
#[pyclass(name = "Boundary", frozen)]
#[derive(Clone, Copy)]
pub struct PyBoundary {
    handle: BoundaryHandle,
}

#[pymethods]
impl PyBoundary {
    #[getter]
    fn index(&self) -> usize {
        self.handle.index()
    }
}

/// Python-facing wrapper around the Rust `World`.
///
/// API:
/// - __new__(gravity=(0.0, -9.80665))
/// - create_particle_system(radius, damping_strength, gravity_scale, density) -> ParticleSystem
/// - create_particle_box(system, position, size)
/// - create_edge_box(origin, size) -> Boundary
/// - step(dt, velocity_iterations, position_iterations)
/// - get_positions(system) -> np.ndarray, shape (N, 2)
#[pyclass(name = "LiquidWorld", unsendable)]
pub struct PyWorld {
    world: World,
}

#[pymethods]
impl PyWorld {
    /// Create an empty world.
    ///
    /// Errors: raises ValueError if gravity is not finite.
    #[new]
    #[pyo3(signature = (gravity=(0.0, -9.80665)))]
    fn new(gravity: (f32, f32)) -> PyResult<Self> {
        let world = World::new(Vector2D::from(gravity)).map_err(py_err)?;
        Ok(Self { world })
    }

    fn set_gravity(&mut self, gravity: (f32, f32)) -> PyResult<()> {
        self.world
            .set_gravity(Vector2D::from(gravity))
            .map_err(py_err)
    }

    /// Create a particle system.
    ///
    /// Parameters
    /// - radius: particle radius in world units (> 0)
    /// - damping_strength: fractional velocity loss per second (>= 0)
    /// - gravity_scale: multiplier on world gravity
    /// - density: target density (> 0)
    #[pyo3(signature = (radius, damping_strength=1.0, gravity_scale=1.0, density=1.0))]
    fn create_particle_system(
        &mut self,
        radius: f32,
        damping_strength: f32,
        gravity_scale: f32,
        density: f32,
    ) -> PyResult<PyParticleSystem> {
        let def = ParticleSystemDef::new(radius, damping_strength, gravity_scale, density);
        let handle = self.world.create_particle_system(def).map_err(py_err)?;
        Ok(PyParticleSystem { handle })
    }

    /// Fill the rectangle centred on `position` with particles; returns how many were created.
    fn create_particle_box(
        &mut self,
        system: PyRef<'_, PyParticleSystem>,
        position: (f32, f32),
        size: (f32, f32),
    ) -> PyResult<usize> {
        self.world
            .create_particle_box(system.handle, Vector2D::from(position), Size2D::from(size))
            .map_err(py_err)
    }

    fn set_particle_limit(
        &mut self,
        system: PyRef<'_, PyParticleSystem>,
        max_particles: i64,
    ) -> PyResult<()> {
        self.world
            .set_particle_limit(system.handle, max_particles)
            .map_err(py_err)
    }

    /// Register a closed rectangle with lower-left corner `origin`.
    fn create_edge_box(&mut self, origin: (f32, f32), size: (f32, f32)) -> PyResult<PyBoundary> {
        let handle = self
            .world
            .create_edge_boundary(Vector2D::from(origin), Size2D::from(size))
            .map_err(py_err)?;
        Ok(PyBoundary { handle })
    }

    /// Advance the world by one step (releases the GIL during computation).
    #[pyo3(signature = (dt, velocity_iterations=6, position_iterations=2))]
    fn step(
        &mut self,
        py: Python<'_>,
        dt: f32,
        velocity_iterations: i32,
        position_iterations: i32,
    ) -> PyResult<()> {
        let world = &mut self.world;
        py.detach(|| world.step(dt, velocity_iterations, position_iterations))
            .map_err(py_err)
    }

    fn particle_count(&self, system: PyRef<'_, PyParticleSystem>) -> usize {
        self.world.particle_count(system.handle)
    }

    /// Return positions as a NumPy array of shape (N, 2), dtype=float32.
    fn get_positions(
        &self,
        py: Python<'_>,
        system: PyRef<'_, PyParticleSystem>,
    ) -> PyResult<Py<PyArray2<f32>>> {
        let positions = self.world.particle_positions(system.handle);
        Ok(to_array(py, &positions))
    }

    /// Return velocities as a NumPy array of shape (N, 2), dtype=float32.
    fn get_velocities(
        &self,
        py: Python<'_>,
        system: PyRef<'_, PyParticleSystem>,
    ) -> PyResult<Py<PyArray2<f32>>> {
        let velocities = self.world.particle_velocities(system.handle);
        Ok(to_array(py, &velocities))
    }

    #[getter]
    fn time(&self) -> f64 {
        self.world.time()
    }
}

fn to_array(py: Python<'_>, points: &[Vector2D]) -> Py<PyArray2<f32>> {
    let mut arr = Array2::<f32>::zeros((points.len(), 2));
    for (i, p) in points.iter().enumerate() {
        arr[[i, 0]] = p.x;
        arr[[i, 1]] = p.y;
    }
    arr.into_pyarray(py).unbind()
}

/// The liquid2d Python module entry point.
#[pymodule]
fn liquid2d(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyWorld>()?;
    m.add_class::<PyParticleSystem>()?;
    m.add_class::<PyBoundary>()?;
    Ok(())
}

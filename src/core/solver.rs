//! Per-system step: forces, pressure relaxation, integration and boundary response.
//!
//! One step of a particle system runs these phases in order:
//!
//! 1. gravity and damping on every velocity;
//! 2. contact gathering: the spatial grid is rebuilt from the current positions and
//!    every pair closer than one diameter becomes a contact weighted by its overlap;
//! 3. `velocity_iterations` sweeps over the contacts, pushing crowded pairs apart;
//! 4. optional XSPH viscosity;
//! 5. `position_iterations` sub-steps of integration, each followed by a swept
//!    collision test against the world's boundaries;
//! 6. a finiteness check of the result.
//!
//! Phases 1-5 write to the system's `next_*` buffers only. The world calls
//! [`commit_step`] on every system once all of them succeeded, so a failed step leaves
//! the whole world unchanged.
//!
//! All loops run in index or contact order, so a step is bit-for-bit reproducible.

use crate::core::boundary::{first_crossing, Boundary};
use crate::core::config::{SolverConfig, StepConfig};
use crate::core::math::Vector2D;
use crate::core::particle::{Contact, ParticleSystem};
use crate::error::{Error, Result};

/// Distance kept between a resolved particle and the edge it hit, in radii.
const SLOP_FRACTION: f32 = 0.01;

/// Corrections tried per particle and sub-step before giving up on the move.
const MAX_BOUNCES: usize = 4;

/// Below this distance two particles are treated as coincident.
const COINCIDENT_DIST: f32 = 1e-6;

/// World state every system step reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepContext<'a> {
    pub gravity: Vector2D,
    pub solver: &'a SolverConfig,
    pub boundaries: &'a [Boundary],
    pub step: &'a StepConfig,
}

/// Compute the state of one particle system after `ctx.step.dt` into its `next_*`
/// buffers. Live positions and velocities are not touched.
///
/// Errors: `Error::InvalidArgument` if the step produced a non-finite position or
/// velocity.
pub(crate) fn step_system(ctx: &StepContext<'_>, system: &mut ParticleSystem) -> Result<()> {
    let ParticleSystem {
        positions,
        velocities,
        next_positions,
        next_velocities,
        ..
    } = &mut *system;
    next_positions.clear();
    next_positions.extend_from_slice(positions);
    next_velocities.clear();
    next_velocities.extend_from_slice(velocities);
    if system.is_empty() {
        return Ok(());
    }

    apply_gravity_and_damping(ctx, system);
    gather_contacts(ctx, system);
    for _ in 0..ctx.step.velocity_iterations {
        solve_pressure(ctx, system);
    }
    apply_viscosity(ctx, system);
    integrate_and_collide(ctx, system)
}

/// Make the state computed by [`step_system`] live.
pub(crate) fn commit_step(system: &mut ParticleSystem) {
    std::mem::swap(&mut system.positions, &mut system.next_positions);
    std::mem::swap(&mut system.velocities, &mut system.next_velocities);
}

fn apply_gravity_and_damping(ctx: &StepContext<'_>, system: &mut ParticleSystem) {
    let dt = ctx.step.dt;
    let dv = ctx.gravity * (system.gravity_scale() * dt);
    let damping = (1.0 - system.damping_strength() * dt).max(0.0);
    for v in &mut system.next_velocities {
        *v += dv;
        *v *= damping;
    }
}

/// Rebuild the grid, collect overlapping pairs and derive per-particle pressure.
fn gather_contacts(ctx: &StepContext<'_>, system: &mut ParticleSystem) {
    let diameter = system.diameter();
    let density = system.density();
    let strength = ctx.solver.pressure_strength;
    let n = system.positions.len();

    let ParticleSystem {
        positions,
        grid,
        contacts,
        weights,
        pressures,
        ..
    } = system;

    grid.build(positions);
    contacts.clear();
    weights.clear();
    weights.resize(n, 0.0);

    grid.for_each_pair_within(positions, diameter, |i, j, delta, dist_sq| {
        let dist = dist_sq.sqrt();
        let weight = 1.0 - dist / diameter;
        let normal = if dist > COINCIDENT_DIST {
            delta * (1.0 / dist)
        } else {
            Vector2D::new(1.0, 0.0)
        };
        weights[i] += weight;
        weights[j] += weight;
        contacts.push(Contact {
            a: i as u32,
            b: j as u32,
            weight,
            normal,
        });
    });

    // Local density is the summed overlap weight of a particle's neighbours; pressure
    // builds once it exceeds the rest density, relative to that density.
    pressures.clear();
    pressures.extend(
        weights
            .iter()
            .map(|&w| strength * (w - density).max(0.0) / density),
    );
}

/// One Gauss-Seidel sweep raising the separating speed of pressured contacts.
fn solve_pressure(ctx: &StepContext<'_>, system: &mut ParticleSystem) {
    let reach = system.diameter() / ctx.step.dt;
    let ParticleSystem {
        next_velocities: velocities,
        contacts,
        pressures,
        ..
    } = system;

    for c in contacts.iter() {
        let (a, b) = (c.a as usize, c.b as usize);
        let p = 0.5 * (pressures[a] + pressures[b]);
        if p <= 0.0 {
            continue;
        }
        // Never ask for more than removing the whole overlap in one step.
        let target = p.min(1.0) * c.weight * reach;
        let vn = (velocities[b] - velocities[a]).dot(c.normal);
        if vn >= target {
            continue;
        }
        let dv = c.normal * (0.5 * (target - vn));
        velocities[a] -= dv;
        velocities[b] += dv;
    }
}

fn apply_viscosity(ctx: &StepContext<'_>, system: &mut ParticleSystem) {
    let strength = ctx.solver.viscosity;
    if strength <= 0.0 {
        return;
    }
    let ParticleSystem {
        next_velocities: velocities,
        contacts,
        ..
    } = system;

    for c in contacts.iter() {
        let (a, b) = (c.a as usize, c.b as usize);
        let dv = (velocities[b] - velocities[a]) * (0.5 * strength * c.weight);
        velocities[a] += dv;
        velocities[b] -= dv;
    }
}

fn integrate_and_collide(ctx: &StepContext<'_>, system: &mut ParticleSystem) -> Result<()> {
    let iterations = ctx.step.position_iterations.max(1);
    let sub_dt = ctx.step.dt / iterations as f32;
    let slop = system.radius() * SLOP_FRACTION;
    let restitution = ctx.solver.restitution;

    let ParticleSystem {
        next_positions: positions,
        next_velocities: velocities,
        ..
    } = system;

    for _ in 0..iterations {
        for (x, v) in positions.iter_mut().zip(velocities.iter_mut()) {
            *x = resolve_move(ctx.boundaries, *x, *x + *v * sub_dt, v, slop, restitution);
        }
    }

    if positions.iter().any(|x| !x.is_finite()) || velocities.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid(
            "step produced a non-finite particle state; reduce dt or gravity",
        ));
    }
    Ok(())
}

/// Move a particle centre from `from` towards `to`, stopping `slop` in front of the
/// first edge crossed and reflecting `v` off it. The corrected path is checked again so
/// that a push-out near a corner cannot carry the centre through the adjacent edge; a
/// path still blocked after `MAX_BOUNCES` corrections leaves the particle at `from`.
fn resolve_move(
    boundaries: &[Boundary],
    from: Vector2D,
    to: Vector2D,
    v: &mut Vector2D,
    slop: f32,
    restitution: f32,
) -> Vector2D {
    let mut target = to;
    for _ in 0..MAX_BOUNCES {
        let Some(hit) = first_crossing(boundaries, from, target, slop) else {
            return target;
        };
        let vn = v.dot(hit.normal);
        if vn < 0.0 {
            *v -= hit.normal * ((1.0 + restitution) * vn);
        }
        target = hit.point + hit.normal * slop;
    }
    if first_crossing(boundaries, from, target, slop).is_some() {
        from
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ParticleSystemDef;
    use crate::core::math::Size2D;

    fn ctx<'a>(
        gravity: Vector2D,
        solver: &'a SolverConfig,
        boundaries: &'a [Boundary],
        step: &'a StepConfig,
    ) -> StepContext<'a> {
        StepContext {
            gravity,
            solver,
            boundaries,
            step,
        }
    }

    fn advance(ctx: &StepContext<'_>, s: &mut ParticleSystem) -> Result<()> {
        step_system(ctx, s)?;
        commit_step(s);
        Ok(())
    }

    #[test]
    fn gravity_then_damping() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.1, 6.0, 2.0, 1.0))?;
        s.push_particle(Vector2D::ZERO, Vector2D::ZERO)?;
        let solver = SolverConfig::default();
        let step = StepConfig::new(0.1, 1, 1);
        advance(&ctx(Vector2D::new(0.0, -10.0), &solver, &[], &step), &mut s)?;
        // v = -10 * 2 * 0.1 = -2, damped by (1 - 0.6) = 0.4
        assert!((s.velocities()[0].y + 0.8).abs() < 1e-5);
        assert!((s.positions()[0].y + 0.08).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn damping_factor_never_negative() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.1, 100.0, 1.0, 1.0))?;
        s.push_particle(Vector2D::ZERO, Vector2D::new(5.0, 0.0))?;
        let solver = SolverConfig::default();
        let step = StepConfig::new(0.5, 1, 1);
        advance(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s)?;
        assert_eq!(s.velocities()[0], Vector2D::ZERO);
        Ok(())
    }

    #[test]
    fn sparse_pairs_feel_no_pressure() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.5, 0.0, 1.0, 1.0))?;
        s.push_particle(Vector2D::new(0.0, 0.0), Vector2D::ZERO)?;
        s.push_particle(Vector2D::new(0.5, 0.0), Vector2D::ZERO)?;
        let solver = SolverConfig::default();
        let step = StepConfig::new(0.01, 4, 1);
        advance(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s)?;
        // Summed weight 0.5 is below the target density, so nothing moves.
        assert_eq!(s.velocities()[0], Vector2D::ZERO);
        assert_eq!(s.contacts.len(), 1);
        Ok(())
    }

    #[test]
    fn rest_density_sets_pressure_onset() -> Result<()> {
        // Same pair as above; a rest density below the summed weight of 0.5 pushes.
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.5, 0.0, 1.0, 0.25))?;
        s.push_particle(Vector2D::new(0.0, 0.0), Vector2D::ZERO)?;
        s.push_particle(Vector2D::new(0.5, 0.0), Vector2D::ZERO)?;
        let solver = SolverConfig::default();
        let step = StepConfig::new(0.01, 4, 1);
        advance(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s)?;
        assert!(s.pressures[0] > 0.0);
        assert!(s.velocities()[0].x < 0.0);
        assert!(s.velocities()[1].x > 0.0);
        Ok(())
    }

    #[test]
    fn crowded_particles_are_pushed_apart() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.5, 0.0, 1.0, 1.0))?;
        // A tight cluster: every particle overlaps all the others heavily.
        for k in 0..5 {
            s.push_particle(Vector2D::new(0.05 * k as f32, 0.0), Vector2D::ZERO)?;
        }
        let solver = SolverConfig {
            pressure_strength: 0.5,
            ..SolverConfig::default()
        };
        let step = StepConfig::new(0.01, 4, 1);
        let spread_before = s.positions()[4].x - s.positions()[0].x;
        advance(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s)?;
        let spread_after = s.positions()[4].x - s.positions()[0].x;
        assert!(spread_after > spread_before);
        assert!(s.velocities()[0].x < 0.0);
        assert!(s.velocities()[4].x > 0.0);
        // Momentum is conserved by the pairwise corrections.
        let total: f32 = s.velocities().iter().map(|v| v.x).sum();
        assert!(total.abs() < 1e-2);
        Ok(())
    }

    #[test]
    fn floor_stops_and_reflects() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.1, 0.0, 1.0, 1.0))?;
        s.push_particle(Vector2D::new(0.5, 0.05), Vector2D::new(0.0, -10.0))?;
        let floor = [Boundary::edge_box(Vector2D::ZERO, Size2D::new(1.0, 1.0))?];
        let solver = SolverConfig {
            restitution: 0.5,
            ..SolverConfig::default()
        };
        let step = StepConfig::new(0.1, 1, 1);
        advance(&ctx(Vector2D::ZERO, &solver, &floor, &step), &mut s)?;
        let p = s.positions()[0];
        let v = s.velocities()[0];
        assert!(p.y > 0.0, "particle leaked through the floor: {p:?}");
        assert!((v.y - 5.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn diagonal_move_into_corner_stays_inside() -> Result<()> {
        let tank = [Boundary::edge_box(Vector2D::ZERO, Size2D::new(1.0, 1.0))?];
        let mut v = Vector2D::new(-10.0, -10.0);
        let from = Vector2D::new(0.002, 0.002);
        let to = from + v * 0.1;
        let x = resolve_move(&tank, from, to, &mut v, 0.001, 0.0);
        assert!(x.x > 0.0 && x.y > 0.0, "left the tank: {x:?}");
        assert!(v.x >= 0.0 && v.y >= 0.0);
        Ok(())
    }

    #[test]
    fn viscosity_smooths_relative_velocity() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.5, 0.0, 1.0, 1.0))?;
        s.push_particle(Vector2D::new(0.0, 0.0), Vector2D::new(0.0, 1.0))?;
        s.push_particle(Vector2D::new(0.5, 0.0), Vector2D::new(0.0, -1.0))?;
        let solver = SolverConfig {
            viscosity: 0.5,
            ..SolverConfig::default()
        };
        let step = StepConfig::new(0.01, 1, 1);
        advance(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s)?;
        let rel = (s.velocities()[0] - s.velocities()[1]).length();
        assert!(rel < 2.0);
        Ok(())
    }

    #[test]
    fn non_finite_result_is_rejected_and_positions_kept() -> Result<()> {
        let mut s = ParticleSystem::new(ParticleSystemDef::new(0.5, 0.0, 1.0, 1.0))?;
        s.push_particle(Vector2D::new(1.0, 2.0), Vector2D::new(f32::MAX, 0.0))?;
        let solver = SolverConfig::default();
        let step = StepConfig::new(10.0, 1, 1);
        let err = step_system(&ctx(Vector2D::ZERO, &solver, &[], &step), &mut s).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert_eq!(s.positions()[0], Vector2D::new(1.0, 2.0));
        assert_eq!(s.velocities()[0], Vector2D::new(f32::MAX, 0.0));
        Ok(())
    }
}

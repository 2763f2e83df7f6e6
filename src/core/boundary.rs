//! Static boundaries: edge segments and edge boxes.
//!
//! Boundaries are infinitely rigid and two-sided. Collision is a swept test of the
//! particle centre against every edge, so a particle can never end a sub-step on the
//! other side of an edge it started in front of.

use crate::core::math::{Size2D, Vector2D};
use crate::error::{Error, Result};

/// A line segment from `a` to `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub a: Vector2D,
    pub b: Vector2D,
}

impl Edge {
    pub fn new(a: Vector2D, b: Vector2D) -> Result<Self> {
        if !a.is_finite() || !b.is_finite() {
            return Err(Error::invalid("edge endpoints must be finite"));
        }
        if (b - a).length_squared() <= f32::EPSILON {
            return Err(Error::invalid("edge endpoints must be distinct"));
        }
        Ok(Self { a, b })
    }

    pub fn length(&self) -> f32 {
        (self.b - self.a).length()
    }
}

/// What a boundary was created as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryKind {
    /// A single segment.
    Edge,
    /// A closed rectangle spanning `origin .. origin + size`.
    EdgeBox { origin: Vector2D, size: Size2D },
}

/// A static boundary owned by a world.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    kind: BoundaryKind,
    edges: Vec<Edge>,
}

impl Boundary {
    pub fn edge(a: Vector2D, b: Vector2D) -> Result<Self> {
        Ok(Self {
            kind: BoundaryKind::Edge,
            edges: vec![Edge::new(a, b)?],
        })
    }

    /// Four edges around the rectangle whose lower-left corner is `origin`.
    ///
    /// Errors: `Error::InvalidArgument` if `origin` is non-finite or either dimension
    /// of `size` is not finite and > 0.
    pub fn edge_box(origin: Vector2D, size: Size2D) -> Result<Self> {
        if !origin.is_finite() {
            return Err(Error::invalid("edge box origin must be finite"));
        }
        if !size.is_positive() {
            return Err(Error::invalid(
                "edge box size must be finite with width > 0 and height > 0",
            ));
        }
        let lo = origin;
        let hi = origin + Vector2D::new(size.width, size.height);
        let corners = [
            lo,
            Vector2D::new(hi.x, lo.y),
            hi,
            Vector2D::new(lo.x, hi.y),
        ];
        let edges = (0..4)
            .map(|k| Edge::new(corners[k], corners[(k + 1) % 4]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: BoundaryKind::EdgeBox { origin, size },
            edges,
        })
    }

    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// The first boundary crossing along a swept path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Crossing {
    /// Fraction of the path travelled before the crossing, in `[0, 1]`.
    pub t: f32,
    pub point: Vector2D,
    /// Unit normal of the crossed edge, pointing to the side the path started on.
    pub normal: Vector2D,
    pub boundary: usize,
}

/// Find where the path `from -> to` first crosses any edge.
///
/// The earliest crossing wins; on equal `t` the first-registered boundary (then the
/// first edge of that boundary) wins. Edges are lengthened by `slop` at both ends so
/// that a path through a shared corner is caught.
///
/// A point exactly on an edge's line counts as being on the edge's left-hand side
/// (the side of `perp(b - a)`, which is the inside of an edge box). A path starting
/// on the line and leaving to the right-hand side is therefore a crossing at `t = 0`.
pub(crate) fn first_crossing(
    boundaries: &[Boundary],
    from: Vector2D,
    to: Vector2D,
    slop: f32,
) -> Option<Crossing> {
    let path = to - from;
    let mut best: Option<Crossing> = None;

    for (bi, boundary) in boundaries.iter().enumerate() {
        for edge in &boundary.edges {
            let e = edge.b - edge.a;
            let len = e.length();
            let n = e.perp() * (1.0 / len);

            let s0 = (from - edge.a).dot(n);
            let s1 = (to - edge.a).dot(n);
            let crosses = (s0 > 0.0 && s1 <= 0.0)
                || (s0 == 0.0 && s1 < 0.0)
                || (s0 < 0.0 && s1 >= 0.0);
            if !crosses {
                continue;
            }

            let t = s0 / (s0 - s1);
            let point = from + path * t;
            let along = (point - edge.a).dot(e) / len;
            if along < -slop || along > len + slop {
                continue;
            }

            if best.is_none_or(|b| t < b.t) {
                best = Some(Crossing {
                    t,
                    point,
                    normal: if s0 >= 0.0 { n } else { -n },
                    boundary: bi,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Result<Boundary> {
        Boundary::edge_box(Vector2D::new(0.0, 0.0), Size2D::new(1.0, 1.0))
    }

    #[test]
    fn edge_box_has_four_closed_edges() -> Result<()> {
        let b = unit_box()?;
        assert_eq!(b.edges().len(), 4);
        for k in 0..4 {
            assert_eq!(b.edges()[k].b, b.edges()[(k + 1) % 4].a);
        }
        assert!(matches!(b.kind(), BoundaryKind::EdgeBox { .. }));
        Ok(())
    }

    #[test]
    fn edge_box_rejects_degenerate_size() {
        let err = Boundary::edge_box(Vector2D::ZERO, Size2D::new(0.0, 1.0)).unwrap_err();
        assert!(err.to_string().contains("size"));
        assert!(Boundary::edge_box(Vector2D::ZERO, Size2D::new(1.0, -1.0)).is_err());
        assert!(Boundary::edge_box(Vector2D::new(f32::NAN, 0.0), Size2D::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn edge_rejects_coincident_endpoints() {
        assert!(Boundary::edge(Vector2D::new(1.0, 1.0), Vector2D::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn crossing_the_floor_is_detected() -> Result<()> {
        let b = [unit_box()?];
        let hit = first_crossing(&b, Vector2D::new(0.5, 0.2), Vector2D::new(0.5, -0.2), 1e-4)
            .expect("should cross the floor");
        assert!((hit.t - 0.5).abs() < 1e-6);
        assert!(hit.point.y.abs() < 1e-6);
        // Points back up into the box.
        assert!(hit.normal.y > 0.99);
        Ok(())
    }

    #[test]
    fn staying_inside_is_not_a_crossing() -> Result<()> {
        let b = [unit_box()?];
        assert!(first_crossing(&b, Vector2D::new(0.2, 0.2), Vector2D::new(0.8, 0.7), 1e-4).is_none());
        Ok(())
    }

    #[test]
    fn missing_a_segment_is_not_a_crossing() -> Result<()> {
        let b = [Boundary::edge(Vector2D::new(0.0, 0.0), Vector2D::new(1.0, 0.0))?];
        assert!(first_crossing(&b, Vector2D::new(2.0, 1.0), Vector2D::new(2.0, -1.0), 1e-4).is_none());
        Ok(())
    }

    #[test]
    fn path_starting_on_an_edge_is_stopped() -> Result<()> {
        let b = [unit_box()?];
        let on_floor = Vector2D::new(0.5, 0.0);
        let hit = first_crossing(&b, on_floor, Vector2D::new(0.5, -0.1), 1e-4)
            .expect("leaving through the floor");
        assert_eq!(hit.t, 0.0);
        assert_eq!(hit.point, on_floor);
        assert!(hit.normal.y > 0.99);

        // Moving from the floor line into the box is free.
        assert!(first_crossing(&b, on_floor, Vector2D::new(0.5, 0.1), 1e-4).is_none());
        Ok(())
    }

    #[test]
    fn earliest_crossing_wins() -> Result<()> {
        let b = [
            Boundary::edge(Vector2D::new(-1.0, -2.0), Vector2D::new(1.0, -2.0))?,
            Boundary::edge(Vector2D::new(-1.0, -1.0), Vector2D::new(1.0, -1.0))?,
        ];
        let hit = first_crossing(&b, Vector2D::new(0.0, 0.0), Vector2D::new(0.0, -3.0), 1e-4)
            .expect("crossing");
        assert_eq!(hit.boundary, 1);
        Ok(())
    }

    #[test]
    fn first_registered_wins_on_ties() -> Result<()> {
        let seg = (Vector2D::new(-1.0, -1.0), Vector2D::new(1.0, -1.0));
        let b = [Boundary::edge(seg.0, seg.1)?, Boundary::edge(seg.0, seg.1)?];
        let hit = first_crossing(&b, Vector2D::new(0.0, 0.0), Vector2D::new(0.0, -2.0), 1e-4)
            .expect("crossing");
        assert_eq!(hit.boundary, 0);
        Ok(())
    }
}

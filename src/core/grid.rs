//! Uniform spatial hash grid for neighbor search.
//!
//! Particles are bucketed by the cell containing their position. Cells are
//! unbounded (keyed by integer coordinates in a hash map), so the grid needs no
//! domain bounds. Within the index, particles are sorted by cell and then by
//! particle index, which makes every query visit candidates in a fixed order.

use crate::core::math::Vector2D;
use rustc_hash::FxHashMap;

/// Integer cell coordinates `(cx, cy)`.
pub type CellKey = (i32, i32);

/// Offsets of a cell and its 8 neighbors, row by row from the bottom.
const NEIGHBOR_OFFSETS: [(i32, i32); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Clone, Default)]
pub struct SpatialGrid {
    cell_size: f32,
    inv_cell_size: f32,
    /// (cell, particle index) sorted by cell then index.
    entries: Vec<(CellKey, u32)>,
    /// cell -> [start, end) range into `entries`.
    cells: FxHashMap<CellKey, (u32, u32)>,
}

impl SpatialGrid {
    /// Create an empty grid. `cell_size` must be finite and > 0.
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size.is_finite() && cell_size > 0.0);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            entries: Vec::new(),
            cells: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of indexed particles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cell containing `p`.
    #[inline]
    pub fn cell_of(&self, p: Vector2D) -> CellKey {
        (
            (p.x * self.inv_cell_size).floor() as i32,
            (p.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Rebuild the index from scratch.
    pub fn build(&mut self, positions: &[Vector2D]) {
        self.entries.clear();
        self.cells.clear();

        let inv = self.inv_cell_size;
        self.entries.extend(positions.iter().enumerate().map(|(i, p)| {
            let key = ((p.x * inv).floor() as i32, (p.y * inv).floor() as i32);
            (key, i as u32)
        }));
        self.entries.sort_unstable();

        let n = self.entries.len();
        let mut start = 0usize;
        while start < n {
            let key = self.entries[start].0;
            let mut end = start + 1;
            while end < n && self.entries[end].0 == key {
                end += 1;
            }
            self.cells.insert(key, (start as u32, end as u32));
            start = end;
        }
    }

    /// Visit every particle in the cell of `p` and its 8 neighbors.
    ///
    /// This is a superset of all particles within `cell_size` of `p` as long as the
    /// grid was built from the positions being queried.
    pub fn for_each_candidate(&self, p: Vector2D, mut f: impl FnMut(usize)) {
        let (cx, cy) = self.cell_of(p);
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let key = (cx.wrapping_add(dx), cy.wrapping_add(dy));
            if let Some(&(start, end)) = self.cells.get(&key) {
                for &(_, j) in &self.entries[start as usize..end as usize] {
                    f(j as usize);
                }
            }
        }
    }

    /// Candidate neighbor indices of `p`, self included.
    pub fn candidates(&self, p: Vector2D) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_candidate(p, |j| out.push(j));
        out
    }

    /// Visit every unordered pair `(i, j)`, `i < j`, closer than `max_dist`.
    ///
    /// The callback receives the pair, the offset `positions[j] - positions[i]` and its
    /// squared length. Pairs are visited by ascending `i`, then in candidate order.
    /// `max_dist` must not exceed the cell size.
    pub fn for_each_pair_within(
        &self,
        positions: &[Vector2D],
        max_dist: f32,
        mut f: impl FnMut(usize, usize, Vector2D, f32),
    ) {
        debug_assert!(max_dist <= self.cell_size * (1.0 + 1e-6));
        let max_sq = max_dist * max_dist;
        for (i, &pi) in positions.iter().enumerate() {
            self.for_each_candidate(pi, |j| {
                if j <= i {
                    return;
                }
                let d = positions[j] - pi;
                let dist_sq = d.length_squared();
                if dist_sq < max_sq {
                    f(i, j, d, dist_sq);
                }
            });
        }
    }
}

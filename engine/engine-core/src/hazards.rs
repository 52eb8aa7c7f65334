//! Hazard ("puddle") squares and their randomized placement.

use crate::error::EngineError;
use rand::Rng;
use tracing::debug;

/// Placement restarts from an empty board this many times before giving up.
pub const MAX_PLACEMENT_ROUNDS: u32 = 16;

/// An axis-aligned `size x size` square identified by its top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hazard {
    pub row: usize,
    pub col: usize,
    pub size: usize,
}

impl Hazard {
    pub fn new(row: usize, col: usize, size: usize) -> Self {
        Self { row, col, size }
    }

    /// Whether the cell `(row, col)` lies inside this square.
    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row && row < self.row + self.size && col >= self.col && col < self.col + self.size
    }

    /// Whether two squares share at least one cell.
    pub fn overlaps(&self, other: &Hazard) -> bool {
        self.row < other.row + other.size
            && other.row < self.row + self.size
            && self.col < other.col + other.size
            && other.col < self.col + self.size
    }

    /// Whether the square is anchored on the start cell `(0, 0)`.
    #[inline]
    pub fn at_start(&self) -> bool {
        self.row == 0 && self.col == 0
    }

    /// Whether the square fits entirely inside an `n x n` grid.
    pub fn fits(&self, grid_size: usize) -> bool {
        self.size > 0 && self.row + self.size <= grid_size && self.col + self.size <= grid_size
    }

    /// All cells covered, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row..self.row + self.size)
            .flat_map(move |r| (self.col..self.col + self.size).map(move |c| (r, c)))
    }
}

/// Check a candidate against the placement rules: anchored off the start
/// cell, clear of the goal cell and of every hazard already placed.
pub fn is_valid_placement(candidate: &Hazard, placed: &[Hazard], grid_size: usize) -> bool {
    let goal = grid_size - 1;
    candidate.fits(grid_size)
        && !candidate.at_start()
        && !candidate.contains(goal, goal)
        && !placed.iter().any(|h| h.overlaps(candidate))
}

/// Place `count` non-overlapping squares of side `hazard_size` by
/// rejection sampling.
///
/// Each round draws at most `attempts_per_round` candidates. A round that
/// cannot finish (sequential placement can paint itself into a corner even
/// when a packing exists) restarts from an empty board, up to
/// [`MAX_PLACEMENT_ROUNDS`] times.
///
/// # Errors
/// Returns [`EngineError::HazardPlacementInfeasible`] instead of placing
/// fewer hazards than requested.
pub fn place_hazards<R: Rng>(
    grid_size: usize,
    hazard_size: usize,
    count: usize,
    attempts_per_round: u32,
    rng: &mut R,
) -> Result<Vec<Hazard>, EngineError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if hazard_size == 0 || hazard_size > grid_size {
        return Err(EngineError::HazardPlacementInfeasible {
            requested: count,
            placed: 0,
            hazard_size,
            grid_size,
            rounds: 0,
        });
    }

    let max_origin = grid_size - hazard_size;
    let mut best = 0;

    for round in 1..=MAX_PLACEMENT_ROUNDS {
        let mut placed = Vec::with_capacity(count);
        let mut attempts = 0;

        while placed.len() < count && attempts < attempts_per_round {
            attempts += 1;
            let candidate = Hazard::new(
                rng.gen_range(0..=max_origin),
                rng.gen_range(0..=max_origin),
                hazard_size,
            );
            if is_valid_placement(&candidate, &placed, grid_size) {
                placed.push(candidate);
            }
        }

        if placed.len() == count {
            return Ok(placed);
        }
        best = best.max(placed.len());
        debug!(
            round,
            placed = placed.len(),
            requested = count,
            "Hazard placement round exhausted, restarting"
        );
    }

    Err(EngineError::HazardPlacementInfeasible {
        requested: count,
        placed: best,
        hazard_size,
        grid_size,
        rounds: MAX_PLACEMENT_ROUNDS,
    })
}

//! Cartesian process grid: worker coordinates and non-periodic neighbours.
//!
//! Ranks are embedded row-major, `rank = x * py + y`, which is the layout an
//! MPI Cartesian communicator produces without reordering. Every worker
//! evaluates the same closed-form mapping, so neighbour relations agree
//! without any communication.

use crate::poisson_error::{PoissonError, Result};

/// One side of a tile. `Top`/`Bottom` step along y, `Left`/`Right` along x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Top,
    Bottom,
    Left,
    Right,
}

impl Direction {
    /// Order in which the halo protocol visits the four sides.
    pub const ALL: [Direction; 4] = [
        Direction::Top,
        Direction::Bottom,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Axis index (`0` = x, `1` = y) and unit step along it.
    pub fn offset(self) -> (usize, isize) {
        match self {
            Direction::Top => (1, -1),
            Direction::Bottom => (1, 1),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    /// Position in [`Direction::ALL`].
    pub fn index(self) -> usize {
        match self {
            Direction::Top => 0,
            Direction::Bottom => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}

/// Ranks of the four neighbours, `None` at a domain edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Neighbors([Option<usize>; 4]);

impl Neighbors {
    pub fn get(&self, dir: Direction) -> Option<usize> {
        self.0[dir.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|r| (d, r)))
    }

    pub fn count(&self) -> usize {
        self.0.iter().flatten().count()
    }
}

/// This worker's place in a `px × py` process grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessGrid {
    shape: [usize; 2],
    rank: usize,
    coord: [usize; 2],
    neighbors: Neighbors,
}

impl ProcessGrid {
    /// Validate `shape` against the actual worker count and place `rank`.
    ///
    /// # Errors
    /// - [`PoissonError::InvalidTopology`] if an extent is zero or `rank >= size`.
    /// - [`PoissonError::TopologyMismatch`] if `px * py != size`.
    pub fn new(shape: [usize; 2], rank: usize, size: usize) -> Result<Self> {
        let [px, py] = shape;
        if px == 0 || py == 0 {
            return Err(PoissonError::InvalidTopology(format!(
                "process grid extents must be positive, got {px}x{py}"
            )));
        }
        if px.checked_mul(py) != Some(size) {
            return Err(PoissonError::TopologyMismatch {
                px,
                py,
                workers: size,
            });
        }
        if rank >= size {
            return Err(PoissonError::InvalidTopology(format!(
                "rank {rank} outside a world of {size} workers"
            )));
        }
        let coord = [rank / py, rank % py];
        let mut grid = ProcessGrid {
            shape,
            rank,
            coord,
            neighbors: Neighbors::default(),
        };
        for dir in Direction::ALL {
            grid.neighbors.0[dir.index()] = grid.shift(dir);
        }
        log::debug!(
            "rank {rank} at ({}, {}) of {px}x{py}: {:?}",
            coord[0],
            coord[1],
            grid.neighbors
        );
        Ok(grid)
    }

    /// Single worker owning the whole domain.
    pub fn serial() -> Self {
        ProcessGrid {
            shape: [1, 1],
            rank: 0,
            coord: [0, 0],
            neighbors: Neighbors::default(),
        }
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    pub fn coord(&self) -> [usize; 2] {
        self.coord
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    pub fn neighbor(&self, dir: Direction) -> Option<usize> {
        self.neighbors.get(dir)
    }

    /// Rank at `coord`, or `None` outside the grid.
    pub fn rank_of(&self, coord: [usize; 2]) -> Option<usize> {
        (coord[0] < self.shape[0] && coord[1] < self.shape[1])
            .then(|| coord[0] * self.shape[1] + coord[1])
    }

    fn shift(&self, dir: Direction) -> Option<usize> {
        let (axis, step) = dir.offset();
        let mut c = self.coord;
        c[axis] = c[axis].checked_add_signed(step)?;
        self.rank_of(c)
    }
}

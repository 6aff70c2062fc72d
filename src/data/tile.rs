//! Padded local tiles: owned interior plus a one-cell halo ring.
//!
//! Storage is one contiguous x-major buffer of `dim_x × dim_y` values where
//! `dim = extent + 2`; `index(x, y) = x * dim_y + y`. Local index `0` and
//! `dim - 1` on either axis are halo cells. Local interior index `i`
//! corresponds to global (1-based) coordinate `offset + i`.

use crate::data::partition::OwnedRegion;
use crate::data::problem::ProblemDescriptor;
use crate::poisson_error::{PoissonError, Result};
use crate::topology::{Direction, ProcessGrid};
use itertools::iproduct;

/// `dims[0] * dims[1]`, or an allocation error when the product overflows.
pub(crate) fn checked_cells(what: &'static str, dims: [usize; 2]) -> Result<usize> {
    dims[0].checked_mul(dims[1]).ok_or(PoissonError::Allocation {
        what,
        cells: usize::MAX,
    })
}

pub(crate) fn try_zeroed<T: Clone>(what: &'static str, cells: usize, zero: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(cells)
        .map_err(|_| PoissonError::Allocation { what, cells })?;
    v.resize(cells, zero);
    Ok(v)
}

/// A padded 2D array of `f64` covering one worker's region.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    offset: [usize; 2],
    dim: [usize; 2],
    data: Vec<f64>,
}

impl Tile {
    /// Zero-initialised tile for `region`.
    pub fn zeros(region: &OwnedRegion) -> Result<Self> {
        let padded = |n: usize| {
            n.checked_add(2).ok_or(PoissonError::Allocation {
                what: "tile",
                cells: usize::MAX,
            })
        };
        let dim = [padded(region.extent[0])?, padded(region.extent[1])?];
        Ok(Tile {
            offset: region.offset,
            dim,
            data: try_zeroed("tile", checked_cells("tile", dim)?, 0.0)?,
        })
    }

    /// Zero-initialised tile with the same shape and offset as `self`.
    pub fn zeros_like(&self) -> Result<Self> {
        Ok(Tile {
            offset: self.offset,
            dim: self.dim,
            data: try_zeroed("tile", self.data.len(), 0.0)?,
        })
    }

    pub fn offset(&self) -> [usize; 2] {
        self.offset
    }

    /// Padded dimensions, halo included.
    pub fn dim(&self) -> [usize; 2] {
        self.dim
    }

    /// Number of owned cells per axis.
    pub fn extent(&self) -> [usize; 2] {
        [self.dim[0] - 2, self.dim[1] - 2]
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.dim[0] && y < self.dim[1]);
        x * self.dim[1] + y
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Sum of the four stencil neighbours of local cell `(x, y)`.
    #[inline]
    pub fn neighbor_sum(&self, x: usize, y: usize) -> f64 {
        let i = self.index(x, y);
        let stride = self.dim[1];
        self.data[i + stride] + self.data[i - stride] + self.data[i + 1] + self.data[i - 1]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Local indices of all interior cells in x-major order.
    pub fn interior(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        iproduct!(1..self.dim[0] - 1, 1..self.dim[1] - 1)
    }

    /// 1-based global coordinate of a local index.
    pub fn to_global(&self, x: usize, y: usize) -> [usize; 2] {
        [x + self.offset[0], y + self.offset[1]]
    }

    /// Local index of a global cell, if it lies in the interior.
    pub fn to_local(&self, global: [usize; 2]) -> Option<[usize; 2]> {
        let x = global[0].checked_sub(self.offset[0])?;
        let y = global[1].checked_sub(self.offset[1])?;
        (x > 0 && x < self.dim[0] - 1 && y > 0 && y < self.dim[1] - 1).then_some([x, y])
    }

    /// Interior dot product with a tile of the same shape.
    pub fn dot_interior(&self, other: &Tile) -> f64 {
        debug_assert_eq!(self.dim, other.dim);
        self.interior()
            .map(|(x, y)| {
                let i = self.index(x, y);
                self.data[i] * other.data[i]
            })
            .sum()
    }

    /// Number of values in the line along `side` (a row for top/bottom,
    /// a column for left/right), corners excluded.
    pub fn line_len(&self, side: Direction) -> usize {
        match side {
            Direction::Top | Direction::Bottom => self.dim[0] - 2,
            Direction::Left | Direction::Right => self.dim[1] - 2,
        }
    }

    /// Local indices of the line `depth` cells in from `side`
    /// (`0` = halo, `1` = outermost interior line).
    fn line(&self, side: Direction, depth: usize) -> impl Iterator<Item = usize> + '_ {
        let [dx, dy] = self.dim;
        let (fixed, along_x) = match side {
            Direction::Top => (depth, true),
            Direction::Bottom => (dy - 1 - depth, true),
            Direction::Left => (depth, false),
            Direction::Right => (dx - 1 - depth, false),
        };
        let n = self.line_len(side);
        (1..=n).map(move |k| {
            if along_x {
                self.index(k, fixed)
            } else {
                self.index(fixed, k)
            }
        })
    }

    /// Copy a line into `out` (cleared first).
    pub fn pack_line(&self, side: Direction, depth: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.line(side, depth).map(|i| self.data[i]));
    }

    /// Overwrite a line from `values`; lengths must match.
    pub fn unpack_line(&mut self, side: Direction, depth: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.line_len(side));
        let idx: Vec<usize> = self.line(side, depth).collect();
        for (i, v) in idx.into_iter().zip(values) {
            self.data[i] = *v;
        }
    }
}

/// Marks cells whose value is pinned by a point source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMask {
    dim: [usize; 2],
    fixed: Vec<bool>,
}

impl SourceMask {
    pub fn for_tile(tile: &Tile) -> Result<Self> {
        let dim = tile.dim();
        Ok(SourceMask {
            dim,
            fixed: try_zeroed("source mask", checked_cells("source mask", dim)?, false)?,
        })
    }

    #[inline]
    pub fn is_fixed(&self, x: usize, y: usize) -> bool {
        self.fixed[x * self.dim[1] + y]
    }

    pub fn fix(&mut self, x: usize, y: usize) {
        self.fixed[x * self.dim[1] + y] = true;
    }

    pub fn count(&self) -> usize {
        self.fixed.iter().filter(|&&f| f).count()
    }
}

/// Everything one worker owns: the field, its source mask and its region.
#[derive(Clone, Debug)]
pub struct LocalGrid {
    pub phi: Tile,
    pub mask: SourceMask,
    region: OwnedRegion,
}

impl LocalGrid {
    /// Allocate the worker's tile and place the sources that fall inside
    /// its interior. Sources owned by other workers are skipped.
    pub fn setup(problem: &ProblemDescriptor, grid: &ProcessGrid) -> Result<Self> {
        let region = OwnedRegion::for_worker(problem.grid_size, grid.shape(), grid.coord())?;
        let mut phi = Tile::zeros(&region)?;
        let mut mask = SourceMask::for_tile(&phi)?;
        for source in &problem.sources {
            if let Some([x, y]) = phi.to_local(source.cell(problem.grid_size)) {
                phi.set(x, y, source.value);
                mask.fix(x, y);
            }
        }
        log::debug!(
            "rank {} owns {}x{} cells at offset {:?} with {} sources",
            grid.rank(),
            region.extent[0],
            region.extent[1],
            region.offset,
            mask.count()
        );
        Ok(LocalGrid { phi, mask, region })
    }

    pub fn region(&self) -> &OwnedRegion {
        &self.region
    }

    /// Global parity offset `offset_x + offset_y` used by red-black sweeps.
    pub fn parity_offset(&self) -> usize {
        self.region.offset[0] + self.region.offset[1]
    }

    /// `(global_x, global_y, value)` for every owned cell, x-major.
    pub fn owned_values(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.phi.interior().map(|(x, y)| {
            let [gx, gy] = self.phi.to_global(x, y);
            (gx, gy, self.phi.get(x, y))
        })
    }
}

//! Block partition of the global grid across the process grid.

use crate::poisson_error::{PoissonError, Result};
use std::ops::Range;

/// Cells `floor(n·index/parts) .. floor(n·(index+1)/parts)` (0-based, half open).
///
/// Consecutive ranges tile `0..n` and their lengths differ by at most one.
pub fn block_range(n: usize, parts: usize, index: usize) -> Range<usize> {
    debug_assert!(index < parts);
    let lo = (n as u128 * index as u128 / parts as u128) as usize;
    let hi = (n as u128 * (index as u128 + 1) / parts as u128) as usize;
    lo..hi
}

/// Rectangle of the global grid owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnedRegion {
    /// Global coordinate of the cell before the first owned one; owned cells
    /// are `offset + 1 ..= offset + extent` in 1-based global numbering.
    pub offset: [usize; 2],
    pub extent: [usize; 2],
}

impl OwnedRegion {
    /// Region of the worker at `coord` in a `shape` process grid.
    ///
    /// # Errors
    /// [`PoissonError::InvalidProblem`] when an axis has fewer cells than
    /// workers, which would leave a worker without interior cells.
    pub fn for_worker(grid_size: [usize; 2], shape: [usize; 2], coord: [usize; 2]) -> Result<Self> {
        for axis in 0..2 {
            if grid_size[axis] < shape[axis] {
                return Err(PoissonError::InvalidProblem(format!(
                    "{} cells along axis {axis} cannot be split across {} workers",
                    grid_size[axis], shape[axis]
                )));
            }
        }
        let rx = block_range(grid_size[0], shape[0], coord[0]);
        let ry = block_range(grid_size[1], shape[1], coord[1]);
        Ok(OwnedRegion {
            offset: [rx.start, ry.start],
            extent: [rx.len(), ry.len()],
        })
    }

    pub fn cells(&self) -> usize {
        self.extent[0] * self.extent[1]
    }

    /// Whether the 1-based global cell lies inside this region.
    pub fn contains(&self, global: [usize; 2]) -> bool {
        (0..2).all(|a| global[a] > self.offset[a] && global[a] <= self.offset[a] + self.extent[a])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_tile_the_axis() {
        let n = 10;
        let parts = 3;
        let ranges: Vec<_> = (0..parts).map(|i| block_range(n, parts, i)).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn region_contains_its_cells_only() {
        let r = OwnedRegion::for_worker([10, 7], [2, 2], [1, 0]).unwrap();
        assert_eq!(r.offset, [5, 0]);
        assert_eq!(r.extent, [5, 3]);
        assert!(r.contains([6, 1]));
        assert!(r.contains([10, 3]));
        assert!(!r.contains([5, 1]));
        assert!(!r.contains([6, 4]));
        assert!(!r.contains([6, 0]));
    }

    #[test]
    fn too_many_workers_for_axis() {
        assert!(OwnedRegion::for_worker([2, 8], [3, 1], [0, 0]).is_err());
    }
}

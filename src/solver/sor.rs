//! Red-black successive over-relaxation.

use super::StepKernel;
use crate::algs::communicator::{Communicator, max_keep_nan};
use crate::algs::halo::HaloExchange;
use crate::data::tile::LocalGrid;
use crate::poisson_error::Result;

/// Over-relaxation factor used unless configured otherwise.
pub const DEFAULT_OMEGA: f64 = 1.95;

/// Update every non-source interior cell of one colour and return the
/// largest absolute change (NaN if any update was NaN).
///
/// A cell has colour `parity` when `(global_x + global_y) % 2 == parity`.
/// Cells of one colour only read cells of the other, so the order of the
/// updates inside a sweep does not matter.
pub fn half_sweep(grid: &mut LocalGrid, parity: usize, omega: f64) -> f64 {
    let parity_offset = grid.parity_offset();
    let mut max_delta = 0.0f64;
    for (x, y) in grid.phi.interior() {
        if (x + y + parity_offset) % 2 != parity || grid.mask.is_fixed(x, y) {
            continue;
        }
        let old = grid.phi.get(x, y);
        let c = grid.phi.neighbor_sum(x, y) * 0.25 - old;
        let new = old + omega * c;
        grid.phi.set(x, y, new);
        max_delta = max_keep_nan(max_delta, (old - new).abs());
    }
    max_delta
}

/// SOR kernel state: the relaxation factor and the field's halo exchanger.
#[derive(Clone, Debug)]
pub struct SorKernel {
    omega: f64,
    halo: HaloExchange,
}

impl SorKernel {
    pub fn new(omega: f64, halo: HaloExchange) -> Self {
        Self { omega, halo }
    }
}

impl StepKernel for SorKernel {
    /// Fill the field halo so the first sweep sees neighbouring sources.
    fn init<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        self.halo.exchange(&mut grid.phi, comm)?;
        Ok(f64::INFINITY)
    }

    /// Both colours, each followed by a halo exchange; returns the global
    /// maximum update of the iteration.
    fn advance<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        let d0 = half_sweep(grid, 0, self.omega);
        self.halo.exchange(&mut grid.phi, comm)?;
        let d1 = half_sweep(grid, 1, self.omega);
        self.halo.exchange(&mut grid.phi, comm)?;
        // NaN is not ordered under MPI_MAX; infinity is.
        let local = max_keep_nan(d0, d1);
        let local = if local.is_finite() { local } else { f64::INFINITY };
        comm.allreduce_max(local)
    }
}

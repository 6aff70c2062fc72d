//! Distributed conjugate gradient without preconditioning.
//!
//! The operator is `A = I − ¼·(sum of 4 neighbours)` on free cells and the
//! identity on source cells. The residual is zero on source cells from the
//! start, so the search direction stays zero there and `phi` keeps the pinned
//! values. Convergence compares the un-rooted global `r·r` with the
//! precision goal.

use super::StepKernel;
use crate::algs::communicator::Communicator;
use crate::algs::halo::HaloExchange;
use crate::data::tile::{LocalGrid, Tile};
use crate::poisson_error::{PoissonError, Result};

/// Search direction `p`, residual `r`, product `v = A·p` and the global `r·r`.
#[derive(Clone, Debug)]
pub struct CgKernel {
    p: Tile,
    r: Tile,
    v: Tile,
    rho: f64,
    iteration: usize,
    halo: HaloExchange,
}

impl CgKernel {
    /// Allocate the three work tiles shaped like `grid.phi`.
    pub fn new(grid: &LocalGrid, halo: HaloExchange) -> Result<Self> {
        Ok(Self {
            p: grid.phi.zeros_like()?,
            r: grid.phi.zeros_like()?,
            v: grid.phi.zeros_like()?,
            rho: 0.0,
            iteration: 0,
            halo,
        })
    }

    /// Global squared residual norm after the last init/advance.
    pub fn residual_norm_sq(&self) -> f64 {
        self.rho
    }

    pub fn residual(&self) -> &Tile {
        &self.r
    }

    pub fn direction(&self) -> &Tile {
        &self.p
    }

    /// `v = A·p` on the interior; `p`'s halo must be current.
    fn apply_operator(&mut self, grid: &LocalGrid) {
        for (x, y) in self.p.interior() {
            let mut v = self.p.get(x, y);
            if !grid.mask.is_fixed(x, y) {
                v -= self.p.neighbor_sum(x, y) * 0.25;
            }
            self.v.set(x, y, v);
        }
    }
}

impl StepKernel for CgKernel {
    /// Residual of the starting field and the initial global `r·r`.
    fn init<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        self.halo.exchange(&mut grid.phi, comm)?;
        let mut local = 0.0;
        for (x, y) in grid.phi.interior() {
            let r = if grid.mask.is_fixed(x, y) {
                0.0
            } else {
                grid.phi.neighbor_sum(x, y) * 0.25 - grid.phi.get(x, y)
            };
            self.r.set(x, y, r);
            self.p.set(x, y, r);
            local += r * r;
        }
        self.rho = comm.allreduce_sum(local)?;
        self.iteration = 0;
        log::debug!("rank {}: initial CG residual {:e}", comm.rank(), self.rho);
        Ok(self.rho)
    }

    fn advance<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        self.halo.exchange(&mut self.p, comm)?;
        self.apply_operator(grid);

        let p_dot_v = comm.allreduce_sum(self.p.dot_interior(&self.v))?;
        if p_dot_v == 0.0 || !p_dot_v.is_finite() {
            return Err(PoissonError::CgBreakdown {
                iteration: self.iteration,
                denominator: p_dot_v,
            });
        }
        let alpha = self.rho / p_dot_v;

        let mut local = 0.0;
        for (x, y) in grid.phi.interior() {
            let i = grid.phi.index(x, y);
            let p = self.p.as_slice()[i];
            grid.phi.as_mut_slice()[i] += alpha * p;
            let r = &mut self.r.as_mut_slice()[i];
            *r -= alpha * self.v.as_slice()[i];
            local += *r * *r;
        }
        let rho_new = comm.allreduce_sum(local)?;

        let beta = rho_new / self.rho;
        self.rho = rho_new;
        for (x, y) in self.p.interior() {
            let i = self.p.index(x, y);
            let r = self.r.as_slice()[i];
            let p = &mut self.p.as_mut_slice()[i];
            *p = r + beta * *p;
        }
        self.iteration += 1;
        Ok(self.rho)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::problem::ProblemDescriptor;
    use crate::topology::ProcessGrid;

    fn setup(problem: &ProblemDescriptor) -> (LocalGrid, CgKernel) {
        let serial = ProcessGrid::serial();
        let grid = LocalGrid::setup(problem, &serial).unwrap();
        let cg = CgKernel::new(&grid, HaloExchange::new(&serial)).unwrap();
        (grid, cg)
    }

    #[test]
    fn initial_residual_is_zero_on_sources() {
        let problem = ProblemDescriptor::new([3, 3], 1e-6, 10).with_source(0.5, 0.5, 4.0);
        let (mut grid, mut cg) = setup(&problem);
        let rho = cg.init(&mut grid, &NoComm).unwrap();
        assert_eq!(cg.residual().get(2, 2), 0.0);
        assert_eq!(cg.residual().get(1, 2), 1.0);
        assert_eq!(cg.residual().get(1, 1), 0.0);
        assert_eq!(rho, 4.0);
        assert_eq!(cg.direction(), cg.residual());
    }

    #[test]
    fn zero_residual_breaks_down_instead_of_dividing() {
        let problem = ProblemDescriptor::new([2, 2], 1e-6, 10);
        let (mut grid, mut cg) = setup(&problem);
        assert_eq!(cg.init(&mut grid, &NoComm).unwrap(), 0.0);
        let err = cg.advance(&mut grid, &NoComm).unwrap_err();
        assert!(matches!(err, PoissonError::CgBreakdown { iteration: 0, .. }));
    }

    #[test]
    fn sources_are_invariant() {
        let problem = ProblemDescriptor::new([7, 6], 1e-14, 100)
            .with_source(0.3, 0.3, 2.0)
            .with_source(0.8, 0.5, -1.0);
        let (mut grid, mut cg) = setup(&problem);
        cg.init(&mut grid, &NoComm).unwrap();
        for _ in 0..10 {
            if cg.residual_norm_sq() < 1e-28 {
                break;
            }
            cg.advance(&mut grid, &NoComm).unwrap();
        }
        assert_eq!(grid.phi.get(3, 2), 2.0);
        assert_eq!(grid.phi.get(6, 4), -1.0);
    }
}

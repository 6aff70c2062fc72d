//! Solve driver: kernel selection and the convergence loop.
//!
//! The driver is kernel-agnostic. It asks the selected [`StepKernel`] for an
//! initial measure, then advances while the globally reduced measure is above
//! the precision goal and the iteration cap is not reached. The measure is
//! the maximum pointwise update for SOR and the squared residual norm for CG;
//! both are reduced collectively, so every worker leaves the loop on the
//! same iteration.

pub mod cg;
pub mod sor;

pub use cg::CgKernel;
pub use sor::{DEFAULT_OMEGA, SorKernel};

use crate::algs::communicator::Communicator;
use crate::algs::halo::HaloExchange;
use crate::data::problem::ProblemDescriptor;
use crate::data::tile::LocalGrid;
use crate::poisson_error::{PoissonError, Result};
use crate::topology::ProcessGrid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One iteration of a distributed kernel.
pub trait StepKernel {
    /// Prepare kernel state; returns the measure before the first iteration
    /// (`+inf` when none is available yet).
    fn init<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64>;
    /// Run one iteration; returns the global convergence measure.
    fn advance<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64>;
}

/// Numerical method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Red-black successive over-relaxation.
    #[default]
    Sor,
    /// Conjugate gradient.
    Cg,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Sor => "sor",
            Method::Cg => "cg",
        })
    }
}

impl FromStr for Method {
    type Err = PoissonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sor" => Ok(Method::Sor),
            "cg" => Ok(Method::Cg),
            other => Err(PoissonError::InvalidConfig(format!(
                "unknown method `{other}` (expected `sor` or `cg`)"
            ))),
        }
    }
}

/// Kernel selection and parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: Method,
    /// Over-relaxation factor, used by SOR only.
    #[serde(default = "default_omega")]
    pub omega: f64,
}

fn default_omega() -> f64 {
    DEFAULT_OMEGA
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: Method::Sor,
            omega: DEFAULT_OMEGA,
        }
    }
}

impl SolverConfig {
    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.method == Method::Sor && !(self.omega > 0.0 && self.omega < 2.0) {
            return Err(PoissonError::InvalidConfig(format!(
                "SOR requires 0 < omega < 2, got {}",
                self.omega
            )));
        }
        Ok(())
    }
}

/// Why the iteration loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The global measure reached the precision goal.
    Converged,
    /// `max_iter` iterations ran without reaching the goal.
    IterationLimit,
}

/// Outcome of a solve, identical on every worker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// Last global measure (max update for SOR, `r·r` for CG).
    pub measure: f64,
    pub termination: Termination,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Kernel chosen at run time.
#[derive(Clone, Debug)]
pub enum Kernel {
    Sor(SorKernel),
    Cg(CgKernel),
}

impl Kernel {
    /// Build the kernel for `config`; CG allocates its work tiles here.
    pub fn new(config: &SolverConfig, grid: &LocalGrid, topology: &ProcessGrid) -> Result<Self> {
        let halo = HaloExchange::new(topology);
        Ok(match config.method {
            Method::Sor => Kernel::Sor(SorKernel::new(config.omega, halo)),
            Method::Cg => Kernel::Cg(CgKernel::new(grid, halo)?),
        })
    }
}

impl StepKernel for Kernel {
    fn init<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        match self {
            Kernel::Sor(k) => k.init(grid, comm),
            Kernel::Cg(k) => k.init(grid, comm),
        }
    }

    fn advance<C: Communicator>(&mut self, grid: &mut LocalGrid, comm: &C) -> Result<f64> {
        match self {
            Kernel::Sor(k) => k.advance(grid, comm),
            Kernel::Cg(k) => k.advance(grid, comm),
        }
    }
}

/// Runs the convergence loop for one worker.
#[derive(Clone, Debug)]
pub struct Solver {
    config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Iterate until `measure <= precision_goal` or `max_iter` iterations ran.
    pub fn solve<C: Communicator>(
        &self,
        problem: &ProblemDescriptor,
        topology: &ProcessGrid,
        grid: &mut LocalGrid,
        comm: &C,
    ) -> Result<SolveReport> {
        let mut kernel = Kernel::new(&self.config, grid, topology)?;
        run_loop(&mut kernel, problem, grid, comm)
    }
}

/// The kernel-agnostic loop behind [`Solver::solve`].
pub fn run_loop<K: StepKernel, C: Communicator>(
    kernel: &mut K,
    problem: &ProblemDescriptor,
    grid: &mut LocalGrid,
    comm: &C,
) -> Result<SolveReport> {
    let goal = problem.precision_goal;
    let mut measure = kernel.init(grid, comm)?;
    let mut iterations = 0;
    // `init` may report +inf to force a first iteration; NaN is never valid.
    if measure.is_nan() {
        return Err(PoissonError::NonFinite {
            iteration: 0,
            measure,
        });
    }
    while measure > goal && iterations < problem.max_iter {
        measure = kernel.advance(grid, comm)?;
        iterations += 1;
        log::trace!("rank {} iteration {iterations}: {measure:e}", comm.rank());
        if !measure.is_finite() {
            log::error!(
                "rank {}: measure became {measure} at iteration {iterations}",
                comm.rank()
            );
            return Err(PoissonError::NonFinite {
                iteration: iterations,
                measure,
            });
        }
    }
    let termination = if measure > goal {
        log::warn!(
            "rank {}: iteration limit {} reached, measure {measure:e} > goal {goal:e}",
            comm.rank(),
            problem.max_iter
        );
        Termination::IterationLimit
    } else {
        Termination::Converged
    };
    Ok(SolveReport {
        iterations,
        measure,
        termination,
    })
}

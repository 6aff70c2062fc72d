#![cfg_attr(docsrs, feature(doc_cfg))]
//! # halo-poisson
//!
//! halo-poisson solves the 2D Poisson problem on a uniform grid with point
//! sources, distributed over a rectangular grid of workers. Each worker owns
//! one block of the global grid plus a one-cell halo ring, refreshed from its
//! neighbours by a four-message halo exchange.
//!
//! ## Features
//! - Cartesian process grid with non-periodic neighbour lookup
//! - Block partition of the global grid with padded per-worker tiles
//! - Red-black SOR and conjugate-gradient kernels behind one driver loop
//! - Pluggable communication backends (serial, threads, MPI)
//! - Plain-text problem input and per-worker solution output
//!
//! ## Determinism
//!
//! The thread and serial backends reduce in rank order through rank 0, so
//! every worker sees bit-identical global values and leaves the iteration
//! loop on the same step.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! halo-poisson = "0.1"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! ```no_run
//! use halo_poisson::prelude::*;
//!
//! let problem = ProblemDescriptor::new([64, 64], 1e-6, 5000).with_source(0.5, 0.5, 1.0);
//! let job = Job::new([2, 2], ProblemInput::Inline(problem));
//! for w in run_threaded(&job, 4)? {
//!     println!("rank {}: {} iterations", w.rank, w.report.iterations);
//! }
//! # Ok::<(), PoissonError>(())
//! ```

pub mod algs;
pub mod data;
pub mod io;
pub mod poisson_error;
pub mod run;
pub mod solver;
pub mod topology;

pub use poisson_error::{PoissonError, Result};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::halo::HaloExchange;
    pub use crate::data::problem::{PointSource, ProblemDescriptor};
    pub use crate::data::tile::{LocalGrid, Tile};
    pub use crate::poisson_error::PoissonError;
    pub use crate::run::{Job, ProblemInput, WorkerReport, run_threaded, run_worker};
    pub use crate::solver::{Method, SolveReport, Solver, SolverConfig, Termination};
    pub use crate::topology::{Direction, ProcessGrid};
}

//! PoissonError: Unified error type for halo-poisson public APIs
//!
//! Every fallible operation in the crate (topology checks, problem parsing,
//! grid allocation, communication, kernel breakdown) reports through this
//! type so that a failing worker can hand the same diagnostic to its peers.

use thiserror::Error;

/// Unified error type for halo-poisson operations.
#[derive(Debug, Error)]
pub enum PoissonError {
    /// The requested process grid does not factor the worker count.
    #[error("process grid {px}x{py} does not match worker count {workers}")]
    TopologyMismatch { px: usize, py: usize, workers: usize },
    /// A process grid extent is zero or a rank lies outside the grid.
    #[error("invalid process topology: {0}")]
    InvalidTopology(String),
    /// The problem descriptor violates a structural requirement.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),
    /// Solver or job configuration is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed problem file.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    /// A working array could not be allocated.
    #[error("allocation of {cells} cells for {what} failed")]
    Allocation { what: &'static str, cells: usize },
    /// Conjugate gradient step with a vanishing `p·Ap` denominator.
    #[error("conjugate gradient breakdown at iteration {iteration}: p·Ap = {denominator}")]
    CgBreakdown { iteration: usize, denominator: f64 },
    /// The global convergence measure became NaN or infinite.
    #[error("solution diverged at iteration {iteration}: measure is {measure}")]
    NonFinite { iteration: usize, measure: f64 },
    /// Point-to-point or collective communication failure.
    #[error("communication error: {0}")]
    Comm(String),
    /// The communicator was torn down because another worker failed.
    #[error("communicator aborted by a failing worker")]
    Aborted,
    /// Failure reported by the root worker and broadcast to this one.
    #[error("root worker failed: {0}")]
    RootFailure(String),
    /// Another worker failed during a collectively checked phase.
    #[error("{phase} failed on at least one worker")]
    PeerFailure { phase: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire encoding error: {0}")]
    Wire(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, PoissonError>;

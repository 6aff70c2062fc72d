//! Global problem descriptor and its broadcast from the root worker.

use crate::algs::communicator::Communicator;
use crate::poisson_error::{PoissonError, Result};
use serde::{Deserialize, Serialize};

/// A grid point pinned to a fixed value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    /// Continuous position in `[0, 1]`.
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl PointSource {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// 1-based global cell `(floor(x·nx) + 1, floor(y·ny) + 1)`.
    ///
    /// A source at exactly `1.0` maps one past the last cell and is owned by
    /// no worker.
    pub fn cell(&self, grid_size: [usize; 2]) -> [usize; 2] {
        let [nx, ny] = grid_size;
        [
            ((self.x * nx as f64).floor() as usize).saturating_add(1),
            ((self.y * ny as f64).floor() as usize).saturating_add(1),
        ]
    }
}

/// Read-only description of the problem, replicated on every worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProblemDescriptor {
    /// Interior cells `[nx, ny]`.
    pub grid_size: [usize; 2],
    pub precision_goal: f64,
    pub max_iter: usize,
    pub sources: Vec<PointSource>,
}

impl ProblemDescriptor {
    pub fn new(grid_size: [usize; 2], precision_goal: f64, max_iter: usize) -> Self {
        Self {
            grid_size,
            precision_goal,
            max_iter,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, x: f64, y: f64, value: f64) -> Self {
        self.sources.push(PointSource::new(x, y, value));
        self
    }

    pub fn validate(&self) -> Result<()> {
        let [nx, ny] = self.grid_size;
        if nx == 0 || ny == 0 {
            return Err(PoissonError::InvalidProblem(format!(
                "grid must have at least one cell per axis, got {nx}x{ny}"
            )));
        }
        if !(self.precision_goal.is_finite() && self.precision_goal > 0.0) {
            return Err(PoissonError::InvalidProblem(format!(
                "precision goal must be positive and finite, got {}",
                self.precision_goal
            )));
        }
        if self.max_iter == 0 {
            return Err(PoissonError::InvalidProblem(
                "max iterations must be positive".into(),
            ));
        }
        for (i, s) in self.sources.iter().enumerate() {
            let inside = |c: f64| (0.0..=1.0).contains(&c);
            if !inside(s.x) || !inside(s.y) || !s.value.is_finite() {
                return Err(PoissonError::InvalidProblem(format!(
                    "source {i} at ({}, {}) = {} is outside [0,1]² or not finite",
                    s.x, s.y, s.value
                )));
            }
        }
        Ok(())
    }
}

/// Distribute the root's problem (or the root's failure) to every worker.
///
/// Only worker 0 inspects `local`; it must be `Some` there. The outcome is
/// sent as a `bincode` encoded `Result<ProblemDescriptor, String>` so every
/// worker returns at the same point, either with the same descriptor or with
/// an error carrying the root's diagnostic.
pub fn broadcast_problem<C: Communicator>(
    comm: &C,
    local: Option<Result<ProblemDescriptor>>,
) -> Result<ProblemDescriptor> {
    let mut buf = Vec::new();
    let mut root_error = None;
    if comm.rank() == 0 {
        let outcome: std::result::Result<ProblemDescriptor, String> = match local {
            Some(Ok(problem)) => match problem.validate() {
                Ok(()) => Ok(problem),
                Err(e) => {
                    let msg = e.to_string();
                    root_error = Some(e);
                    Err(msg)
                }
            },
            Some(Err(e)) => {
                let msg = e.to_string();
                root_error = Some(e);
                Err(msg)
            }
            None => {
                let e = PoissonError::InvalidConfig("root worker has no problem to broadcast".into());
                let msg = e.to_string();
                root_error = Some(e);
                Err(msg)
            }
        };
        buf = bincode::serialize(&outcome)?;
    }
    comm.broadcast(0, &mut buf)?;
    if let Some(e) = root_error {
        return Err(e);
    }
    let outcome: std::result::Result<ProblemDescriptor, String> = bincode::deserialize(&buf)?;
    match outcome {
        Ok(problem) => {
            log::debug!(
                "rank {} received {}x{} problem with {} sources",
                comm.rank(),
                problem.grid_size[0],
                problem.grid_size[1],
                problem.sources.len()
            );
            Ok(problem)
        }
        Err(msg) => Err(PoissonError::RootFailure(msg)),
    }
}

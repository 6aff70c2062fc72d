//! Per-worker pipeline: topology → problem broadcast → grid → solve → output.

use crate::algs::communicator::{Communicator, ThreadComm};
use crate::algs::reduction::all_agree;
use crate::data::problem::{ProblemDescriptor, broadcast_problem};
use crate::data::tile::LocalGrid;
use crate::io::{read_problem, write_worker_output};
use crate::poisson_error::{PoissonError, Result};
use crate::solver::{SolveReport, Solver, SolverConfig};
use crate::topology::ProcessGrid;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Where worker 0 gets the problem from.
#[derive(Clone, Debug)]
pub enum ProblemInput {
    File(PathBuf),
    Inline(ProblemDescriptor),
}

impl ProblemInput {
    fn load(&self) -> Result<ProblemDescriptor> {
        match self {
            ProblemInput::File(path) => read_problem(path),
            ProblemInput::Inline(problem) => Ok(problem.clone()),
        }
    }
}

/// Everything needed to run one distributed solve.
#[derive(Clone, Debug)]
pub struct Job {
    /// Process grid `[px, py]`.
    pub shape: [usize; 2],
    pub input: ProblemInput,
    /// Directory for `output<rank>.dat`; `None` skips writing.
    pub output_dir: Option<PathBuf>,
    pub solver: SolverConfig,
}

impl Job {
    pub fn new(shape: [usize; 2], input: ProblemInput) -> Self {
        Self {
            shape,
            input,
            output_dir: None,
            solver: SolverConfig::default(),
        }
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// What one worker hands back after a run.
#[derive(Debug)]
pub struct WorkerReport {
    pub rank: usize,
    pub size: usize,
    pub coord: [usize; 2],
    pub problem: ProblemDescriptor,
    pub report: SolveReport,
    pub grid: LocalGrid,
    pub output: Option<PathBuf>,
    /// Wall-clock time from loading the problem to the end of the solve.
    pub elapsed: Duration,
}

/// Run the whole pipeline on one worker.
///
/// The topology and solver configuration are checked before any
/// communication; every worker evaluates them identically, so all fail
/// together. Later failures go through a collective step so no worker is
/// left blocked in a reduction.
pub fn run_worker<C: Communicator>(comm: &C, job: &Job) -> Result<WorkerReport> {
    let topology = ProcessGrid::new(job.shape, comm.rank(), comm.size())?;
    let solver = Solver::new(job.solver)?;

    let start = Instant::now();
    let local = (comm.rank() == 0).then(|| job.input.load());
    let problem = broadcast_problem(comm, local)?;

    let mut grid = all_agree(comm, "grid setup", LocalGrid::setup(&problem, &topology))?;
    log::info!(
        "({} / {}) coord ({}, {}), {}x{} cells, method {}",
        topology.rank(),
        topology.size(),
        topology.coord()[0],
        topology.coord()[1],
        grid.region().extent[0],
        grid.region().extent[1],
        solver.config().method
    );

    let report = solver.solve(&problem, &topology, &mut grid, comm)?;
    let elapsed = start.elapsed();
    log::info!(
        "({} / {}) {} iterations, measure {:e}, {:?}",
        topology.rank(),
        topology.size(),
        report.iterations,
        report.measure,
        report.termination
    );

    let output = match &job.output_dir {
        Some(dir) => Some(all_agree(
            comm,
            "output",
            write_worker_output(dir, topology.rank(), &grid),
        )?),
        None => None,
    };

    Ok(WorkerReport {
        rank: topology.rank(),
        size: topology.size(),
        coord: topology.coord(),
        problem,
        report,
        grid,
        output,
        elapsed,
    })
}

/// Aborts the thread world if a worker unwinds, so its peers stop waiting.
struct AbortOnUnwind<'a>(&'a ThreadComm);

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Run `job` with `workers` threads in this process, one per worker.
///
/// Returns the reports in rank order, or the root-cause error when any
/// worker fails (peers released by the abort report
/// [`PoissonError::Aborted`], which is only returned if nothing better is
/// available).
pub fn run_threaded(job: &Job, workers: usize) -> Result<Vec<WorkerReport>> {
    if workers == 0 {
        return Err(PoissonError::InvalidConfig(
            "at least one worker is required".into(),
        ));
    }
    let world = ThreadComm::world(workers);
    let results: Vec<Result<WorkerReport>> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let _guard = AbortOnUnwind(comm);
                    let out = run_worker(comm, job);
                    if out.is_err() {
                        comm.abort();
                    }
                    out
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(PoissonError::Comm("worker thread panicked".into())))
            })
            .collect()
    });

    let mut reports = Vec::with_capacity(workers);
    let mut first_err = None;
    for result in results {
        match result {
            Ok(r) => reports.push(r),
            Err(PoissonError::Aborted) => {
                first_err.get_or_insert(PoissonError::Aborted);
            }
            Err(e) => {
                if matches!(first_err, None | Some(PoissonError::Aborted)) {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

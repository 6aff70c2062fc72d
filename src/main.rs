use clap::Parser;
use halo_poisson::run::{Job, ProblemInput, WorkerReport, run_threaded};
use halo_poisson::solver::{DEFAULT_OMEGA, Method, SolverConfig};
use std::path::PathBuf;

/// Distributed 2D Poisson solver (red-black SOR or conjugate gradient)
#[derive(Parser)]
#[command(name = "halo-poisson", version)]
struct Cli {
    /// Workers along x
    px: usize,

    /// Workers along y
    py: usize,

    /// Problem file
    #[arg(long, default_value = "input.dat")]
    input: PathBuf,

    /// Iterative method
    #[arg(long, value_enum, default_value_t = Method::Sor)]
    method: Method,

    /// SOR over-relaxation factor
    #[arg(long, default_value_t = DEFAULT_OMEGA)]
    omega: f64,

    /// Number of worker threads (defaults to px * py)
    #[arg(long)]
    workers: Option<usize>,

    /// Directory for the per-worker output files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Skip writing output files
    #[arg(long)]
    no_output: bool,

    /// Run as one MPI process per worker instead of threads
    #[cfg(feature = "mpi-support")]
    #[arg(long)]
    mpi: bool,
}

fn print_report(w: &WorkerReport) {
    println!(
        "({} / {}) Number of iterations: {}",
        w.rank, w.size, w.report.iterations
    );
    println!(
        "({} / {}) Elapsed wall-clock time: {:.6} s",
        w.rank,
        w.size,
        w.elapsed.as_secs_f64()
    );
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut job = Job::new([cli.px, cli.py], ProblemInput::File(cli.input.clone())).with_solver(
        SolverConfig {
            method: cli.method,
            omega: cli.omega,
        },
    );
    if !cli.no_output {
        job = job.with_output_dir(&cli.output_dir);
    }

    #[cfg(feature = "mpi-support")]
    if cli.mpi {
        let comm = halo_poisson::algs::communicator::MpiComm::new().unwrap_or_else(|e| {
            eprintln!("MPI error: {}", e);
            std::process::exit(1);
        });
        let report = halo_poisson::run::run_worker(&comm, &job).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });
        print_report(&report);
        return;
    }

    let workers = cli.workers.unwrap_or(cli.px.saturating_mul(cli.py));
    let reports = run_threaded(&job, workers).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    for w in &reports {
        print_report(w);
    }
}

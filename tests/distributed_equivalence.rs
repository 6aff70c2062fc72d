use halo_poisson::data::problem::ProblemDescriptor;
use halo_poisson::io::assemble;
use halo_poisson::run::{Job, ProblemInput, WorkerReport, run_threaded};
use halo_poisson::solver::{Method, SolverConfig, Termination};

fn problem(goal: f64) -> ProblemDescriptor {
    ProblemDescriptor::new([12, 10], goal, 20_000)
        .with_source(0.25, 0.25, 1.0)
        .with_source(0.75, 0.5, -2.0)
        .with_source(0.5, 0.8, 0.5)
}

fn run(shape: [usize; 2], problem: &ProblemDescriptor, method: Method) -> Vec<WorkerReport> {
    let job = Job::new(shape, ProblemInput::Inline(problem.clone()))
        .with_solver(SolverConfig::with_method(method));
    run_threaded(&job, shape[0] * shape[1]).unwrap()
}

fn field(problem: &ProblemDescriptor, reports: &[WorkerReport]) -> Vec<f64> {
    assemble(
        problem.grid_size,
        reports.iter().flat_map(|w| w.grid.owned_values()),
    )
    .unwrap()
}

fn max_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

#[test]
fn reports_are_in_rank_order_and_agree() {
    let p = problem(1e-6);
    let reports = run([2, 2], &p, Method::Sor);
    assert_eq!(reports.len(), 4);
    for (rank, w) in reports.iter().enumerate() {
        assert_eq!(w.rank, rank);
        assert_eq!(w.size, 4);
        assert_eq!(w.coord, [rank / 2, rank % 2]);
        assert_eq!(w.problem, p);
        assert_eq!(w.report, reports[0].report);
    }
    assert_eq!(reports[0].report.termination, Termination::Converged);
}

#[test]
fn sor_two_by_two_matches_serial() {
    let p = problem(1e-10);
    let serial = run([1, 1], &p, Method::Sor);
    let split = run([2, 2], &p, Method::Sor);
    assert_eq!(serial[0].report.iterations, split[0].report.iterations);
    let diff = max_diff(&field(&p, &serial), &field(&p, &split));
    assert!(diff < 1e-9, "max difference {diff:e}");
}

#[test]
fn sor_uneven_split_matches_serial() {
    let p = problem(1e-8);
    let serial = field(&p, &run([1, 1], &p, Method::Sor));
    let split = field(&p, &run([5, 3], &p, Method::Sor));
    let diff = max_diff(&serial, &split);
    assert!(diff < 1e-9, "max difference {diff:e}");
}

#[test]
fn cg_two_by_two_matches_serial() {
    let p = problem(1e-12);
    let serial = run([1, 1], &p, Method::Cg);
    let split = run([2, 2], &p, Method::Cg);
    assert!(split[0].report.converged());
    let diff = max_diff(&field(&p, &serial), &field(&p, &split));
    assert!(diff < 1e-6, "max difference {diff:e}");
    let (a, b) = (serial[0].report.iterations, split[0].report.iterations);
    assert!(a.abs_diff(b) <= 1, "{a} vs {b} iterations");
}

#[test]
fn cg_one_by_four_matches_serial() {
    let p = problem(1e-12);
    let serial = field(&p, &run([1, 1], &p, Method::Cg));
    let split = field(&p, &run([1, 4], &p, Method::Cg));
    assert!(max_diff(&serial, &split) < 1e-6);
}

#[test]
fn source_on_a_partition_boundary_is_owned_once() {
    // Cell (7, 6) is the first cell of worker x = 1 in a 2x2 split of 12x10.
    let p = ProblemDescriptor::new([12, 10], 1e-6, 5_000).with_source(0.5, 0.5, 3.0);
    let reports = run([2, 2], &p, Method::Sor);
    let pinned: usize = reports.iter().map(|w| w.grid.mask.count()).sum();
    assert_eq!(pinned, 1);
    let phi = field(&p, &reports);
    assert_eq!(phi[(7 - 1) * 10 + (6 - 1)], 3.0);
}

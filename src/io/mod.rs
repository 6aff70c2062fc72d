//! File I/O around the solver: problem input and per-worker output.

pub mod output;
pub mod problem_file;

pub use output::{assemble, output_path, read_output, read_output_file, write_grid, write_worker_output};
pub use problem_file::{parse_problem, read_problem};

//! Reader for the plain-text problem file.
//!
//! ```text
//! nx: 100
//! ny: 100
//! precision goal: 0.0001
//! max iterations: 5000
//! source: 0.5 0.5 1.0
//! source: 0.25 0.75 -0.5
//! ```
//!
//! The four header lines are required in this order. Source records follow
//! until the first line that is not a well-formed `source:` record.

use crate::data::problem::{PointSource, ProblemDescriptor};
use crate::poisson_error::{PoissonError, Result};
use std::path::Path;
use std::str::FromStr;

const HEADER: [&str; 4] = ["nx", "ny", "precision goal", "max iterations"];

fn parse_err(line: usize, message: impl Into<String>) -> PoissonError {
    PoissonError::Parse {
        line,
        message: message.into(),
    }
}

fn field<T: FromStr>(line: usize, key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| parse_err(line, format!("`{key}`: cannot parse `{}`: {e}", raw.trim())))
}

fn parse_source(rest: &str) -> Option<PointSource> {
    let mut it = rest.split_whitespace().map(str::parse::<f64>);
    let (Some(Ok(x)), Some(Ok(y)), Some(Ok(value))) = (it.next(), it.next(), it.next()) else {
        return None;
    };
    Some(PointSource::new(x, y, value))
}

/// Parse and validate a problem description.
pub fn parse_problem(text: &str) -> Result<ProblemDescriptor> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let mut header = [(0usize, ""); 4];
    let mut last_line = 0;
    for (slot, key) in header.iter_mut().zip(HEADER) {
        let (n, line) = lines
            .next()
            .ok_or_else(|| parse_err(last_line + 1, format!("missing `{key}:` line")))?;
        last_line = n;
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| parse_err(n, format!("expected `{key}: <value>`")))?;
        if k.trim() != key {
            return Err(parse_err(n, format!("expected `{key}:`, found `{}:`", k.trim())));
        }
        *slot = (n, v);
    }
    let [nx, ny, goal, max_iter] = header;
    let nx: usize = field(nx.0, HEADER[0], nx.1)?;
    let ny: usize = field(ny.0, HEADER[1], ny.1)?;
    let precision_goal: f64 = field(goal.0, HEADER[2], goal.1)?;
    let max_iter: usize = field(max_iter.0, HEADER[3], max_iter.1)?;

    let mut problem = ProblemDescriptor::new([nx, ny], precision_goal, max_iter);
    for (n, line) in lines {
        let source = line
            .split_once(':')
            .filter(|(k, _)| k.trim() == "source")
            .and_then(|(_, rest)| parse_source(rest));
        match source {
            Some(s) => problem.sources.push(s),
            None => {
                log::debug!("problem file: source list ends at line {n}");
                break;
            }
        }
    }
    problem.validate()?;
    Ok(problem)
}

/// Read and parse a problem file from disk.
pub fn read_problem(path: impl AsRef<Path>) -> Result<ProblemDescriptor> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        PoissonError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    let problem = parse_problem(&text)?;
    log::info!(
        "read {}: {}x{} grid, goal {:e}, max {} iterations, {} sources",
        path.display(),
        problem.grid_size[0],
        problem.grid_size[1],
        problem.precision_goal,
        problem.max_iter,
        problem.sources.len()
    );
    Ok(problem)
}

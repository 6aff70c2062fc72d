//! Per-worker solution output and reassembly of the global field.
//!
//! Each worker writes `output<rank>.dat` with one `gx gy value` line per
//! owned cell, x-major, values printed with six decimals.

use crate::data::tile::{LocalGrid, checked_cells, try_zeroed};
use crate::poisson_error::{PoissonError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// `dir/output<rank>.dat`.
pub fn output_path(dir: impl AsRef<Path>, rank: usize) -> PathBuf {
    dir.as_ref().join(format!("output{rank}.dat"))
}

/// Write every owned cell of `grid` as `gx gy value`.
pub fn write_grid<W: Write>(grid: &LocalGrid, mut out: W) -> Result<()> {
    for (gx, gy, v) in grid.owned_values() {
        writeln!(out, "{gx} {gy} {v:.6}")?;
    }
    out.flush()?;
    Ok(())
}

/// Write this worker's output file into `dir`, returning its path.
pub fn write_worker_output(dir: impl AsRef<Path>, rank: usize, grid: &LocalGrid) -> Result<PathBuf> {
    let path = output_path(dir, rank);
    let file = File::create(&path)?;
    write_grid(grid, BufWriter::new(file))?;
    log::debug!("rank {rank} wrote {}", path.display());
    Ok(path)
}

/// One record of an output file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellValue {
    pub x: usize,
    pub y: usize,
    pub value: f64,
}

/// Parse `gx gy value` records; blank lines are skipped.
pub fn read_output<R: BufRead>(reader: R) -> Result<Vec<CellValue>> {
    let mut cells = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = || PoissonError::Parse {
            line: i + 1,
            message: format!("expected `x y value`, found `{line}`"),
        };
        let mut it = line.split_whitespace();
        let (Some(x), Some(y), Some(v), None) = (it.next(), it.next(), it.next(), it.next()) else {
            return Err(bad());
        };
        cells.push(CellValue {
            x: x.parse().map_err(|_| bad())?,
            y: y.parse().map_err(|_| bad())?,
            value: v.parse().map_err(|_| bad())?,
        });
    }
    Ok(cells)
}

/// Read a worker output file from disk.
pub fn read_output_file(path: impl AsRef<Path>) -> Result<Vec<CellValue>> {
    read_output(BufReader::new(File::open(path)?))
}

/// Stitch per-worker cells into one x-major `nx × ny` field.
///
/// `field[(gx - 1) * ny + (gy - 1)]` holds cell `(gx, gy)`. Every cell must be
/// supplied exactly once.
pub fn assemble<I>(grid_size: [usize; 2], cells: I) -> Result<Vec<f64>>
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let [nx, ny] = grid_size;
    let n_cells = checked_cells("global field", grid_size)?;
    let mut field = try_zeroed("global field", n_cells, 0.0)?;
    let mut seen = try_zeroed("global field", n_cells, false)?;
    for (gx, gy, v) in cells {
        if gx == 0 || gy == 0 || gx > nx || gy > ny {
            return Err(PoissonError::InvalidProblem(format!(
                "cell ({gx}, {gy}) outside {nx}x{ny} grid"
            )));
        }
        let i = (gx - 1) * ny + (gy - 1);
        if std::mem::replace(&mut seen[i], true) {
            return Err(PoissonError::InvalidProblem(format!(
                "cell ({gx}, {gy}) owned by more than one worker"
            )));
        }
        field[i] = v;
    }
    if let Some(i) = seen.iter().position(|&s| !s) {
        return Err(PoissonError::InvalidProblem(format!(
            "cell ({}, {}) owned by no worker",
            i / ny + 1,
            i % ny + 1
        )));
    }
    Ok(field)
}

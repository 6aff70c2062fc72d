//! Process topology: mapping workers onto a 2D grid.

pub mod process_grid;

pub use process_grid::{Direction, Neighbors, ProcessGrid};

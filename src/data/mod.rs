//! Problem description and per-worker grid storage.

pub mod partition;
pub mod problem;
pub mod tile;

pub use partition::{OwnedRegion, block_range};
pub use problem::{PointSource, ProblemDescriptor, broadcast_problem};
pub use tile::{LocalGrid, SourceMask, Tile};

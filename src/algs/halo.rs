//! Four-message halo exchange for a padded [`Tile`].
//!
//! Each step ships the outermost interior line on one side to the neighbour
//! on that side and receives the opposite neighbour's line into the halo on
//! the opposite side:
//!
//! | step | send line      | to     | receive into  | from   |
//! |------|----------------|--------|---------------|--------|
//! | 0    | y = 1          | top    | y = dim_y - 1 | bottom |
//! | 1    | y = dim_y - 2  | bottom | y = 0         | top    |
//! | 2    | x = 1          | left   | x = dim_x - 1 | right  |
//! | 3    | x = dim_x - 2  | right  | x = 0         | left   |
//!
//! All four steps complete before `exchange` returns. Sides without a
//! neighbour are skipped and keep their previous halo values.

use crate::algs::communicator::Communicator;
use crate::data::tile::Tile;
use crate::poisson_error::Result;
use crate::topology::{Direction, Neighbors, ProcessGrid};

/// Tag of step 0; steps use `HALO_TAG_BASE + step`.
pub const HALO_TAG_BASE: u16 = 0x0100;

/// Reusable halo exchanger bound to one worker's neighbours.
#[derive(Clone, Debug)]
pub struct HaloExchange {
    neighbors: Neighbors,
    send: Vec<f64>,
    recv: Vec<f64>,
}

impl HaloExchange {
    pub fn new(grid: &ProcessGrid) -> Self {
        Self {
            neighbors: *grid.neighbors(),
            send: Vec::new(),
            recv: Vec::new(),
        }
    }

    /// Refresh every halo line of `tile` that has a neighbour.
    pub fn exchange<C: Communicator>(&mut self, tile: &mut Tile, comm: &C) -> Result<()> {
        if self.neighbors.count() == 0 {
            return Ok(());
        }
        for (step, toward) in Direction::ALL.into_iter().enumerate() {
            let from = toward.opposite();
            let dest = self.neighbors.get(toward);
            let source = self.neighbors.get(from);
            if dest.is_none() && source.is_none() {
                continue;
            }
            if dest.is_some() {
                tile.pack_line(toward, 1, &mut self.send);
            } else {
                self.send.clear();
            }
            self.recv.clear();
            if source.is_some() {
                self.recv.resize(tile.line_len(from), 0.0);
            }
            comm.sendrecv(
                dest,
                bytemuck::cast_slice(&self.send[..]),
                source,
                bytemuck::cast_slice_mut(&mut self.recv[..]),
                HALO_TAG_BASE + step as u16,
            )?;
            if source.is_some() {
                tile.unpack_line(from, 0, &self.recv);
            }
        }
        log::trace!("halo exchange done ({} neighbours)", self.neighbors.count());
        Ok(())
    }
}

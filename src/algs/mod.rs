//! Re-export public algorithms.

pub mod communicator;
pub mod halo;
pub mod reduction;

pub use halo::HaloExchange;
pub use reduction::all_agree;

//! Fix stream sources.
//!
//! - [`RideGenerator`]: simulate a ride over known terrain with a noisy receiver
//! - [`GpxWriter`]: persist a fix stream as GPX for `slope-replay`

mod gpx_files;
mod procedural;

pub use gpx_files::{GpxError, GpxWriter};
pub use procedural::{RideGenerator, SyntheticRide, TruthPoint};

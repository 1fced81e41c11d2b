//! Synthetic rides for exercising the slope engine.
//!
//! Rides are generated over terrain whose true elevation and grade are known,
//! then observed through a configurable noisy receiver.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let ride = RideGenerator::new(RideConfig::default(), ElevationGenerator::alpine(7))
//!     .with_noise(SensorNoise::phone())
//!     .generate(&CyclistProfile::road());
//!
//! let mut engine = SlopeEngine::new(EngineConfig::default());
//! engine.start()?;
//! for fix in &ride.fixes {
//!     engine.submit(fix);
//! }
//! ```

pub mod config;
pub mod profiles;
pub mod sources;
pub mod terrain;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{BoundingBox, Region, RideConfig, SensorNoise};
    pub use crate::profiles::{AthleteProfile, CyclistProfile, sample_variance, speed_at_grade};
    pub use crate::sources::{GpxWriter, RideGenerator, SyntheticRide, TruthPoint};
    pub use crate::terrain::{ElevationGenerator, GradeProfile, Terrain};
    pub use slope::{EngineConfig, Fix, SlopeEngine};
}

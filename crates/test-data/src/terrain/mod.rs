//! Ground-truth terrain for synthetic rides.
//!
//! [`ElevationGenerator`] gives natural-looking relief from Perlin noise;
//! [`GradeProfile`] gives exact, known grades along the ride so estimates can
//! be checked against the truth.

mod elevation;
mod profile;

pub use elevation::{ElevationGenerator, add_elevation_jitter};
pub use profile::GradeProfile;

#[derive(Debug, Clone)]
pub enum Terrain {
    Noise(ElevationGenerator),
    Profile(GradeProfile),
}

impl Terrain {
    /// True elevation `along_m` meters into the ride at the given position.
    pub fn elevation(&self, along_m: f64, lat: f64, lon: f64) -> f64 {
        match self {
            Terrain::Noise(generator) => generator.elevation_at(lat, lon),
            Terrain::Profile(profile) => profile.elevation_at(along_m),
        }
    }
}

impl From<ElevationGenerator> for Terrain {
    fn from(generator: ElevationGenerator) -> Self {
        Terrain::Noise(generator)
    }
}

impl From<GradeProfile> for Terrain {
    fn from(profile: GradeProfile) -> Self {
        Terrain::Profile(profile)
    }
}

//! Perlin noise-based relief.

use noise::{NoiseFn, Perlin};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Natural-looking elevation from several octaves of Perlin noise over
/// latitude/longitude.
#[derive(Debug, Clone)]
pub struct ElevationGenerator {
    perlin: Perlin,
    /// Base elevation in meters (e.g., valley floor).
    base_elevation: f64,
    /// Scale factor for terrain height variation.
    height_scale: f64,
    /// Spatial frequency in cycles per degree.
    frequency: f64,
    octaves: u32,
}

impl ElevationGenerator {
    pub fn new(seed: u32) -> Self {
        Self::rolling(seed)
    }

    /// Foothills: a few hundred meters of relief over a few kilometers.
    pub fn rolling(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 1650.0,
            height_scale: 150.0,
            frequency: 40.0,
            octaves: 4,
        }
    }

    /// Alpine passes: long sustained climbs.
    pub fn alpine(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 1400.0,
            height_scale: 600.0,
            frequency: 15.0,
            octaves: 5,
        }
    }

    /// Polder country: barely any relief.
    pub fn flat(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: -3.0,
            height_scale: 2.0,
            frequency: 50.0,
            octaves: 2,
        }
    }

    pub fn with_base_elevation(mut self, elevation: f64) -> Self {
        self.base_elevation = elevation;
        self
    }

    pub fn with_height_scale(mut self, scale: f64) -> Self {
        self.height_scale = scale;
        self
    }

    pub fn with_frequency(mut self, freq: f64) -> Self {
        self.frequency = freq;
        self
    }

    /// Fractal Brownian motion: each octave has half the amplitude and twice
    /// the frequency of the previous one.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut max_amplitude = 0.0;

        for _ in 0..self.octaves {
            total += self.perlin.get([lat * frequency, lon * frequency]) * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        self.base_elevation + (total / max_amplitude) * self.height_scale
    }
}

/// Adds zero-mean Gaussian noise to an altitude reading.
pub fn add_elevation_jitter(elevation: f64, rng: &mut impl Rng, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) if std_dev > 0.0 => elevation + normal.sample(rng),
        _ => elevation,
    }
}

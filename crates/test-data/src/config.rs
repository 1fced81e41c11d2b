//! Configuration types for synthetic ride generation.

use serde::{Deserialize, Serialize};

/// Geographic bounding box defined by southwest and northeast corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude (south)
    pub min_lat: f64,
    /// Minimum longitude (west)
    pub min_lon: f64,
    /// Maximum latitude (north)
    pub max_lat: f64,
    /// Maximum longitude (east)
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Returns a random point within the bounding box.
    pub fn random_point(&self, rng: &mut impl rand::Rng) -> (f64, f64) {
        let lat = rng.gen_range(self.min_lat..self.max_lat);
        let lon = rng.gen_range(self.min_lon..self.max_lon);
        (lat, lon)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Pre-defined riding areas.
#[derive(Debug, Clone, Copy)]
pub struct Region;

impl Region {
    /// Bernese Oberland: long alpine climbs.
    pub const OBERLAND: BoundingBox = BoundingBox::new(46.55, 7.60, 46.75, 8.05);

    /// Boulder, CO foothills: rolling terrain with short steep pitches.
    pub const BOULDER: BoundingBox = BoundingBox::new(39.9, -105.5, 40.1, -105.2);

    /// Flevoland: reclaimed land with next to no relief.
    pub const FLEVOLAND: BoundingBox = BoundingBox::new(52.35, 5.25, 52.60, 5.75);
}

/// How bad the simulated receiver is.
///
/// Every probability is per fix and independent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorNoise {
    /// Horizontal position jitter standard deviation in meters.
    pub position_jitter_m: f64,
    /// Altitude jitter standard deviation in meters.
    pub altitude_jitter_m: f64,
    /// Reported horizontal accuracy in meters.
    pub horizontal_accuracy_m: f64,
    /// Reported vertical accuracy in meters.
    pub vertical_accuracy_m: f64,
    /// Chance of an altitude spike of `spike_m` in either direction.
    pub spike_probability: f64,
    pub spike_m: f64,
    /// Chance of a position jump of `teleport_m`.
    pub teleport_probability: f64,
    pub teleport_m: f64,
    /// Chance of a fix without altitude.
    pub altitude_dropout_probability: f64,
    /// Chance of a fix whose reported horizontal accuracy is useless.
    pub poor_fix_probability: f64,
    /// Report altitude as barometric instead of GPS.
    pub barometric: bool,
}

impl Default for SensorNoise {
    fn default() -> Self {
        Self::phone()
    }
}

impl SensorNoise {
    /// Noise-free readings with perfect accuracy; the ground truth itself.
    pub fn perfect() -> Self {
        Self {
            position_jitter_m: 0.0,
            altitude_jitter_m: 0.0,
            horizontal_accuracy_m: 1.0,
            vertical_accuracy_m: 1.0,
            spike_probability: 0.0,
            spike_m: 0.0,
            teleport_probability: 0.0,
            teleport_m: 0.0,
            altitude_dropout_probability: 0.0,
            poor_fix_probability: 0.0,
            barometric: false,
        }
    }

    /// Typical smartphone GNSS in open terrain.
    pub fn phone() -> Self {
        Self {
            position_jitter_m: 2.0,
            altitude_jitter_m: 4.0,
            horizontal_accuracy_m: 5.0,
            vertical_accuracy_m: 8.0,
            spike_probability: 0.01,
            spike_m: 25.0,
            teleport_probability: 0.005,
            teleport_m: 400.0,
            altitude_dropout_probability: 0.02,
            poor_fix_probability: 0.01,
            barometric: false,
        }
    }

    /// Bike computer with a barometric altimeter.
    pub fn barometric() -> Self {
        Self {
            altitude_jitter_m: 0.3,
            vertical_accuracy_m: 1.0,
            spike_probability: 0.0,
            altitude_dropout_probability: 0.0,
            barometric: true,
            ..Self::phone()
        }
    }

    /// Tree cover and canyons: frequent spikes and dropouts.
    pub fn urban_canyon() -> Self {
        Self {
            position_jitter_m: 6.0,
            altitude_jitter_m: 10.0,
            horizontal_accuracy_m: 12.0,
            vertical_accuracy_m: 20.0,
            spike_probability: 0.05,
            spike_m: 40.0,
            teleport_probability: 0.02,
            teleport_m: 600.0,
            altitude_dropout_probability: 0.1,
            poor_fix_probability: 0.05,
            barometric: false,
        }
    }
}

/// Everything needed to reproduce one synthetic ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideConfig {
    pub seed: u64,
    /// Target distance in meters.
    pub distance_m: f64,
    /// Time between fixes in seconds.
    pub sample_interval_s: f64,
    pub region: BoundingBox,
    pub noise: SensorNoise,
    /// Probability per fix of stopping, and the stop length range in seconds.
    pub stop_probability: f64,
    pub stop_duration_range: (f64, f64),
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            distance_m: 5000.0,
            sample_interval_s: 1.0,
            region: Region::BOULDER,
            noise: SensorNoise::default(),
            stop_probability: 0.002,
            stop_duration_range: (10.0, 60.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_random_point_stays_inside() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let (lat, lon) = Region::OBERLAND.random_point(&mut rng);
            assert!(Region::OBERLAND.contains(lat, lon));
        }
    }

    #[test]
    fn test_barometric_preset_is_quieter() {
        let baro = SensorNoise::barometric();
        let phone = SensorNoise::phone();
        assert!(baro.barometric);
        assert!(baro.vertical_accuracy_m < phone.vertical_accuracy_m);
        assert_eq!(baro.teleport_m, phone.teleport_m);
    }
}

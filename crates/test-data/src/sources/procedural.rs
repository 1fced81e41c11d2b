//! Procedural ride generation.
//!
//! A ride is simulated in two layers: the ground truth (where the rider really
//! is, how high, on what grade) and the fix stream a noisy receiver would
//! report for it. Tests feed the fixes to the engine and check the results
//! against the truth.

use std::time::Duration;

use geo::{Destination as _, Haversine, Point};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use slope::{AltitudeReading, AltitudeSource, Fix};
use time::OffsetDateTime;

use crate::{
    config::{RideConfig, SensorNoise},
    profiles::{self, AthleteProfile},
    terrain::{Terrain, add_elevation_jitter},
};

/// 2024-06-01T07:00:00Z, the wall clock every synthetic ride starts at.
const RIDE_START_UNIX: i64 = 1_717_225_200;
/// Reported horizontal accuracy of a fix flagged as poor.
const POOR_FIX_ACCURACY_M: f64 = 60.0;
/// Look-ahead used to estimate the true grade on noise terrain.
const GRADE_PROBE_M: f64 = 5.0;
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Where the rider really was when a fix was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruthPoint {
    pub monotonic: Duration,
    pub along_m: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub grade_pct: f64,
    pub moving: bool,
}

#[derive(Debug, Clone)]
pub struct SyntheticRide {
    /// What the receiver reported, one per truth point.
    pub fixes: Vec<Fix>,
    pub truth: Vec<TruthPoint>,
}

impl SyntheticRide {
    pub fn true_distance_m(&self) -> f64 {
        self.truth.last().map_or(0.0, |p| p.along_m)
    }

    pub fn true_gain_m(&self) -> f64 {
        self.truth
            .windows(2)
            .map(|w| (w[1].elevation_m - w[0].elevation_m).max(0.0))
            .sum()
    }

    pub fn true_loss_m(&self) -> f64 {
        self.truth
            .windows(2)
            .map(|w| (w[0].elevation_m - w[1].elevation_m).max(0.0))
            .sum()
    }

    pub fn truth_at(&self, monotonic: Duration) -> Option<&TruthPoint> {
        self.truth
            .binary_search_by_key(&monotonic, |p| p.monotonic)
            .ok()
            .map(|i| &self.truth[i])
    }
}

pub struct RideGenerator {
    config: RideConfig,
    terrain: Terrain,
    start: Option<(f64, f64)>,
    /// Heading change per step is uniform in `±wander` radians.
    wander: f64,
}

impl RideGenerator {
    pub fn new(config: RideConfig, terrain: impl Into<Terrain>) -> Self {
        Self {
            config,
            terrain: terrain.into(),
            start: None,
            wander: 0.1,
        }
    }

    /// Starts at a fixed point instead of a random one inside the region.
    pub fn with_start(mut self, lat: f64, lon: f64) -> Self {
        self.start = Some((lat, lon));
        self
    }

    /// Rides due north from the region center without turning.
    pub fn straight(mut self) -> Self {
        self.wander = 0.0;
        self
    }

    pub fn with_noise(mut self, noise: SensorNoise) -> Self {
        self.config.noise = noise;
        self
    }

    pub fn config(&self) -> &RideConfig {
        &self.config
    }

    /// Generates the ride. The same config always yields the same ride.
    pub fn generate(&self, profile: &dyn AthleteProfile) -> SyntheticRide {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let truth = self.simulate_truth(profile, &mut rng);
        let sensor = Sensor::new(self.config.noise);
        let fixes = truth.iter().map(|p| sensor.observe(p, &mut rng)).collect();

        tracing::debug!(
            "Generated ride: {} fixes over {:.0} m",
            truth.len(),
            truth.last().map_or(0.0, |p| p.along_m)
        );
        SyntheticRide { fixes, truth }
    }

    fn simulate_truth(&self, profile: &dyn AthleteProfile, rng: &mut StdRng) -> Vec<TruthPoint> {
        let (lat, lon) = match self.start {
            Some(start) => start,
            None if self.wander > 0.0 => self.config.region.random_point(rng),
            None => self.config.region.center(),
        };
        let mut position = Point::new(lon, lat);
        let mut heading: f64 = if self.wander > 0.0 {
            rng.gen_range(0.0..360.0)
        } else {
            0.0
        };

        let interval = self.config.sample_interval_s.max(0.1);
        let variance = profiles::sample_variance(profile, rng);
        let mut truth = Vec::new();
        let mut along = 0.0;
        let mut t = 0.0;
        let mut stopped_until: Option<f64> = None;

        loop {
            let elevation = self.terrain.elevation(along, position.y(), position.x());
            let grade = self.true_grade(along, position, heading, elevation);
            let moving = stopped_until.is_none_or(|until| t >= until);
            truth.push(TruthPoint {
                monotonic: Duration::from_secs_f64(t),
                along_m: along,
                latitude: position.y(),
                longitude: position.x(),
                elevation_m: elevation,
                grade_pct: grade,
                moving,
            });

            if along >= self.config.distance_m {
                break;
            }
            t += interval;

            if !moving {
                continue;
            }
            stopped_until = None;
            if rng.r#gen::<f64>() < self.config.stop_probability {
                let (min, max) = self.config.stop_duration_range;
                stopped_until = Some(t + rng.gen_range(min..max.max(min + 1.0)));
                continue;
            }

            let speed = profiles::speed_at_grade(profile, grade, variance);
            let step = (speed * interval).min(self.config.distance_m - along);
            if self.wander > 0.0 {
                heading += rng.gen_range(-self.wander..self.wander).to_degrees();
            }
            let mut next = Haversine.destination(position, heading, step);
            if !self.config.region.contains(next.y(), next.x()) {
                heading += 180.0;
                next = Haversine.destination(position, heading, step);
            }
            position = next;
            along += step;
        }

        truth
    }

    fn true_grade(&self, along: f64, position: Point<f64>, heading: f64, elevation: f64) -> f64 {
        match &self.terrain {
            Terrain::Profile(profile) => profile.grade_at(along),
            Terrain::Noise(_) => {
                let ahead = Haversine.destination(position, heading, GRADE_PROBE_M);
                let next = self
                    .terrain
                    .elevation(along + GRADE_PROBE_M, ahead.y(), ahead.x());
                (next - elevation) / GRADE_PROBE_M * 100.0
            }
        }
    }
}

/// Turns truth into what a receiver with the given noise would report.
struct Sensor {
    noise: SensorNoise,
    position: Option<Normal<f64>>,
}

impl Sensor {
    fn new(noise: SensorNoise) -> Self {
        Self {
            noise,
            position: normal(noise.position_jitter_m),
        }
    }

    fn observe(&self, truth: &TruthPoint, rng: &mut StdRng) -> Fix {
        let noise = &self.noise;
        let mut latitude = truth.latitude;
        let mut longitude = truth.longitude;

        if let Some(jitter) = &self.position {
            let north = jitter.sample(rng);
            let east = jitter.sample(rng);
            latitude += (north / EARTH_RADIUS_M).to_degrees();
            longitude += (east / (EARTH_RADIUS_M * latitude.to_radians().cos())).to_degrees();
        }
        if rng.r#gen::<f64>() < noise.teleport_probability {
            let jumped = Haversine.destination(
                Point::new(longitude, latitude),
                rng.gen_range(0.0..360.0),
                noise.teleport_m,
            );
            latitude = jumped.y();
            longitude = jumped.x();
        }

        let altitude = if rng.r#gen::<f64>() < noise.altitude_dropout_probability {
            None
        } else {
            let mut meters = add_elevation_jitter(truth.elevation_m, rng, noise.altitude_jitter_m);
            if rng.r#gen::<f64>() < noise.spike_probability {
                meters += noise.spike_m.copysign(rng.r#gen::<f64>() - 0.5);
            }
            let source = if noise.barometric {
                AltitudeSource::Barometric(noise.vertical_accuracy_m)
            } else {
                AltitudeSource::Gps(noise.vertical_accuracy_m)
            };
            Some(AltitudeReading { meters, source })
        };

        let horizontal_accuracy_m = if rng.r#gen::<f64>() < noise.poor_fix_probability {
            POOR_FIX_ACCURACY_M
        } else {
            noise.horizontal_accuracy_m
        };

        let start = OffsetDateTime::from_unix_timestamp(RIDE_START_UNIX)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        Fix {
            monotonic: truth.monotonic,
            wall_clock: start + truth.monotonic,
            latitude,
            longitude,
            altitude,
            horizontal_accuracy_m,
        }
    }
}

fn normal(std_dev: f64) -> Option<Normal<f64>> {
    if std_dev > 0.0 {
        Normal::new(0.0, std_dev).ok()
    } else {
        None
    }
}

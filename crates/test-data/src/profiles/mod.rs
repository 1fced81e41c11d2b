//! Rider performance profiles.
//!
//! A profile turns the true grade under the wheels into a plausible speed, so
//! that synthetic rides slow down on climbs and speed up on descents the way
//! recorded ones do.

mod cyclist;

pub use cyclist::CyclistProfile;

use rand_distr::{Distribution, Normal};

pub trait AthleteProfile: Send + Sync {
    /// Base speed on flat terrain in meters per second.
    fn base_speed_mps(&self) -> f64;

    /// Speed multiplier at `grade_pct` (positive climbs). Below 1.0 uphill,
    /// above 1.0 downhill.
    fn grade_factor(&self, grade_pct: f64) -> f64;

    /// Ride-to-ride variance as a coefficient of variation.
    fn variance(&self) -> f64;
}

/// Lowest speed a moving rider is given, to keep timestamps finite.
pub const MIN_SPEED_MPS: f64 = 1.0;

pub fn speed_at_grade(profile: &dyn AthleteProfile, grade_pct: f64, variance_factor: f64) -> f64 {
    let target = profile.base_speed_mps() * profile.grade_factor(grade_pct);
    (target * variance_factor).max(MIN_SPEED_MPS)
}

/// Samples a day-form multiplier around 1.0.
pub fn sample_variance(profile: &dyn AthleteProfile, rng: &mut impl rand::Rng) -> f64 {
    match Normal::new(1.0, profile.variance()) {
        Ok(normal) if profile.variance() > 0.0 => normal.sample(rng).clamp(0.7, 1.4),
        _ => 1.0,
    }
}

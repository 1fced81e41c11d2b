use super::AthleteProfile;

/// Cyclist on a given kind of bike.
///
/// Climbing costs roughly 8% of flat speed per percent of grade down to a
/// crawl; descending gains about 5% per percent up to a braking limit.
#[derive(Debug, Clone)]
pub struct CyclistProfile {
    base_speed: f64,
    variance: f64,
    /// Highest multiplier of base speed on a descent.
    max_descent_factor: f64,
}

impl Default for CyclistProfile {
    fn default() -> Self {
        Self::road()
    }
}

impl CyclistProfile {
    pub fn with_speed(speed_kmh: f64) -> Self {
        Self {
            base_speed: speed_kmh / 3.6,
            ..Self::road()
        }
    }

    /// ~28 km/h on the flat, fast descents.
    pub fn road() -> Self {
        Self {
            base_speed: 28.0 / 3.6,
            variance: 0.10,
            max_descent_factor: 2.2,
        }
    }

    /// ~22 km/h, more cautious downhill.
    pub fn gravel() -> Self {
        Self {
            base_speed: 22.0 / 3.6,
            variance: 0.12,
            max_descent_factor: 1.6,
        }
    }

    /// ~16 km/h on technical trails.
    pub fn mountain_biker() -> Self {
        Self {
            base_speed: 16.0 / 3.6,
            variance: 0.15,
            max_descent_factor: 1.4,
        }
    }
}

impl AthleteProfile for CyclistProfile {
    fn base_speed_mps(&self) -> f64 {
        self.base_speed
    }

    fn grade_factor(&self, grade_pct: f64) -> f64 {
        if grade_pct >= 0.0 {
            (1.0 - grade_pct * 0.08).max(0.2)
        } else {
            (1.0 - grade_pct * 0.05).min(self.max_descent_factor)
        }
    }

    fn variance(&self) -> f64 {
        self.variance
    }
}

//! Turns conditioned deltas into a bounded, rate-limited grade signal.

use std::time::Duration;

use enum_map::EnumMap;

use crate::{
    config::{EngineConfig, FilterProfile},
    models::{ConditionedSample, GradeSample, SourceKind},
};

const MIN_ACCURACY_FACTOR: f64 = 0.2;
/// Confidence multiplier applied to any clamped grade.
const CLAMP_FACTOR: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct Estimator {
    distance_floor_m: f64,
    min_grade_pct: f64,
    max_grade_pct: f64,
    max_grade_rate_per_s: f64,
    profiles: EnumMap<SourceKind, FilterProfile>,
    previous: Option<(Duration, f64)>,
}

impl Estimator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            distance_floor_m: config.distance_floor_m,
            min_grade_pct: config.min_grade_pct,
            max_grade_pct: config.max_grade_pct,
            max_grade_rate_per_s: config.max_grade_rate_per_s,
            profiles: config.smoothing.lookup(),
            previous: None,
        }
    }

    /// Estimates the grade for a sample. Returns `None` below the distance
    /// floor (the rider is stopped, not on a slope) and for samples whose
    /// elevation delta is not backed by altitude readings.
    pub fn estimate(&mut self, sample: &ConditionedSample) -> Option<GradeSample> {
        if !sample.valid || sample.distance_delta_m < self.distance_floor_m {
            return None;
        }

        let raw = sample.elevation_delta_m / sample.distance_delta_m * 100.0;
        let mut grade = raw.clamp(self.min_grade_pct, self.max_grade_pct);
        let mut clamped = grade != raw;

        if let Some((prev_time, prev_grade)) = self.previous {
            let dt = sample.monotonic.saturating_sub(prev_time).as_secs_f64();
            let max_step = self.max_grade_rate_per_s * dt;
            let step = grade - prev_grade;
            if step.abs() > max_step {
                grade = prev_grade + max_step.copysign(step);
                clamped = true;
            }
        }

        if clamped {
            tracing::debug!("Grade {:.1}% limited to {:.1}%", raw, grade);
        }

        self.previous = Some((sample.monotonic, grade));

        Some(GradeSample {
            monotonic: sample.monotonic,
            wall_clock: sample.wall_clock,
            grade,
            confidence: self.confidence(sample, clamped),
            clamped,
        })
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Accuracy is judged against the reference of the reading's own source,
    /// the same table the altitude filter weighs readings with.
    fn confidence(&self, sample: &ConditionedSample, clamped: bool) -> f64 {
        let accuracy = match (sample.vertical_accuracy_m, sample.altitude_source) {
            (Some(acc), Some(kind)) => self.profiles[kind]
                .accuracy_factor(acc)
                .max(MIN_ACCURACY_FACTOR),
            _ => MIN_ACCURACY_FACTOR,
        };
        let fill = sample.window_fill.clamp(0.0, 1.0);
        let clamp = if clamped { CLAMP_FACTOR } else { 1.0 };

        accuracy * fill * clamp
    }
}

//! Running session statistics.
//!
//! Every statistic is a [`TrackMetric`]: an O(1) update per track point and a
//! score read off at any time. [`SessionStats`] composes them, so the running
//! aggregate and a from-scratch recompute over a persisted log go through the
//! exact same fold.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    errors::SessionError,
    models::{ConditionedSample, GradeSample, TrackPoint},
    session::Session,
};

/// Speeds below this do not count towards moving time.
const MOVING_SPEED_MPS: f64 = 0.5;

pub trait TrackMetric {
    type Score;
    fn next_point(&mut self, point: &TrackPoint);
    fn score(&self) -> Self::Score;
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistanceMetric {
    total_m: f64,
}

impl TrackMetric for DistanceMetric {
    type Score = f64;
    fn next_point(&mut self, point: &TrackPoint) {
        self.total_m += point.distance_delta_m;
    }

    fn score(&self) -> f64 {
        self.total_m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElevationMetric {
    gain_m: f64,
    loss_m: f64,
}

impl TrackMetric for ElevationMetric {
    /// (gain, loss), both non-negative.
    type Score = (f64, f64);
    fn next_point(&mut self, point: &TrackPoint) {
        let delta = point.elevation_delta_m;
        if delta > 0.0 {
            self.gain_m += delta;
        } else if delta < 0.0 {
            self.loss_m -= delta;
        }
    }

    fn score(&self) -> (f64, f64) {
        (self.gain_m, self.loss_m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeMetric {
    count: u64,
    sum: f64,
    max: Option<f64>,
    min: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeScore {
    pub count: u64,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub mean: Option<f64>,
}

impl GradeMetric {
    fn next_grade(&mut self, sample: &GradeSample) {
        self.count += 1;
        self.sum += sample.grade;
        self.max = Some(self.max.map_or(sample.grade, |max| max.max(sample.grade)));
        self.min = Some(self.min.map_or(sample.grade, |min| min.min(sample.grade)));
    }
}

impl TrackMetric for GradeMetric {
    type Score = GradeScore;
    fn next_point(&mut self, point: &TrackPoint) {
        if let Some(sample) = &point.grade {
            self.next_grade(sample);
        }
    }

    fn score(&self) -> GradeScore {
        GradeScore {
            count: self.count,
            max: self.max,
            min: self.min,
            mean: (self.count > 0).then(|| self.sum / self.count as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeedMetric {
    max_mps: f64,
    moving: Duration,
}

impl TrackMetric for SpeedMetric {
    /// (max speed in m/s, moving time)
    type Score = (f64, Duration);
    fn next_point(&mut self, point: &TrackPoint) {
        let speed = point.speed_mps();
        self.max_mps = self.max_mps.max(speed);
        if speed >= MOVING_SPEED_MPS {
            self.moving += point.elapsed;
        }
    }

    fn score(&self) -> (f64, Duration) {
        (self.max_mps, self.moving)
    }
}

/// Running aggregate over a session's track points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionStats {
    points: u64,
    last_monotonic: Option<Duration>,
    distance: DistanceMetric,
    elevation: ElevationMetric,
    grade: GradeMetric,
    speed: SpeedMetric,
}

/// Read-only view of [`SessionStats`], as shown to riders and exported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub point_count: u64,
    pub grade_count: u64,
    pub distance_m: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub max_grade: Option<f64>,
    pub min_grade: Option<f64>,
    pub mean_grade: Option<f64>,
    pub max_speed_kmh: f64,
    pub moving_time_s: f64,
}

impl SessionStats {
    /// Recomputes the aggregate from scratch, e.g. for an edited log.
    pub fn recompute<'a>(points: impl IntoIterator<Item = &'a TrackPoint>) -> Self {
        let mut stats = Self::default();
        for point in points {
            stats.next_point(point);
        }
        stats
    }

    pub fn last_monotonic(&self) -> Option<Duration> {
        self.last_monotonic
    }

    pub fn distance_m(&self) -> f64 {
        self.distance.score()
    }

    pub fn elevation_gain_m(&self) -> f64 {
        self.elevation.score().0
    }

    pub fn elevation_loss_m(&self) -> f64 {
        self.elevation.score().1
    }

    pub fn grades(&self) -> GradeScore {
        self.grade.score()
    }
}

impl TrackMetric for SessionStats {
    type Score = Summary;
    fn next_point(&mut self, point: &TrackPoint) {
        self.points += 1;
        self.last_monotonic = Some(point.monotonic);
        self.distance.next_point(point);
        self.elevation.next_point(point);
        self.grade.next_point(point);
        self.speed.next_point(point);
    }

    fn score(&self) -> Summary {
        let (gain, loss) = self.elevation.score();
        let grades = self.grade.score();
        let (max_speed, moving) = self.speed.score();
        Summary {
            point_count: self.points,
            grade_count: grades.count,
            distance_m: self.distance.score(),
            elevation_gain_m: gain,
            elevation_loss_m: loss,
            max_grade: grades.max,
            min_grade: grades.min,
            mean_grade: grades.mean,
            max_speed_kmh: max_speed * 3.6,
            moving_time_s: moving.as_secs_f64(),
        }
    }
}

/// Appends one conditioned sample, and the grade estimated for it if any, to
/// the session log and folds it into the running statistics.
///
/// Fails with [`SessionError::InvariantViolation`] when the sample is not
/// strictly later than the previous one; the session is left untouched.
pub fn accumulate(
    session: &mut Session,
    sample: &ConditionedSample,
    grade: Option<GradeSample>,
) -> Result<TrackPoint, SessionError> {
    if let Some(last) = session.stats.last_monotonic()
        && sample.monotonic <= last
    {
        return Err(SessionError::InvariantViolation {
            session_id: session.id,
            detail: format!(
                "sample at {:?} does not follow {:?}",
                sample.monotonic, last
            ),
        });
    }

    let point = TrackPoint::new(sample, grade);
    session.stats.next_point(&point);
    session.points.push(point);
    Ok(point)
}

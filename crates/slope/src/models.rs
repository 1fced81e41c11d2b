use std::time::Duration;

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which sensor produced an altitude reading, with its reported vertical
/// accuracy in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeSource {
    Gps(f64),
    Barometric(f64),
    Fused(f64),
}

/// Payload-free view of [`AltitudeSource`], used as a lookup-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Gps,
    Barometric,
    Fused,
}

impl AltitudeSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            AltitudeSource::Gps(_) => SourceKind::Gps,
            AltitudeSource::Barometric(_) => SourceKind::Barometric,
            AltitudeSource::Fused(_) => SourceKind::Fused,
        }
    }

    pub fn accuracy_m(&self) -> f64 {
        match *self {
            AltitudeSource::Gps(acc)
            | AltitudeSource::Barometric(acc)
            | AltitudeSource::Fused(acc) => acc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltitudeReading {
    pub meters: f64,
    pub source: AltitudeSource,
}

/// One raw position/altitude sample from a location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Time since the location stream started. Drives all rate computations.
    pub monotonic: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub wall_clock: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<AltitudeReading>,
    pub horizontal_accuracy_m: f64,
}

impl Fix {
    /// Fix at `seconds` into the stream, anchored at the Unix epoch for the wall clock.
    pub fn at_seconds(seconds: f64, latitude: f64, longitude: f64) -> Self {
        let monotonic = Duration::from_secs_f64(seconds);
        Self {
            monotonic,
            wall_clock: OffsetDateTime::UNIX_EPOCH + monotonic,
            latitude,
            longitude,
            altitude: None,
            horizontal_accuracy_m: 5.0,
        }
    }

    pub fn with_altitude(mut self, meters: f64, source: AltitudeSource) -> Self {
        self.altitude = Some(AltitudeReading { meters, source });
        self
    }

    pub fn with_horizontal_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy_m = meters;
        self
    }

    pub fn with_wall_clock(mut self, wall_clock: OffsetDateTime) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Conditioned elevation/distance deltas since the previously emitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    pub monotonic: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub wall_clock: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    /// Smoothed altitude, absent when no altitude has been seen yet.
    pub smoothed_altitude_m: Option<f64>,
    pub distance_delta_m: f64,
    pub elevation_delta_m: f64,
    /// Elapsed time since the previously emitted sample.
    pub elapsed: Duration,
    /// Worst vertical accuracy among the readings merged into this sample.
    pub vertical_accuracy_m: Option<f64>,
    /// Source of that worst reading.
    #[serde(default)]
    pub altitude_source: Option<SourceKind>,
    /// Fraction of the smoothing window filled, in `[0, 1]`.
    pub window_fill: f64,
    /// False when the elevation delta is not backed by altitude readings.
    pub valid: bool,
}

impl ConditionedSample {
    /// Horizontal speed over this sample in meters per second.
    pub fn speed_mps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.distance_delta_m / secs
        } else {
            0.0
        }
    }
}

/// Instantaneous terrain grade. Positive grades are ascents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeSample {
    pub monotonic: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub wall_clock: OffsetDateTime,
    /// Grade in percent.
    pub grade: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Set when the physical-range or rate-of-change limit altered the value.
    pub clamped: bool,
}

impl GradeSample {
    pub const LOW_CONFIDENCE: f64 = 0.5;

    pub fn is_low_confidence(&self) -> bool {
        self.confidence < Self::LOW_CONFIDENCE
    }
}

/// One entry of a session log: the conditioned motion plus the grade, if any,
/// estimated for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub monotonic: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub wall_clock: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: Option<f64>,
    pub distance_delta_m: f64,
    pub elevation_delta_m: f64,
    pub elapsed: Duration,
    pub grade: Option<GradeSample>,
}

impl TrackPoint {
    pub fn new(sample: &ConditionedSample, grade: Option<GradeSample>) -> Self {
        Self {
            monotonic: sample.monotonic,
            wall_clock: sample.wall_clock,
            latitude: sample.latitude,
            longitude: sample.longitude,
            elevation_m: sample.smoothed_altitude_m,
            distance_delta_m: sample.distance_delta_m,
            elevation_delta_m: if sample.valid { sample.elevation_delta_m } else { 0.0 },
            elapsed: sample.elapsed,
            grade,
        }
    }

    pub fn speed_mps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.distance_delta_m / secs
        } else {
            0.0
        }
    }
}

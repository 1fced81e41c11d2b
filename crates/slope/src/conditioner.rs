//! Noise reduction between raw fixes and grade estimation.
//!
//! Consumer GPS altitude is by far the noisiest channel: differencing raw
//! readings produces grade spikes an order of magnitude larger than real
//! terrain. The conditioner drops GPS jumps by implied speed, runs altitude
//! through an exponential filter whose weight tracks vertical accuracy, and
//! holds back distance until a fresh altitude reading can pair with it.

use std::collections::VecDeque;
use std::time::Duration;

use enum_map::EnumMap;
use geo::{Distance as _, Haversine, Point};
use time::OffsetDateTime;

use crate::{
    config::{EngineConfig, FilterProfile},
    errors::InputError,
    models::{AltitudeReading, ConditionedSample, Fix, SourceKind},
};

#[derive(Debug, Clone, Copy)]
struct Anchor {
    monotonic: Duration,
    wall_clock: OffsetDateTime,
    point: Point<f64>,
}

/// Motion accumulated since the last emitted sample.
#[derive(Debug, Clone, Copy)]
struct Pending {
    since: Duration,
    distance_m: f64,
    worst_vertical_accuracy_m: Option<f64>,
    worst_source: Option<SourceKind>,
}

impl Pending {
    fn since(monotonic: Duration) -> Self {
        Self {
            since: monotonic,
            distance_m: 0.0,
            worst_vertical_accuracy_m: None,
            worst_source: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conditioner {
    max_speed_mps: f64,
    window_size: usize,
    profiles: EnumMap<SourceKind, FilterProfile>,
    last: Option<Anchor>,
    smoothed: Option<f64>,
    /// Smoothed altitude at the last emitted sample.
    baseline: Option<f64>,
    pending: Option<Pending>,
    window: VecDeque<f64>,
}

impl Conditioner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_speed_mps: config.max_speed_mps(),
            window_size: config.window_size,
            profiles: config.smoothing.lookup(),
            last: None,
            smoothed: None,
            baseline: None,
            pending: None,
            window: VecDeque::with_capacity(config.window_size),
        }
    }

    /// Feeds one validated fix. Returns `Ok(None)` when the fix was absorbed
    /// into the pending deltas, and an error when it was rejected as a jump.
    pub fn condition(&mut self, fix: &Fix) -> Result<Option<ConditionedSample>, InputError> {
        let (Some(prev), Some(pending)) = (self.last, self.pending) else {
            self.seed(fix);
            return Ok(None);
        };

        let distance = Haversine.distance(prev.point, fix.point());
        let dt = fix.monotonic.saturating_sub(prev.monotonic).as_secs_f64();
        let speed = if dt > 0.0 {
            distance / dt
        } else if distance > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if speed > self.max_speed_mps {
            tracing::debug!("Dropping GPS jump: {:.1} m in {:.2} s", distance, dt);
            return Err(InputError::ImplausibleSpeed {
                speed_mps: speed,
                max_mps: self.max_speed_mps,
            });
        }

        self.last = Some(Anchor::from(fix));
        let mut pending = Pending {
            distance_m: pending.distance_m + distance,
            ..pending
        };

        let Some(reading) = fix.altitude else {
            self.pending = Some(pending);
            return Ok(None);
        };

        let had_baseline = self.baseline.is_some();
        let current = self.smooth(reading, &mut pending);
        let baseline = *self.baseline.get_or_insert(current);

        if pending.distance_m <= 0.0 {
            self.pending = Some(pending);
            return Ok(None);
        }

        let sample = ConditionedSample {
            monotonic: fix.monotonic,
            wall_clock: fix.wall_clock,
            latitude: fix.latitude,
            longitude: fix.longitude,
            smoothed_altitude_m: Some(current),
            distance_delta_m: pending.distance_m,
            elevation_delta_m: current - baseline,
            elapsed: fix.monotonic.saturating_sub(pending.since),
            vertical_accuracy_m: pending.worst_vertical_accuracy_m,
            altitude_source: pending.worst_source,
            window_fill: self.window_fill(),
            valid: had_baseline,
        };
        self.baseline = Some(current);
        self.pending = Some(Pending::since(fix.monotonic));

        Ok(Some(sample))
    }

    /// Emits whatever motion is still buffered, so that nothing is lost when
    /// a session ends between two emitted samples.
    pub fn flush(&mut self) -> Option<ConditionedSample> {
        let last = self.last?;
        let pending = self.pending?;
        if last.monotonic <= pending.since {
            return None;
        }

        let (elevation_delta_m, valid) = match (self.smoothed, self.baseline) {
            (Some(current), Some(baseline)) => (current - baseline, true),
            _ => (0.0, false),
        };
        if pending.distance_m <= 0.0 && elevation_delta_m == 0.0 {
            return None;
        }

        let sample = ConditionedSample {
            monotonic: last.monotonic,
            wall_clock: last.wall_clock,
            latitude: last.point.y(),
            longitude: last.point.x(),
            smoothed_altitude_m: self.smoothed,
            distance_delta_m: pending.distance_m,
            elevation_delta_m,
            elapsed: last.monotonic.saturating_sub(pending.since),
            vertical_accuracy_m: pending.worst_vertical_accuracy_m,
            altitude_source: pending.worst_source,
            window_fill: self.window_fill(),
            valid,
        };
        self.baseline = self.smoothed;
        self.pending = Some(Pending::since(last.monotonic));

        Some(sample)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.smoothed = None;
        self.baseline = None;
        self.pending = None;
        self.window.clear();
    }

    pub fn smoothed_altitude(&self) -> Option<f64> {
        self.smoothed
    }

    pub fn window_fill(&self) -> f64 {
        self.window.len() as f64 / self.window_size as f64
    }

    fn seed(&mut self, fix: &Fix) {
        self.last = Some(Anchor::from(fix));
        let mut pending = Pending::since(fix.monotonic);
        if let Some(reading) = fix.altitude {
            let current = self.smooth(reading, &mut pending);
            self.baseline = Some(current);
        }
        self.pending = Some(pending);
    }

    fn smooth(&mut self, reading: AltitudeReading, pending: &mut Pending) -> f64 {
        let accuracy = reading.source.accuracy_m();
        let weight = self.profiles[reading.source.kind()].weight(accuracy);
        let current = match self.smoothed {
            Some(prev) => prev + weight * (reading.meters - prev),
            None => reading.meters,
        };

        self.smoothed = Some(current);
        self.window.push_back(current);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }
        if pending
            .worst_vertical_accuracy_m
            .is_none_or(|worst| accuracy >= worst)
        {
            pending.worst_vertical_accuracy_m = Some(accuracy);
            pending.worst_source = Some(reading.source.kind());
        }

        current
    }
}

impl From<&Fix> for Anchor {
    fn from(fix: &Fix) -> Self {
        Self {
            monotonic: fix.monotonic,
            wall_clock: fix.wall_clock,
            point: fix.point(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AltitudeSource;

    const LAT: f64 = 46.0;
    const LON: f64 = 7.0;

    /// Latitude `meters` north of the test origin.
    fn north(meters: f64) -> f64 {
        LAT + (meters / 6_371_008.8).to_degrees()
    }

    fn fix(t: f64, along_m: f64, alt: f64, vacc: f64) -> Fix {
        Fix::at_seconds(t, north(along_m), LON).with_altitude(alt, AltitudeSource::Gps(vacc))
    }

    fn conditioner() -> Conditioner {
        Conditioner::new(&EngineConfig::default())
    }

    #[test]
    fn test_first_fix_only_seeds() {
        let mut c = conditioner();
        assert_eq!(c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap(), None);
        assert_eq!(c.smoothed_altitude(), Some(500.0));
    }

    #[test]
    fn test_accurate_readings_pass_through() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        let sample = c.condition(&fix(10.0, 50.0, 505.0, 2.0)).unwrap().unwrap();

        assert!((sample.distance_delta_m - 50.0).abs() < 0.01);
        assert!((sample.elevation_delta_m - 5.0).abs() < 1e-9);
        assert_eq!(sample.elapsed, Duration::from_secs(10));
        assert!(sample.valid);
    }

    #[test]
    fn test_poor_accuracy_smooths_more() {
        let mut sharp = conditioner();
        let mut soft = conditioner();
        sharp.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        soft.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();

        let a = sharp.condition(&fix(1.0, 5.0, 510.0, 8.0)).unwrap().unwrap();
        let b = soft.condition(&fix(1.0, 5.0, 510.0, 40.0)).unwrap().unwrap();

        // GPS reference 4 m: weight 0.5 at 8 m, 0.15 floor at 40 m.
        assert!((a.elevation_delta_m - 5.0).abs() < 1e-9);
        assert!((b.elevation_delta_m - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_source_kind_selects_profile() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 1.0)).unwrap();
        let baro = Fix::at_seconds(1.0, north(5.0), LON)
            .with_altitude(510.0, AltitudeSource::Barometric(2.0));
        let sample = c.condition(&baro).unwrap().unwrap();

        // Barometric reference 1 m: weight 0.5 at 2 m.
        assert!((sample.elevation_delta_m - 5.0).abs() < 1e-9);
        // The worst reading in the sample decides its source.
        assert_eq!(sample.vertical_accuracy_m, Some(2.0));
        assert_eq!(sample.altitude_source, Some(SourceKind::Barometric));
    }

    #[test]
    fn test_gps_jump_rejected_without_touching_state() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        c.condition(&fix(1.0, 5.0, 501.0, 2.0)).unwrap();
        let before = c.smoothed_altitude();

        // 300 km/h is 83.3 m/s.
        let jump = fix(2.0, 5.0 + 83.4, 650.0, 2.0);
        assert!(matches!(
            c.condition(&jump),
            Err(InputError::ImplausibleSpeed { .. })
        ));
        assert_eq!(c.smoothed_altitude(), before);

        let sample = c.condition(&fix(3.0, 10.0, 502.0, 2.0)).unwrap().unwrap();
        assert!((sample.distance_delta_m - 5.0).abs() < 0.01);
        assert!((sample.elevation_delta_m - 1.0).abs() < 1e-9);
        assert_eq!(sample.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_altitude_defers_distance() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        let no_alt = Fix::at_seconds(1.0, north(5.0), LON);
        assert_eq!(c.condition(&no_alt).unwrap(), None);

        let sample = c.condition(&fix(2.0, 10.0, 501.0, 2.0)).unwrap().unwrap();
        assert!((sample.distance_delta_m - 10.0).abs() < 0.01);
        assert!((sample.elevation_delta_m - 1.0).abs() < 1e-9);
        assert_eq!(sample.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_stationary_fix_defers_elevation() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        assert_eq!(c.condition(&fix(1.0, 0.0, 500.5, 2.0)).unwrap(), None);

        let sample = c.condition(&fix(2.0, 4.0, 501.0, 2.0)).unwrap().unwrap();
        assert!((sample.elevation_delta_m - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_altitude_after_gap_is_invalid() {
        let mut c = conditioner();
        c.condition(&Fix::at_seconds(0.0, north(0.0), LON)).unwrap();
        let sample = c.condition(&fix(1.0, 5.0, 700.0, 2.0)).unwrap().unwrap();

        assert!(!sample.valid);
        assert_eq!(sample.elevation_delta_m, 0.0);
        assert!((sample.distance_delta_m - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_window_fill_grows_to_one() {
        let mut c = Conditioner::new(&EngineConfig {
            window_size: 4,
            ..Default::default()
        });
        for i in 0..6 {
            let _ = c.condition(&fix(i as f64, i as f64 * 5.0, 500.0, 2.0));
        }
        assert_eq!(c.window_fill(), 1.0);
    }

    #[test]
    fn test_flush_emits_buffered_motion() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        c.condition(&fix(1.0, 5.0, 501.0, 2.0)).unwrap();
        c.condition(&Fix::at_seconds(2.0, north(12.0), LON)).unwrap();

        let flushed = c.flush().unwrap();
        assert!((flushed.distance_delta_m - 7.0).abs() < 0.01);
        assert_eq!(flushed.monotonic, Duration::from_secs(2));
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn test_flush_with_nothing_pending() {
        let mut c = conditioner();
        assert_eq!(c.flush(), None);
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        c.condition(&fix(1.0, 5.0, 501.0, 2.0)).unwrap();
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut c = conditioner();
        c.condition(&fix(0.0, 0.0, 500.0, 2.0)).unwrap();
        c.reset();
        assert_eq!(c.smoothed_altitude(), None);
        assert_eq!(c.window_fill(), 0.0);
        assert_eq!(c.condition(&fix(1.0, 5.0, 900.0, 2.0)).unwrap(), None);
    }
}

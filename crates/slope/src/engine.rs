//! The synchronous core: one instance per location stream, fed one fix at a
//! time in arrival order.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    aggregator::{Summary, TrackMetric as _, accumulate},
    conditioner::Conditioner,
    config::EngineConfig,
    errors::{InputError, SessionError},
    estimator::Estimator,
    ingest::{FixValidator, Warning},
    models::{ConditionedSample, Fix, GradeSample, TrackPoint},
    session::{Command, Session, SessionState, StateKind, Transition},
};

/// What a rider sees between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub grade: Option<f64>,
    pub confidence: Option<f64>,
    pub speed_kmh: f64,
    pub altitude_m: Option<f64>,
    pub distance_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub summary: Summary,
}

impl LiveSnapshot {
    fn new(point: &TrackPoint, previous: Option<&LiveSnapshot>, summary: Summary) -> Self {
        let (grade, confidence) = match (&point.grade, previous) {
            (Some(g), _) => (Some(g.grade), Some(g.confidence)),
            (None, Some(prev)) => (prev.grade, prev.confidence),
            (None, None) => (None, None),
        };
        Self {
            grade,
            confidence,
            speed_kmh: point.speed_mps() * 3.6,
            altitude_m: point.elevation_m,
            distance_km: summary.distance_m / 1000.0,
            latitude: point.latitude,
            longitude: point.longitude,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    GradeUpdate {
        grade: GradeSample,
        snapshot: LiveSnapshot,
    },
    Warning(Warning),
    StateChanged {
        state: StateKind,
        session_id: Option<Uuid>,
    },
    SessionFinalized {
        session_id: Uuid,
        summary: Summary,
    },
    SessionTerminated {
        session_id: Uuid,
        reason: String,
    },
    PersistenceFailed {
        session_id: Uuid,
        attempt: u32,
        error: String,
        gave_up: bool,
    },
}

/// Everything one call into the engine produced.
#[derive(Debug, Default)]
pub struct Output {
    pub rejected: Option<InputError>,
    pub grade: Option<GradeSample>,
    pub transition: Option<Transition>,
    pub events: Vec<EngineEvent>,
    /// A session that just ended and should be handed to the track store.
    pub finalized: Option<Session>,
}

#[derive(Debug, Clone)]
pub struct SlopeEngine {
    config: EngineConfig,
    validator: FixValidator,
    conditioner: Conditioner,
    estimator: Estimator,
    state: SessionState,
    live: Option<LiveSnapshot>,
}

impl SlopeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            validator: FixValidator::new(&config),
            conditioner: Conditioner::new(&config),
            estimator: Estimator::new(&config),
            state: SessionState::default(),
            live: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> StateKind {
        self.state.kind()
    }

    pub fn session(&self) -> Option<&Session> {
        self.state.session()
    }

    pub fn snapshot(&self) -> Option<&LiveSnapshot> {
        self.live.as_ref()
    }

    /// Runs one fix through validation, conditioning and estimation. The
    /// signal chain keeps running in every state so that grades stay
    /// continuous across a pause; only a recording session keeps the result.
    pub fn submit(&mut self, fix: &Fix) -> Output {
        let mut output = Output::default();

        let validated = self.validator.validate(fix);
        self.drain_warning(&mut output);
        if let Err(reason) = validated {
            tracing::debug!("Rejected fix at {:?}: {}", fix.monotonic, reason);
            output.rejected = Some(reason);
            return output;
        }

        let sample = match self.conditioner.condition(fix) {
            Ok(Some(sample)) => sample,
            Ok(None) => return output,
            Err(reason) => {
                self.validator.record_reject();
                self.drain_warning(&mut output);
                output.rejected = Some(reason);
                return output;
            }
        };

        let grade = self.estimator.estimate(&sample);
        output.grade = grade;
        self.record(&sample, grade, &mut output);
        output
    }

    pub fn command(&mut self, command: Command) -> Result<Output, SessionError> {
        let mut output = Output::default();

        match command {
            // A refused start must leave the running signal chain alone.
            Command::Start if self.state.kind() == StateKind::Idle => {
                self.conditioner.reset();
                self.estimator.reset();
                self.live = None;
            }
            Command::Stop if self.state.is_active() => {
                if let Some(sample) = self.conditioner.flush() {
                    let grade = self.estimator.estimate(&sample);
                    self.record(&sample, grade, &mut output);
                }
            }
            Command::Start | Command::Stop | Command::Pause | Command::Resume | Command::Reset => {}
        }

        // A flush can terminate the session, which already stopped it.
        if output.finalized.is_some() {
            return Ok(output);
        }

        let transition = self.state.apply(command, OffsetDateTime::now_utc())?;
        output.events.push(EngineEvent::StateChanged {
            state: self.state.kind(),
            session_id: self.state.session().map(|s| s.id),
        });
        if let Transition::Stopped(session) = &transition {
            output.events.push(EngineEvent::SessionFinalized {
                session_id: session.id,
                summary: session.summary(),
            });
            output.finalized = Some(session.as_ref().clone());
        }
        output.transition = Some(transition);
        Ok(output)
    }

    pub fn start(&mut self) -> Result<Output, SessionError> {
        self.command(Command::Start)
    }

    pub fn pause(&mut self) -> Result<Output, SessionError> {
        self.command(Command::Pause)
    }

    pub fn resume(&mut self) -> Result<Output, SessionError> {
        self.command(Command::Resume)
    }

    pub fn stop(&mut self) -> Result<Output, SessionError> {
        self.command(Command::Stop)
    }

    pub fn reset(&mut self) -> Result<Output, SessionError> {
        self.command(Command::Reset)
    }

    fn record(&mut self, sample: &ConditionedSample, grade: Option<GradeSample>, output: &mut Output) {
        let Some(session) = self.state.recording_mut() else {
            return;
        };

        match accumulate(session, sample, grade) {
            Ok(point) => {
                let snapshot = LiveSnapshot::new(&point, self.live.as_ref(), session.stats.score());
                self.live = Some(snapshot);
                if let Some(grade) = grade {
                    output.events.push(EngineEvent::GradeUpdate { grade, snapshot });
                }
            }
            Err(error) => {
                let reason = error.to_string();
                if let Some(session) = self.state.terminate(reason.clone(), OffsetDateTime::now_utc()) {
                    output.events.push(EngineEvent::SessionTerminated {
                        session_id: session.id,
                        reason,
                    });
                    output.finalized = Some(session);
                }
            }
        }
    }

    fn drain_warning(&mut self, output: &mut Output) {
        if let Some(warning) = self.validator.take_warning() {
            output.events.push(EngineEvent::Warning(warning));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregator::SessionStats, models::AltitudeSource};

    const LAT: f64 = 46.0;
    const LON: f64 = 7.0;

    fn north(meters: f64) -> f64 {
        LAT + (meters / 6_371_008.8).to_degrees()
    }

    fn fix(t: f64, along_m: f64, alt: f64) -> Fix {
        Fix::at_seconds(t, north(along_m), LON).with_altitude(alt, AltitudeSource::Gps(3.0))
    }

    fn recording() -> SlopeEngine {
        let mut engine = SlopeEngine::new(EngineConfig::default());
        engine.start().unwrap();
        engine
    }

    fn grades(output: &Output) -> Vec<f64> {
        output
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::GradeUpdate { grade, .. } => Some(grade.grade),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_climb_then_descent() {
        let mut engine = recording();
        let mut seen = Vec::new();

        // 5 m/s for 60 s up at 10 %, then 60 s down at 10 %.
        for t in 0..=120 {
            let along = t as f64 * 5.0;
            let alt = if t <= 60 {
                100.0 + t as f64 * 0.5
            } else {
                130.0 - (t - 60) as f64 * 0.5
            };
            seen.extend(grades(&engine.submit(&fix(t as f64, along, alt))));
        }
        assert_eq!(seen.len(), 120);
        for g in &seen[..60] {
            assert!((g - 10.0).abs() < 1e-6, "climb grade {g}");
        }
        for g in &seen[63..] {
            assert!((g + 10.0).abs() < 1e-6, "descent grade {g}");
        }

        let output = engine.stop().unwrap();
        let session = output.finalized.unwrap();
        let summary = session.summary();
        assert!((summary.distance_m - 600.0).abs() < 0.01);
        assert!((summary.elevation_gain_m - 30.0).abs() < 1e-6);
        assert!((summary.elevation_loss_m - 30.0).abs() < 1e-6);
        assert!((summary.max_grade.unwrap() - 10.0).abs() < 1e-6);
        assert!((summary.min_grade.unwrap() + 10.0).abs() < 1e-6);
        assert!(output.events.iter().any(|e| matches!(
            e,
            EngineEvent::SessionFinalized { session_id, .. } if *session_id == session.id
        )));
    }

    #[test]
    fn test_pause_discards_grades_but_keeps_continuity() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        let first = engine.submit(&fix(10.0, 30.0, 100.0));
        assert_eq!(grades(&first), vec![0.0]);

        engine.pause().unwrap();
        let paused = engine.submit(&fix(40.0, 60.0, 101.0));
        assert!(paused.grade.is_some());
        assert!(grades(&paused).is_empty());

        engine.resume().unwrap();
        let resumed = engine.submit(&fix(41.0, 70.0, 101.5));
        let g = grades(&resumed);
        assert_eq!(g.len(), 1);
        assert!((g[0] - 5.0).abs() < 1e-6);

        let session = engine.session().unwrap();
        assert_eq!(session.points.len(), 2);
        assert!((session.summary().distance_m - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_refused_start_keeps_signal_chain() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        assert_eq!(grades(&engine.submit(&fix(5.0, 50.0, 105.0))).len(), 1);

        assert_eq!(
            engine.start().unwrap_err(),
            SessionError::InvalidTransition {
                state: StateKind::Recording,
                command: Command::Start,
            }
        );
        let g = grades(&engine.submit(&fix(10.0, 100.0, 110.0)));
        assert_eq!(g.len(), 1);
        assert!((g[0] - 10.0).abs() < 1e-6);

        let summary = engine.session().unwrap().summary();
        assert_eq!(summary.point_count, 2);
        assert!((summary.distance_m - 100.0).abs() < 0.01);
        assert!((summary.elevation_gain_m - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_refused_start_while_paused_keeps_continuity() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        engine.submit(&fix(10.0, 30.0, 100.0));
        engine.pause().unwrap();
        engine.submit(&fix(40.0, 60.0, 101.0));

        assert!(engine.start().is_err());
        assert_eq!(engine.state(), StateKind::Paused);

        engine.resume().unwrap();
        let g = grades(&engine.submit(&fix(41.0, 70.0, 101.5)));
        assert_eq!(g.len(), 1);
        assert!((g[0] - 5.0).abs() < 1e-6);
        assert!((engine.session().unwrap().summary().distance_m - 40.0).abs() < 0.01);
        assert!(engine.snapshot().is_some());
    }

    #[test]
    fn test_short_hop_adds_distance_without_grade() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        let output = engine.submit(&fix(1.0, 0.5, 100.1));
        assert!(output.grade.is_none());
        assert!(output.events.is_empty());

        let summary = engine.session().unwrap().summary();
        assert_eq!(summary.grade_count, 0);
        assert_eq!(summary.point_count, 1);
        assert!((summary.distance_m - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_teleport_is_rejected() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        let jump = engine.submit(&fix(1.0, 84.0, 100.0));
        assert!(matches!(
            jump.rejected,
            Some(InputError::ImplausibleSpeed { .. })
        ));

        let next = engine.submit(&fix(2.0, 10.0, 101.0));
        assert!(next.rejected.is_none());
        // Measured against the last good fix, not the jump.
        let g = grades(&next);
        assert_eq!(g.len(), 1);
        assert!((g[0] - 10.0).abs() < 1e-6);
        assert!((engine.session().unwrap().summary().distance_m - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_dropout_warning_after_consecutive_rejects() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));

        let mut warnings = Vec::new();
        for t in 1..=6 {
            let bad = fix(t as f64, t as f64 * 5.0, 100.0).with_horizontal_accuracy(80.0);
            let output = engine.submit(&bad);
            assert!(matches!(
                output.rejected,
                Some(InputError::HorizontalAccuracy { .. })
            ));
            warnings.extend(output.events);
        }
        assert_eq!(
            warnings,
            vec![EngineEvent::Warning(Warning::SignalDropout {
                consecutive_rejects: 5,
                since: Some(std::time::Duration::ZERO),
            })]
        );

        let back = engine.submit(&fix(7.0, 35.0, 100.0));
        assert!(back.events.contains(&EngineEvent::Warning(Warning::SignalRestored {
            after_rejects: 6
        })));
    }

    #[test]
    fn test_stop_flushes_buffered_motion() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        engine.submit(&fix(1.0, 5.0, 100.0));
        engine.submit(&Fix::at_seconds(2.0, north(10.0), LON));

        let session = engine.stop().unwrap().finalized.unwrap();
        assert_eq!(session.points.len(), 2);
        assert!((session.summary().distance_m - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_fixes_outside_a_session_are_not_recorded() {
        let mut engine = SlopeEngine::new(EngineConfig::default());
        engine.submit(&fix(0.0, 0.0, 100.0));
        let output = engine.submit(&fix(1.0, 5.0, 100.5));
        assert!(output.grade.is_some());
        assert!(output.events.is_empty());
        assert!(engine.session().is_none());
        assert!(engine.snapshot().is_none());
    }

    #[test]
    fn test_invalid_command_is_reported() {
        let mut engine = SlopeEngine::new(EngineConfig::default());
        let error = engine.pause().unwrap_err();
        assert_eq!(
            error,
            SessionError::InvalidTransition {
                state: StateKind::Idle,
                command: Command::Pause,
            }
        );
        assert_eq!(engine.state(), StateKind::Idle);
    }

    #[test]
    fn test_snapshot_tracks_current_data() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        engine.submit(&fix(2.0, 10.0, 101.0));

        let snapshot = engine.snapshot().unwrap();
        assert!((snapshot.grade.unwrap() - 10.0).abs() < 1e-6);
        assert!((snapshot.speed_kmh - 18.0).abs() < 0.01);
        assert_eq!(snapshot.altitude_m, Some(101.0));
        assert!((snapshot.distance_km - 0.01).abs() < 1e-5);
        assert!((snapshot.latitude - north(10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_persisted_log_recomputes_to_same_stats() {
        let mut engine = recording();
        for t in 0..40 {
            let alt = 200.0 + (t as f64 * 0.7).sin() * 4.0;
            engine.submit(&fix(t as f64, t as f64 * 4.0, alt));
        }
        let session = engine.stop().unwrap().finalized.unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(SessionStats::recompute(&restored.points), session.stats);
        assert_eq!(restored, session);
    }

    #[test]
    fn test_start_after_reset_begins_fresh_session() {
        let mut engine = recording();
        engine.submit(&fix(0.0, 0.0, 100.0));
        engine.submit(&fix(1.0, 5.0, 100.5));
        let first = engine.stop().unwrap().finalized.unwrap();
        engine.reset().unwrap();

        engine.start().unwrap();
        let output = engine.submit(&fix(2.0, 10.0, 200.0));
        assert!(output.grade.is_none());
        let second = engine.session().unwrap();
        assert_ne!(second.id, first.id);
        assert!(second.points.is_empty());
    }
}

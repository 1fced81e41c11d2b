//! Recording lifecycle.
//!
//! The state owns the session for as long as it is live; a stopped session
//! stays inspectable until an explicit reset hands it out.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    aggregator::{SessionStats, Summary, TrackMetric as _},
    errors::SessionError,
    models::{GradeSample, TrackPoint},
};

/// One continuous recording interval with its own statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub points: Vec<TrackPoint>,
    pub stats: SessionStats,
    /// Set when an invariant violation ended the session early.
    pub termination: Option<String>,
}

impl Session {
    pub fn new(started_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            ended_at: None,
            points: Vec::new(),
            stats: SessionStats::default(),
            termination: None,
        }
    }

    pub fn grade_samples(&self) -> impl Iterator<Item = &GradeSample> {
        self.points.iter().filter_map(|p| p.grade.as_ref())
    }

    pub fn summary(&self) -> Summary {
        self.stats.score()
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    fn finalize(&mut self, ended_at: OffsetDateTime) {
        self.ended_at = Some(ended_at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Idle,
    Recording,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording(Session),
    Paused(Session),
    Stopped(Session),
}

/// What a successful transition did.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started(Uuid),
    Paused(Uuid),
    Resumed(Uuid),
    /// Carries a copy of the finalized session for persistence.
    Stopped(Box<Session>),
    /// Hands the finalized session out of the state machine.
    Reset(Box<Session>),
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Idle => StateKind::Idle,
            SessionState::Recording(_) => StateKind::Recording,
            SessionState::Paused(_) => StateKind::Paused,
            SessionState::Stopped(_) => StateKind::Stopped,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Idle => None,
            SessionState::Recording(s) | SessionState::Paused(s) | SessionState::Stopped(s) => {
                Some(s)
            }
        }
    }

    /// The session accepting samples, only while recording.
    pub fn recording_mut(&mut self) -> Option<&mut Session> {
        match self {
            SessionState::Recording(s) => Some(s),
            SessionState::Idle | SessionState::Paused(_) | SessionState::Stopped(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Recording(_) | SessionState::Paused(_))
    }

    pub fn apply(&mut self, command: Command, now: OffsetDateTime) -> Result<Transition, SessionError> {
        let (next, result) = match (std::mem::take(self), command) {
            (SessionState::Idle, Command::Start) => {
                let session = Session::new(now);
                let id = session.id;
                (SessionState::Recording(session), Ok(Transition::Started(id)))
            }
            (SessionState::Recording(session), Command::Pause) => {
                let id = session.id;
                (SessionState::Paused(session), Ok(Transition::Paused(id)))
            }
            (SessionState::Paused(session), Command::Resume) => {
                let id = session.id;
                (SessionState::Recording(session), Ok(Transition::Resumed(id)))
            }
            (SessionState::Recording(mut session) | SessionState::Paused(mut session), Command::Stop) => {
                session.finalize(now);
                let record = Box::new(session.clone());
                (SessionState::Stopped(session), Ok(Transition::Stopped(record)))
            }
            (SessionState::Stopped(session), Command::Reset) => {
                (SessionState::Idle, Ok(Transition::Reset(Box::new(session))))
            }
            (
                state @ SessionState::Idle,
                Command::Pause | Command::Resume | Command::Stop | Command::Reset,
            )
            | (
                state @ SessionState::Recording(_),
                Command::Start | Command::Resume | Command::Reset,
            )
            | (
                state @ SessionState::Paused(_),
                Command::Start | Command::Pause | Command::Reset,
            )
            | (
                state @ SessionState::Stopped(_),
                Command::Start | Command::Pause | Command::Resume | Command::Stop,
            ) => {
                let error = SessionError::InvalidTransition {
                    state: state.kind(),
                    command,
                };
                (state, Err(error))
            }
        };

        *self = next;
        if let Ok(transition) = &result {
            tracing::info!("Session transition {:?} -> {:?}", command, self.kind());
            tracing::debug!(?transition);
        }
        result
    }

    /// Ends the live session after an invariant violation, keeping the data
    /// collected so far. Returns the finalized copy for persistence.
    pub fn terminate(&mut self, reason: String, now: OffsetDateTime) -> Option<Session> {
        match std::mem::take(self) {
            SessionState::Recording(mut session) | SessionState::Paused(mut session) => {
                tracing::error!("Terminating session {}: {}", session.id, reason);
                session.termination = Some(reason);
                session.finalize(now);
                let record = session.clone();
                *self = SessionState::Stopped(session);
                Some(record)
            }
            state @ (SessionState::Idle | SessionState::Stopped(_)) => {
                *self = state;
                None
            }
        }
    }
}

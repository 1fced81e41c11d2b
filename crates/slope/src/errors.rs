use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::session::{Command, StateKind};

/// Why a fix was not turned into a sample. Always recovered locally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Malformed fix: {0}")]
    Malformed(String),

    #[error("Horizontal accuracy {accuracy_m:.1} m exceeds ceiling of {ceiling_m:.1} m")]
    HorizontalAccuracy { accuracy_m: f64, ceiling_m: f64 },

    #[error("Altitude missing for {consecutive} consecutive fixes")]
    AltitudeDropout { consecutive: u32 },

    #[error("Non-monotonic timestamp {got:?} (last accepted {last:?})")]
    NonMonotonic { got: Duration, last: Duration },

    #[error("Implied speed {speed_mps:.1} m/s exceeds {max_mps:.1} m/s")]
    ImplausibleSpeed { speed_mps: f64, max_mps: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot {command:?} while {state:?}")]
    InvalidTransition { state: StateKind, command: Command },

    #[error("Invariant violated in session {session_id}: {detail}")]
    InvariantViolation { session_id: Uuid, detail: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPX parse error: {0}")]
    Parse(#[from] gpx::errors::GpxError),

    #[error("Track point {0} has no timestamp")]
    MissingTime(usize),

    #[error("No track points found")]
    Empty,
}

#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
    #[error("Pipeline has shut down")]
    Closed,

    #[error("Input queue is full")]
    Full,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}

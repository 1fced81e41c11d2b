pub mod aggregator;
pub mod conditioner;
pub mod config;
pub mod engine;
pub mod errors;
pub mod estimator;
pub mod export;
pub mod gpx_import;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod track_store;

pub use crate::{
    aggregator::{SessionStats, Summary},
    config::EngineConfig,
    engine::{EngineEvent, LiveSnapshot, SlopeEngine},
    errors::{ConfigError, ImportError, InputError, PersistenceError, PipelineError, SessionError},
    ingest::Warning,
    models::{AltitudeReading, AltitudeSource, Fix, GradeSample, SourceKind, TrackPoint},
    pipeline::{PipelineHandle, PipelineOptions, RetryPolicy},
    session::{Command, Session, StateKind},
    track_store::{ObjectTrackStore, TrackStore},
};

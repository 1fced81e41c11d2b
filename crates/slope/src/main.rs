//! Replays a recorded GPX ride through the engine and stores the session.
//!
//! ```
//! cargo run -p slope --bin slope-replay -- ride.gpx
//! ```

use std::{env, sync::Arc};

use anyhow::Context as _;
use slope::{
    Command, EngineConfig, EngineEvent, ObjectTrackStore, PipelineOptions, SlopeEngine,
    gpx_import::{self, ImportOptions},
    pipeline,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let path = env::args()
        .nth(1)
        .context("usage: slope-replay <ride.gpx>")?;

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    let fixes = gpx_import::load_file(&path, &ImportOptions::default())
        .with_context(|| format!("Failed to import {path}"))?;
    tracing::info!("Replaying {} fixes from {}", fixes.len(), path);

    let store_path = env::var("TRACK_STORE_PATH").unwrap_or_else(|_| "./tracks".to_string());
    let store = Arc::new(ObjectTrackStore::new_local(&store_path)?);

    let handle = pipeline::spawn(SlopeEngine::new(config), store, PipelineOptions::default());
    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::GradeUpdate { .. }) => {}
                Ok(event) => println!("{}", serde_json::to_string(&event).unwrap_or_default()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    handle.command(Command::Start).await?;
    for fix in fixes {
        handle.submit(fix).await?;
    }
    handle.command(Command::Stop).await?;

    let engine = handle.shutdown().await?;
    printer.await?;

    if let Some(session) = engine.session() {
        tracing::info!("Session {} stored under {}", session.id, store_path);
        println!("{}", serde_json::to_string_pretty(&session.summary())?);
    }

    Ok(())
}

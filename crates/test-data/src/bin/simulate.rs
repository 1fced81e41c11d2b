//! Generates a synthetic ride, runs it through the engine and compares the
//! result with the ground truth. Optionally writes the fixes as GPX for
//! `slope-replay`.
//!
//! Run with:
//! ```
//! RIDE_SEED=7 RIDE_NOISE=phone RIDE_REGION=boulder cargo run -p test-data --bin simulate -- ride.gpx
//! ```

use anyhow::Context as _;
use test_data::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let seed = std::env::var("RIDE_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(12345);
    let noise = match std::env::var("RIDE_NOISE").as_deref() {
        Ok("perfect") => SensorNoise::perfect(),
        Ok("barometric") => SensorNoise::barometric(),
        Ok("urban") => SensorNoise::urban_canyon(),
        _ => SensorNoise::phone(),
    };

    let (region, terrain) = match std::env::var("RIDE_REGION").as_deref() {
        Ok("boulder") => (Region::BOULDER, ElevationGenerator::rolling(seed as u32)),
        Ok("flevoland") => (Region::FLEVOLAND, ElevationGenerator::flat(seed as u32)),
        _ => (Region::OBERLAND, ElevationGenerator::alpine(seed as u32)),
    };

    let config = RideConfig {
        seed,
        distance_m: 20_000.0,
        region,
        noise,
        ..RideConfig::default()
    };
    let ride = RideGenerator::new(config, terrain).generate(&CyclistProfile::road());
    tracing::info!("Generated {} fixes", ride.fixes.len());

    if let Some(path) = std::env::args().nth(1) {
        GpxWriter::write_file(&path, &ride.fixes, Some("Synthetic ride"))
            .with_context(|| format!("Failed to write {path}"))?;
        tracing::info!("Wrote {}", path);
    }

    let mut engine = SlopeEngine::new(EngineConfig::from_env()?);
    engine.start()?;
    let mut rejected = 0;
    for fix in &ride.fixes {
        if engine.submit(fix).rejected.is_some() {
            rejected += 1;
        }
    }
    let session = engine
        .stop()?
        .finalized
        .context("Stopping did not finalize a session")?;
    let summary = session.summary();

    tracing::info!("Simulation completed!");
    tracing::info!("  Rejected fixes: {}", rejected);
    tracing::info!(
        "  Distance: {:.0} m (truth {:.0} m)",
        summary.distance_m,
        ride.true_distance_m()
    );
    tracing::info!(
        "  Gain: {:.0} m (truth {:.0} m)",
        summary.elevation_gain_m,
        ride.true_gain_m()
    );
    tracing::info!(
        "  Loss: {:.0} m (truth {:.0} m)",
        summary.elevation_loss_m,
        ride.true_loss_m()
    );
    tracing::info!(
        "  Grade: max {:?} min {:?} mean {:?}",
        summary.max_grade,
        summary.min_grade,
        summary.mean_grade
    );

    Ok(())
}

//! Replays recorded GPX tracks as a fix stream.

use std::{io::Read, path::Path, time::Duration};

use gpx::{Gpx, Waypoint, read};
use time::OffsetDateTime;

use crate::{
    errors::ImportError,
    models::{AltitudeSource, Fix, SourceKind},
};

/// User equivalent range error: converts a dilution of precision into meters.
const UERE_M: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Sensor to attribute `<ele>` readings to.
    pub altitude_source: SourceKind,
    /// Used when a point has no `<vdop>`.
    pub vertical_accuracy_m: f64,
    /// Used when a point has no `<hdop>`.
    pub horizontal_accuracy_m: f64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            altitude_source: SourceKind::Gps,
            vertical_accuracy_m: 10.0,
            horizontal_accuracy_m: 5.0,
        }
    }
}

pub fn load_file(path: impl AsRef<Path>, options: &ImportOptions) -> Result<Vec<Fix>, ImportError> {
    let file = std::fs::File::open(path)?;
    read_fixes(std::io::BufReader::new(file), options)
}

pub fn read_fixes(reader: impl Read, options: &ImportOptions) -> Result<Vec<Fix>, ImportError> {
    let gpx: Gpx = read(reader)?;
    extract_fixes(&gpx, options)
}

/// Flattens every track segment into one stream. The first timestamp is the
/// zero of the monotonic clock.
pub fn extract_fixes(gpx: &Gpx, options: &ImportOptions) -> Result<Vec<Fix>, ImportError> {
    let waypoints = gpx
        .tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points);

    let mut origin: Option<OffsetDateTime> = None;
    let mut fixes = Vec::new();

    for (index, waypoint) in waypoints.enumerate() {
        let wall_clock = waypoint
            .time
            .map(OffsetDateTime::from)
            .ok_or(ImportError::MissingTime(index))?;
        let origin = *origin.get_or_insert(wall_clock);
        // Points before the first one map to zero and are rejected downstream.
        let monotonic = Duration::try_from(wall_clock - origin).unwrap_or_default();

        fixes.push(to_fix(waypoint, monotonic, wall_clock, options));
    }

    if fixes.is_empty() {
        return Err(ImportError::Empty);
    }
    tracing::debug!("Imported {} fixes", fixes.len());
    Ok(fixes)
}

fn to_fix(
    waypoint: &Waypoint,
    monotonic: Duration,
    wall_clock: OffsetDateTime,
    options: &ImportOptions,
) -> Fix {
    let point = waypoint.point();
    let horizontal_accuracy_m = waypoint
        .hdop
        .map_or(options.horizontal_accuracy_m, |hdop| hdop * UERE_M);

    let fix = Fix {
        monotonic,
        ..Fix::at_seconds(0.0, point.y(), point.x())
    }
    .with_wall_clock(wall_clock)
    .with_horizontal_accuracy(horizontal_accuracy_m);

    match waypoint.elevation {
        Some(meters) => {
            let vacc = waypoint
                .vdop
                .map_or(options.vertical_accuracy_m, |vdop| vdop * UERE_M);
            let source = match options.altitude_source {
                SourceKind::Gps => AltitudeSource::Gps(vacc),
                SourceKind::Barometric => AltitudeSource::Barometric(vacc),
                SourceKind::Fused => AltitudeSource::Fused(vacc),
            };
            fix.with_altitude(meters, source)
        }
        None => fix,
    }
}

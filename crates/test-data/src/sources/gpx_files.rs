//! Writes synthetic fix streams as GPX so they can be replayed.

use std::{io::Write, path::Path};

use geo::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use slope::{Fix, gpx_import};
use thiserror::Error;

/// Matches the DOP conversion used on import.
const UERE_M: f64 = 5.0;

#[derive(Debug, Error)]
pub enum GpxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error(transparent)]
    Import(#[from] slope::ImportError),
}

pub struct GpxWriter;

impl GpxWriter {
    /// One track, one segment, one waypoint per fix. Accuracies are written as
    /// dilution of precision.
    pub fn to_gpx(fixes: &[Fix], name: Option<&str>) -> Gpx {
        let points = fixes
            .iter()
            .map(|fix| {
                let mut wp = Waypoint::new(Point::new(fix.longitude, fix.latitude));
                wp.time = Some(gpx::Time::from(fix.wall_clock));
                wp.hdop = Some(fix.horizontal_accuracy_m / UERE_M);
                if let Some(altitude) = fix.altitude {
                    wp.elevation = Some(altitude.meters);
                    wp.vdop = Some(altitude.source.accuracy_m() / UERE_M);
                }
                wp
            })
            .collect();

        let mut track = Track::new();
        track.name = name.map(String::from);
        track.segments = vec![TrackSegment { points }];

        Gpx {
            version: GpxVersion::Gpx11,
            creator: Some("slope-test-data".to_string()),
            tracks: vec![track],
            ..Default::default()
        }
    }

    pub fn write(writer: impl Write, fixes: &[Fix], name: Option<&str>) -> Result<(), GpxError> {
        gpx::write(&Self::to_gpx(fixes, name), writer)?;
        Ok(())
    }

    pub fn write_file(
        path: impl AsRef<Path>,
        fixes: &[Fix],
        name: Option<&str>,
    ) -> Result<(), GpxError> {
        let file = std::fs::File::create(path)?;
        Self::write(std::io::BufWriter::new(file), fixes, name)
    }

    /// Reads a file written by [`GpxWriter::write_file`] back as fixes.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Fix>, GpxError> {
        Ok(gpx_import::load_file(path, &gpx_import::ImportOptions::default())?)
    }
}

//! Session export formats.
//!
//! JSON is the canonical record: the full track point log plus the summary
//! computed from it. GPX is for other tools; each point carries its grade in
//! a `slope` extension element.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use crate::{
    aggregator::Summary,
    models::{GradeSample, TrackPoint},
    session::Session,
};

pub const SLOPE_GPX_NAMESPACE: &str = "https://slope.invalid/gpx/1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub summary: Summary,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            session: session.clone(),
            summary: session.summary(),
        }
    }
}

pub fn to_json(session: &Session) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(&SessionRecord::from(session))
}

/// Renders a session as GPX 1.1.
pub fn to_gpx(session: &Session) -> String {
    let name = session
        .started_at
        .format(&Rfc3339)
        .map(|ts| format!("Ride {ts}"))
        .unwrap_or_else(|_| format!("Ride {}", session.id));

    let mut doc = XmlWriter::default();
    doc.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.open(
        "gpx",
        &[
            ("version", "1.1"),
            ("creator", "slope"),
            ("xmlns", "http://www.topografix.com/GPX/1/1"),
            ("xmlns:slope", SLOPE_GPX_NAMESPACE),
        ],
    );

    doc.open("metadata", &[]);
    doc.leaf("name", &[], &name);
    doc.close("metadata");

    doc.open("trk", &[]);
    doc.leaf("name", &[], &name);
    if let Some(reason) = &session.termination {
        doc.leaf("desc", &[], reason);
    }
    doc.open("trkseg", &[]);
    for point in &session.points {
        push_point(&mut doc, point);
    }
    doc.close("trkseg");
    doc.close("trk");
    doc.close("gpx");

    doc.finish()
}

fn push_point(doc: &mut XmlWriter, point: &TrackPoint) {
    let lat = format!("{:.7}", point.latitude);
    let lon = format!("{:.7}", point.longitude);
    doc.open("trkpt", &[("lat", lat.as_str()), ("lon", lon.as_str())]);

    if let Some(ele) = point.elevation_m {
        doc.leaf("ele", &[], &format!("{ele:.2}"));
    }
    if let Ok(ts) = point.wall_clock.format(&Rfc3339) {
        doc.leaf("time", &[], &ts);
    }
    if let Some(grade) = &point.grade {
        push_grade(doc, grade);
    }

    doc.close("trkpt");
}

/// The grade travels as `<slope:grade confidence=".." clamped="..">` inside
/// the point's extensions, which GPX readers without the namespace skip.
fn push_grade(doc: &mut XmlWriter, grade: &GradeSample) {
    let confidence = format!("{:.2}", grade.confidence);
    let clamped = grade.clamped.to_string();
    doc.open("extensions", &[]);
    doc.leaf(
        "slope:grade",
        &[("confidence", confidence.as_str()), ("clamped", clamped.as_str())],
        &format!("{:.2}", grade.grade),
    );
    doc.close("extensions");
}

/// Indenting line writer for the handful of elements a track needs.
#[derive(Debug, Default)]
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.line(&format!("<{tag}{}>", attributes(attrs)));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{tag}>"));
    }

    fn leaf(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) {
        self.line(&format!("<{tag}{}>{}</{tag}>", attributes(attrs), escape(text)));
    }

    fn finish(self) -> String {
        self.out
    }
}

fn attributes(attrs: &[(&str, &str)]) -> String {
    attrs
        .iter()
        .map(|(key, value)| format!(r#" {key}="{}""#, escape(value)))
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

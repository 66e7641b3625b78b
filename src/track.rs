use chrono::{DateTime, Utc};

/// A single timestamped GPS fix.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
    pub time: DateTime<Utc>,
}

/// One contiguous recording interval (<trkseg>), with start/end/count
/// derived from its point sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    pub points: Vec<TrackPoint>,
}

impl Segment {
    /// Build a segment from a non-empty point sequence.
    /// The parser guarantees at least one point per <trkseg>.
    pub fn from_points(id: usize, points: Vec<TrackPoint>) -> Self {
        debug_assert!(!points.is_empty());
        Self {
            id,
            start: points[0].time,
            end: points[points.len() - 1].time,
            count: points.len(),
            points,
        }
    }
}

/// The full loaded collection of segments from one or more files.
/// Replaced wholesale on each successful open, dropped on clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub segments: Vec<Segment>,
}

impl Track {
    /// Merge per-file segment lists in file-selection order.
    /// Identifiers are reassigned to the final position in the combined
    /// sequence, so they are unique across the whole track.
    pub fn merge(per_file: Vec<Vec<Segment>>) -> Self {
        let mut segments: Vec<Segment> = per_file.into_iter().flatten().collect();
        for (id, segment) in segments.iter_mut().enumerate() {
            segment.id = id;
        }
        Self { segments }
    }
}

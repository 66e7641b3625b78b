use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::track::Segment;

/// One drawable line segment between two adjacent points, consumed by the
/// map line layer. Field names follow the layer's accessor contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    pub segment_id: usize,
    /// [lon, lat] of the earlier point.
    pub from: [f64; 2],
    /// [lon, lat] of the later point.
    pub to: [f64; 2],
    /// Elevation of the "to" point, in meters.
    pub ele: f64,
    /// Timestamp of the "to" point.
    pub time: DateTime<Utc>,
    /// Whether the owning segment is the currently selected one.
    pub highlighted: bool,
}

/// Flatten segments into line records for map rendering.
///
/// Visits segments in order and emits one record per adjacent point pair,
/// so a segment with fewer than 2 points contributes nothing. The output is
/// fully regenerated on every call; nothing is cached between invocations.
pub fn segments_to_line_data(segments: &[Segment], selected: Option<usize>) -> Vec<LineRecord> {
    let mut data = Vec::new();

    for segment in segments {
        let highlighted = selected == Some(segment.id);
        for pair in segment.points.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            data.push(LineRecord {
                segment_id: segment.id,
                from: [from.lon, from.lat],
                to: [to.lon, to.lat],
                ele: to.ele,
                time: to.time,
                highlighted,
            });
        }
    }

    data
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::GpxViewError;
use crate::line_data::{LineRecord, segments_to_line_data};
use crate::parser::parse_gpx;
use crate::track::Track;

/// Current selection within the loaded track.
///
/// A point selection is only meaningful relative to a selected segment, so
/// the point variant carries both indices. Loading a new track resets the
/// selection entirely; selecting a segment discards any point selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Segment(usize),
    Point {
        segment: usize,
        point: usize,
    },
}

impl Selection {
    pub fn segment(&self) -> Option<usize> {
        match *self {
            Selection::None => None,
            Selection::Segment(segment) | Selection::Point { segment, .. } => Some(segment),
        }
    }

    pub fn point(&self) -> Option<usize> {
        match *self {
            Selection::Point { point, .. } => Some(point),
            _ => None,
        }
    }
}

/// One row of the segments table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    pub id: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

/// One row of the points table. The id is the point's position within the
/// displayed segment; it is not stable beyond the current listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRow {
    pub id: usize,
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
}

/// The single marker fed to the icon layer when a point is selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerRecord {
    /// [lon, lat] of the selected point.
    pub coordinates: [f64; 2],
}

/// A file that was dropped from the last load batch, kept so the caller can
/// surface it instead of the failure disappearing silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of reading one user-selected file. Batches are handed to
/// `finish_load` in file-selection order, not completion order.
#[derive(Debug)]
pub struct FileRead {
    pub name: String,
    pub result: Result<String, GpxViewError>,
}

impl FileRead {
    pub fn ok(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: Ok(text.into()),
        }
    }

    pub fn err(name: impl Into<String>, error: GpxViewError) -> Self {
        Self {
            name: name.into(),
            result: Err(error),
        }
    }
}

/// The viewer's state container: the loaded track, the current selection,
/// and every derived display collection.
///
/// All mutation goes through the transition methods below; each transition
/// ends with one synchronous recomputation of the derived collections, so
/// there is no implicit effect graph and no partial update.
#[derive(Debug, Default)]
pub struct ViewerState {
    track: Option<Track>,
    selection: Selection,
    generation: u64,
    segment_rows: Vec<SegmentRow>,
    point_rows: Vec<PointRow>,
    line_data: Vec<LineRecord>,
    marker: Option<MarkerRecord>,
    failed_files: Vec<FailedFile>,
}

impl ViewerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load batch and return its token. Starting a batch
    /// supersedes any batch still in flight.
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Apply a completed load batch.
    ///
    /// Unreadable files are dropped and the batch proceeds with the rest.
    /// If any surviving file fails to parse, the whole batch is a no-op and
    /// the previous track stays in place. Dropped file names are recorded in
    /// `failed_files` either way. A batch whose token was superseded by a
    /// newer `begin_load` or an intervening `clear` is discarded.
    pub fn finish_load(&mut self, generation: u64, files: Vec<FileRead>) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "discarding superseded load batch"
            );
            return;
        }

        let mut failed = Vec::new();
        let mut parsed = Vec::new();
        let mut parse_failed = false;

        for file in files {
            let text = match file.result {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "dropping unreadable file");
                    failed.push(FailedFile {
                        name: file.name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match parse_gpx(&text) {
                Ok(segments) => parsed.push(segments),
                Err(e) => {
                    warn!(file = %file.name, error = %e, "failed to parse GPX file");
                    failed.push(FailedFile {
                        name: file.name,
                        reason: e.to_string(),
                    });
                    parse_failed = true;
                }
            }
        }

        self.failed_files = failed;

        if parse_failed {
            return;
        }

        self.track = Some(Track::merge(parsed));
        self.selection = Selection::None;
        self.refresh();
    }

    /// Drop the track and all derived views. Also supersedes any load batch
    /// still in flight, so a slow open cannot resurrect cleared state.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.track = None;
        self.selection = Selection::None;
        self.failed_files.clear();
        self.refresh();
    }

    /// Select a segment by its table row id, discarding any point selection.
    pub fn select_segment(&mut self, index: usize) {
        let Some(track) = &self.track else {
            warn!(index, "segment selection without a loaded track");
            return;
        };
        if index >= track.segments.len() {
            warn!(
                index,
                segments = track.segments.len(),
                "segment selection out of range"
            );
            return;
        }
        self.selection = Selection::Segment(index);
        self.refresh();
    }

    /// Select a point by its row id within the currently selected segment.
    pub fn select_point(&mut self, index: usize) {
        let (Some(track), Some(segment)) = (&self.track, self.selection.segment()) else {
            warn!(index, "point selection without a selected segment");
            return;
        };
        let count = track.segments[segment].count;
        if index >= count {
            warn!(index, count, "point selection out of range");
            return;
        }
        self.selection = Selection::Point {
            segment,
            point: index,
        };
        self.refresh();
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn segment_rows(&self) -> &[SegmentRow] {
        &self.segment_rows
    }

    pub fn point_rows(&self) -> &[PointRow] {
        &self.point_rows
    }

    pub fn line_data(&self) -> &[LineRecord] {
        &self.line_data
    }

    pub fn marker(&self) -> Option<&MarkerRecord> {
        self.marker.as_ref()
    }

    pub fn failed_files(&self) -> &[FailedFile] {
        &self.failed_files
    }

    /// Recompute every derived collection from (track, selection).
    /// Runs synchronously at the end of each transition; derived state is
    /// regenerated from scratch, never patched.
    fn refresh(&mut self) {
        let segments = self
            .track
            .as_ref()
            .map(|t| t.segments.as_slice())
            .unwrap_or(&[]);

        self.segment_rows = segments
            .iter()
            .map(|s| SegmentRow {
                id: s.id,
                start: s.start,
                end: s.end,
                count: s.count,
            })
            .collect();

        // The points table and line layer only show data once a segment is
        // selected; loading alone leaves them empty.
        match self.selection.segment() {
            Some(selected) => {
                self.point_rows = segments[selected]
                    .points
                    .iter()
                    .enumerate()
                    .map(|(id, p)| PointRow {
                        id,
                        time: p.time,
                        lat: p.lat,
                        lon: p.lon,
                        ele: p.ele,
                    })
                    .collect();
                self.line_data = segments_to_line_data(segments, Some(selected));
            }
            None => {
                self.point_rows = Vec::new();
                self.line_data = Vec::new();
            }
        }

        self.marker = match self.selection {
            Selection::Point { segment, point } => {
                let p = &segments[segment].points[point];
                Some(MarkerRecord {
                    coordinates: [p.lon, p.lat],
                })
            }
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trkpt(lat: f64, lon: f64, time: &str) -> String {
        format!(
            r#"<trkpt lat="{lat}" lon="{lon}"><ele>100.0</ele><time>{time}</time></trkpt>"#
        )
    }

    fn single_segment_gpx(points: &[(f64, f64, &str)]) -> String {
        let pts: String = points
            .iter()
            .map(|&(lat, lon, time)| trkpt(lat, lon, time))
            .collect();
        format!(r#"<gpx version="1.1"><trk><trkseg>{pts}</trkseg></trk></gpx>"#)
    }

    fn two_segment_gpx() -> String {
        let seg0 = trkpt(35.0, 139.0, "2025-01-01T00:00:00Z")
            + &trkpt(35.1, 139.1, "2025-01-01T00:01:00Z")
            + &trkpt(35.2, 139.2, "2025-01-01T00:02:00Z");
        let seg1 = trkpt(36.0, 140.0, "2025-01-01T01:00:00Z")
            + &trkpt(36.1, 140.1, "2025-01-01T01:01:00Z");
        format!(
            r#"<gpx version="1.1"><trk><trkseg>{seg0}</trkseg><trkseg>{seg1}</trkseg></trk></gpx>"#
        )
    }

    fn loaded_viewer() -> ViewerState {
        let mut viewer = ViewerState::new();
        let generation = viewer.begin_load();
        viewer.finish_load(generation, vec![FileRead::ok("track.gpx", two_segment_gpx())]);
        viewer
    }

    #[test]
    fn test_load_populates_segment_rows_only() {
        let viewer = loaded_viewer();

        assert!(viewer.has_track());
        assert_eq!(viewer.segment_rows().len(), 2);
        assert_eq!(viewer.segment_rows()[0].count, 3);
        assert_eq!(viewer.segment_rows()[1].count, 2);
        // No selection yet: points table, line layer and marker stay empty.
        assert_eq!(viewer.selection(), Selection::None);
        assert!(viewer.point_rows().is_empty());
        assert!(viewer.line_data().is_empty());
        assert!(viewer.marker().is_none());
    }

    #[test]
    fn test_merge_order_follows_file_selection_order() {
        let mut viewer = ViewerState::new();
        let generation = viewer.begin_load();
        // Two files of one segment each, handed over positionally.
        viewer.finish_load(
            generation,
            vec![
                FileRead::ok(
                    "first.gpx",
                    single_segment_gpx(&[
                        (35.0, 139.0, "2025-01-01T00:00:00Z"),
                        (35.1, 139.1, "2025-01-01T00:01:00Z"),
                    ]),
                ),
                FileRead::ok(
                    "second.gpx",
                    single_segment_gpx(&[
                        (36.0, 140.0, "2025-01-02T00:00:00Z"),
                        (36.1, 140.1, "2025-01-02T00:01:00Z"),
                    ]),
                ),
            ],
        );

        let rows = viewer.segment_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[1].id, 1);
        assert_eq!(rows[0].start, "2025-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
        assert_eq!(rows[1].start, "2025-01-02T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
    }

    #[test]
    fn test_segment_selection_derives_views() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(1);

        assert_eq!(viewer.selection(), Selection::Segment(1));
        let rows = viewer.point_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[1].id, 1);
        assert!((rows[0].lat - 36.0).abs() < 1e-10);

        // Line data covers both segments, with only segment 1 highlighted.
        let lines = viewer.line_data();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().filter(|l| l.highlighted).all(|l| l.segment_id == 1));
        assert_eq!(lines.iter().filter(|l| l.highlighted).count(), 1);
        assert!(viewer.marker().is_none());
    }

    #[test]
    fn test_point_selection_places_marker() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(1);
        viewer.select_point(0);

        assert_eq!(
            viewer.selection(),
            Selection::Point {
                segment: 1,
                point: 0
            }
        );
        let marker = viewer.marker().unwrap();
        assert_eq!(marker.coordinates, [140.0, 36.0]);
        // Table and line layer keep showing the selected segment.
        assert_eq!(viewer.point_rows().len(), 2);
        assert_eq!(viewer.line_data().len(), 3);
    }

    #[test]
    fn test_reselecting_segment_discards_point() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(1);
        viewer.select_point(1);
        viewer.select_segment(0);

        assert_eq!(viewer.selection(), Selection::Segment(0));
        assert!(viewer.marker().is_none());
        assert_eq!(viewer.point_rows().len(), 3);
    }

    #[test]
    fn test_new_load_resets_selection() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(0);
        viewer.select_point(2);

        let generation = viewer.begin_load();
        viewer.finish_load(
            generation,
            vec![FileRead::ok(
                "other.gpx",
                single_segment_gpx(&[
                    (40.0, 141.0, "2025-02-01T00:00:00Z"),
                    (40.1, 141.1, "2025-02-01T00:01:00Z"),
                ]),
            )],
        );

        assert_eq!(viewer.selection(), Selection::None);
        assert_eq!(viewer.segment_rows().len(), 1);
        assert!(viewer.point_rows().is_empty());
        assert!(viewer.marker().is_none());
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(0);
        viewer.select_point(1);
        viewer.clear();

        assert!(!viewer.has_track());
        assert_eq!(viewer.selection(), Selection::None);
        assert!(viewer.segment_rows().is_empty());
        assert!(viewer.point_rows().is_empty());
        assert!(viewer.line_data().is_empty());
        assert!(viewer.marker().is_none());
    }

    #[test]
    fn test_parse_failure_leaves_previous_track() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(0);

        let generation = viewer.begin_load();
        viewer.finish_load(
            generation,
            vec![
                FileRead::ok(
                    "good.gpx",
                    single_segment_gpx(&[
                        (40.0, 141.0, "2025-02-01T00:00:00Z"),
                        (40.1, 141.1, "2025-02-01T00:01:00Z"),
                    ]),
                ),
                FileRead::ok("bad.gpx", "<gpx version=\"1.1\"></gpx>".to_string()),
            ],
        );

        // The whole batch is dropped; the old track and selection survive.
        assert_eq!(viewer.segment_rows().len(), 2);
        assert_eq!(viewer.selection(), Selection::Segment(0));
        assert_eq!(viewer.failed_files().len(), 1);
        assert_eq!(viewer.failed_files()[0].name, "bad.gpx");
    }

    #[test]
    fn test_read_failure_drops_file_but_batch_proceeds() {
        let mut viewer = ViewerState::new();
        let generation = viewer.begin_load();
        viewer.finish_load(
            generation,
            vec![
                FileRead::err("gone.gpx", GpxViewError::Read("aborted".to_string())),
                FileRead::ok(
                    "ok.gpx",
                    single_segment_gpx(&[
                        (35.0, 139.0, "2025-01-01T00:00:00Z"),
                        (35.1, 139.1, "2025-01-01T00:01:00Z"),
                    ]),
                ),
            ],
        );

        assert!(viewer.has_track());
        assert_eq!(viewer.segment_rows().len(), 1);
        assert_eq!(viewer.failed_files().len(), 1);
        assert_eq!(viewer.failed_files()[0].name, "gone.gpx");
    }

    #[test]
    fn test_all_reads_failing_yields_empty_track() {
        let mut viewer = ViewerState::new();
        let generation = viewer.begin_load();
        viewer.finish_load(
            generation,
            vec![FileRead::err(
                "gone.gpx",
                GpxViewError::Read("unreadable".to_string()),
            )],
        );

        assert!(viewer.has_track());
        assert!(viewer.segment_rows().is_empty());
        assert_eq!(viewer.failed_files().len(), 1);
    }

    #[test]
    fn test_superseded_batch_is_discarded() {
        let mut viewer = ViewerState::new();
        let stale = viewer.begin_load();
        let fresh = viewer.begin_load();

        viewer.finish_load(
            stale,
            vec![FileRead::ok(
                "stale.gpx",
                single_segment_gpx(&[
                    (10.0, 10.0, "2025-01-01T00:00:00Z"),
                    (10.1, 10.1, "2025-01-01T00:01:00Z"),
                ]),
            )],
        );
        assert!(!viewer.has_track());

        viewer.finish_load(
            fresh,
            vec![FileRead::ok(
                "fresh.gpx",
                single_segment_gpx(&[
                    (20.0, 20.0, "2025-01-01T00:00:00Z"),
                    (20.1, 20.1, "2025-01-01T00:01:00Z"),
                ]),
            )],
        );
        assert!(viewer.has_track());
        viewer.select_segment(0);
        assert!((viewer.point_rows()[0].lat - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_clear_supersedes_inflight_batch() {
        let mut viewer = ViewerState::new();
        let generation = viewer.begin_load();
        viewer.clear();

        viewer.finish_load(
            generation,
            vec![FileRead::ok(
                "slow.gpx",
                single_segment_gpx(&[
                    (10.0, 10.0, "2025-01-01T00:00:00Z"),
                    (10.1, 10.1, "2025-01-01T00:01:00Z"),
                ]),
            )],
        );

        assert!(!viewer.has_track());
        assert!(viewer.segment_rows().is_empty());
    }

    #[test]
    fn test_out_of_range_selection_ignored() {
        let mut viewer = loaded_viewer();
        viewer.select_segment(5);
        assert_eq!(viewer.selection(), Selection::None);

        viewer.select_segment(1);
        viewer.select_point(9);
        assert_eq!(viewer.selection(), Selection::Segment(1));
    }

    #[test]
    fn test_point_selection_requires_segment() {
        let mut viewer = loaded_viewer();
        viewer.select_point(0);
        assert_eq!(viewer.selection(), Selection::None);
        assert!(viewer.marker().is_none());
    }
}

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::GpxViewError;
use crate::track::{Segment, TrackPoint};

type Result<T> = std::result::Result<T, GpxViewError>;

/// Parse one GPX document into a flat list of segments.
///
/// All <trkseg> elements across all <trk> elements are flattened into a
/// single sequence in document order. Segment ids are positions within this
/// file; they are reassigned when multiple files are merged into a track.
///
/// The gpx > trk > trkseg > trkpt[lat, lon] + ele/time shape is required:
/// a document without it (or with a point missing a coordinate, elevation,
/// or timestamp) is rejected as a whole.
pub fn parse_gpx(xml: &str) -> Result<Vec<Segment>> {
    let mut reader = Reader::from_str(xml);
    let mut segments: Vec<Segment> = Vec::new();
    let mut saw_track = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"trk" {
                    saw_track = true;
                    parse_track(&mut reader, &mut segments)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxViewError::XmlParse(e)),
            _ => {}
        }
    }

    if !saw_track {
        return Err(GpxViewError::MissingElement {
            parent: "gpx",
            element: "trk",
        });
    }

    Ok(segments)
}

/// Parse a <trk> element, appending one segment per <trkseg>.
fn parse_track<'a>(reader: &mut Reader<&'a [u8]>, segments: &mut Vec<Segment>) -> Result<()> {
    let mut saw_segment = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"trkseg" => {
                    saw_segment = true;
                    let points = parse_segment(reader)?;
                    segments.push(Segment::from_points(segments.len(), points));
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(GpxViewError::XmlParse)?;
                }
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"trkseg" => {
                return Err(GpxViewError::MissingElement {
                    parent: "trkseg",
                    element: "trkpt",
                });
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"trk" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxViewError::XmlParse(e)),
            _ => {}
        }
    }

    if !saw_segment {
        return Err(GpxViewError::MissingElement {
            parent: "trk",
            element: "trkseg",
        });
    }

    Ok(())
}

/// Parse a <trkseg> element into its point sequence.
fn parse_segment<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Vec<TrackPoint>> {
    let mut points = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"trkpt" => points.push(parse_point(&e, reader)?),
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(GpxViewError::XmlParse)?;
                }
            },
            // A self-closing <trkpt/> has no <ele>/<time> children.
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"trkpt" => {
                return Err(GpxViewError::MissingElement {
                    parent: "trkpt",
                    element: "ele",
                });
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"trkseg" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxViewError::XmlParse(e)),
            _ => {}
        }
    }

    if points.is_empty() {
        return Err(GpxViewError::MissingElement {
            parent: "trkseg",
            element: "trkpt",
        });
    }

    Ok(points)
}

/// Parse a <trkpt> element and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(start: &BytesStart<'a>, reader: &mut Reader<&'a [u8]>) -> Result<TrackPoint> {
    let (lat, lon) = parse_lat_lon(start)?;
    let end_name = start.name().0.to_vec(); // own the end tag name for comparison

    let mut ele: Option<f64> = None;
    let mut time: Option<DateTime<Utc>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ele" => {
                    let text = read_text_owned(reader, &e)?;
                    ele = Some(text.parse::<f64>().map_err(|_| {
                        GpxViewError::InvalidElement {
                            element: "ele",
                            value: text,
                        }
                    })?);
                }
                b"time" => {
                    let text = read_text_owned(reader, &e)?;
                    time = Some(text.parse::<DateTime<Utc>>().map_err(|_| {
                        GpxViewError::InvalidTimestamp { value: text }
                    })?);
                }
                _ => {
                    // Skip unknown/extensions elements
                    reader
                        .read_to_end(e.name())
                        .map_err(GpxViewError::XmlParse)?;
                }
            },
            Ok(Event::End(e)) if e.name().0 == end_name.as_slice() => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxViewError::XmlParse(e)),
            _ => {}
        }
    }

    let ele = ele.ok_or(GpxViewError::MissingElement {
        parent: "trkpt",
        element: "ele",
    })?;
    let time = time.ok_or(GpxViewError::MissingElement {
        parent: "trkpt",
        element: "time",
    })?;

    Ok(TrackPoint {
        lat,
        lon,
        ele,
        time,
    })
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<(f64, f64)> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| GpxViewError::XmlParse(e.into()))?;
        let key = attr.key.local_name();
        let val = std::str::from_utf8(&attr.value).unwrap_or_default();
        match key.as_ref() {
            b"lat" => {
                lat = Some(val.parse::<f64>().map_err(|_| {
                    GpxViewError::InvalidAttribute {
                        element: "trkpt",
                        attribute: "lat",
                        value: val.to_string(),
                    }
                })?);
            }
            b"lon" => {
                lon = Some(val.parse::<f64>().map_err(|_| {
                    GpxViewError::InvalidAttribute {
                        element: "trkpt",
                        attribute: "lon",
                        value: val.to_string(),
                    }
                })?);
            }
            _ => {}
        }
    }

    let lat = lat.ok_or(GpxViewError::MissingAttribute {
        element: "trkpt",
        attribute: "lat",
    })?;
    let lon = lon.ok_or(GpxViewError::MissingAttribute {
        element: "trkpt",
        attribute: "lon",
    })?;

    Ok((lat, lon))
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(raw);
            }
            Ok(Event::CData(e)) => {
                let s = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(s);
            }
            Ok(Event::GeneralRef(e)) => {
                // Handle character references (&#60; &#x3C;) and predefined entities
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    let name = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                    match name {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {} // Unknown entity, skip
                    }
                }
            }
            Ok(Event::End(e)) if e.name().0 == end_name.as_slice() => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxViewError::XmlParse(e)),
            _ => {}
        }
    }

    Ok(text)
}

//! Parsers for the regional feed documents.
//!
//! The data document holds `;`-separated JSON fields; the object field
//! carries `speeds` (indexed by segment id, each `[speed, ...]` or `null`)
//! and `incidents` (`[segment, _, road, direction, detail, ...]`). The
//! metadata document is JavaScript made of `name=value;` assignments, one
//! of which ends in `SensorNames` and holds a JSON array indexed by segment
//! id.

use common::{Error, SegmentId, SegmentRecord, Snapshot};
use serde_json::Value;
use tracing::{debug, warn};

use crate::reader::Buffered;

const SPEEDS: &str = "speeds";
const INCIDENTS: &str = "incidents";
const SENSOR_NAMES: &str = "SensorNames";

/// Build a snapshot in configured segment order from the data document.
///
/// Segments absent from the feed keep speed 0.
pub fn parse_data(data: &Buffered, segments: &[SegmentId]) -> Result<Snapshot, Error> {
    let mut snapshot = Snapshot::with_capacity(segments.len());
    for &id in segments {
        snapshot.insert(id, SegmentRecord::default())?;
    }

    let mut saw_object = false;
    for line in data.lines() {
        for field in line.split(';') {
            let field = field.trim();
            if !field.starts_with('{') {
                continue;
            }
            let object: Value = serde_json::from_str(field)?;
            saw_object = true;

            if let Some(speeds) = object.get(SPEEDS).and_then(Value::as_array) {
                apply_speeds(&mut snapshot, segments, speeds);
            }
            if let Some(incidents) = object.get(INCIDENTS).and_then(Value::as_array) {
                apply_incidents(&mut snapshot, incidents);
            }
        }
    }

    if !saw_object {
        return Err(Error::Feed("data document contained no JSON object".into()));
    }
    Ok(snapshot)
}

fn apply_speeds(snapshot: &mut Snapshot, segments: &[SegmentId], speeds: &[Value]) {
    for &id in segments {
        let speed = speeds
            .get(id as usize)
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .and_then(Value::as_u64);
        let Some(speed) = speed else {
            debug!("no speed reported for segment {}", id);
            continue;
        };
        match (u32::try_from(speed), snapshot.get_mut(id)) {
            (Ok(speed), Some(record)) => record.speed = speed,
            (Err(_), _) => warn!("speed {} for segment {} out of range; skipped", speed, id),
            _ => {}
        }
    }
}

fn apply_incidents(snapshot: &mut Snapshot, incidents: &[Value]) {
    for incident in incidents {
        let Some(values) = incident.as_array() else {
            continue;
        };
        let Some(id) = values.first().and_then(Value::as_u64) else {
            continue;
        };
        let Some(record) = snapshot.get_mut(id as SegmentId) else {
            continue;
        };

        let parts: Vec<&str> = values
            .iter()
            .skip(2)
            .take(3)
            .filter_map(Value::as_str)
            .collect();
        if parts.len() == 3 {
            record.incident = Some(parts.join("-"));
        } else {
            warn!("malformed incident for segment {}: {}", id, incident);
        }
    }
}

/// Attach sensor names from the metadata document. Missing names are left
/// unset.
pub fn apply_sensor_names(
    metadata: &Buffered,
    snapshot: &mut Snapshot,
    segments: &[SegmentId],
) -> Result<(), Error> {
    for line in metadata.lines() {
        for assignment in line.split(';') {
            let Some((name, value)) = assignment.split_once('=') else {
                continue;
            };
            if !name.trim().ends_with(SENSOR_NAMES) {
                continue;
            }

            let names: Value = serde_json::from_str(value.trim())?;
            let Some(names) = names.as_array() else {
                return Err(Error::Feed(format!("{} is not an array", name.trim())));
            };
            for &id in segments {
                let label = match names.get(id as usize) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => continue,
                    Some(other) => other.to_string(),
                };
                if let Some(record) = snapshot.get_mut(id) {
                    record.location_name = Some(label);
                }
            }
        }
    }
    Ok(())
}

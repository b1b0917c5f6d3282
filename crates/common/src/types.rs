//! Domain types shared across the workspace.

use async_trait::async_trait;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::fmt;

use crate::{Error, Result};

/// Identifier of a monitored road segment in the upstream feed.
pub type SegmentId = u32;

// ── Segment records ───────────────────────────────────────────────────

/// Current conditions for one road segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentRecord {
    /// Average speed reported by the sensor (mph).
    pub speed: u32,
    /// Incident description, if one is reported on this segment.
    pub incident: Option<String>,
    /// Human-readable sensor location.
    pub location_name: Option<String>,
}

impl SegmentRecord {
    pub fn new(speed: u32) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }

    pub fn with_incident(mut self, incident: impl Into<String>) -> Self {
        self.incident = Some(incident.into());
        self
    }

    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = Some(name.into());
        self
    }

    /// Name shown to clients: the sensor location, or `Seg<id>` when the
    /// metadata did not provide one.
    pub fn display_name(&self, id: SegmentId) -> String {
        match &self.location_name {
            Some(name) => name.clone(),
            None => format!("Seg{}", id),
        }
    }
}

/// Renders as `speed` or `speed-incident`.
impl fmt::Display for SegmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.incident {
            Some(incident) => write!(f, "{}-{}", self.speed, incident),
            None => write!(f, "{}", self.speed),
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────

/// Ordered collection of segment records from one collection cycle.
///
/// Iteration order is insertion order, which collectors keep equal to the
/// configured segment order. The history logger relies on this to map the
/// Nth record to the Nth log file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    entries: Vec<(SegmentId, SegmentRecord)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append a record. Rejects an id that is already present.
    pub fn insert(&mut self, id: SegmentId, record: SegmentRecord) -> Result<()> {
        if self.get(id).is_some() {
            return Err(Error::DuplicateSegment(id));
        }
        self.entries.push((id, record));
        Ok(())
    }

    pub fn get(&self, id: SegmentId) -> Option<&SegmentRecord> {
        self.entries
            .iter()
            .find(|(seg, _)| *seg == id)
            .map(|(_, record)| record)
    }

    /// Mutable access used while a collector is still building the snapshot.
    pub fn get_mut(&mut self, id: SegmentId) -> Option<&mut SegmentRecord> {
        self.entries
            .iter_mut()
            .find(|(seg, _)| *seg == id)
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &SegmentRecord)> {
        self.entries.iter().map(|(id, record)| (*id, record))
    }

    pub fn ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }
}

/// Serializes as `[[name, value], ...]` in snapshot order.
impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            seq.serialize_element(&[record.display_name(*id), record.to_string()])?;
        }
        seq.end()
    }
}

// ── Collector boundary ────────────────────────────────────────────────

/// Produces a fresh snapshot from the upstream feed.
#[async_trait]
pub trait SnapshotCollector: Send + Sync {
    async fn collect(&self) -> Result<Snapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_display() {
        assert_eq!(SegmentRecord::new(42).to_string(), "42");
        assert_eq!(
            SegmentRecord::new(17).with_incident("X-Y-Z").to_string(),
            "17-X-Y-Z"
        );
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let named = SegmentRecord::new(5).with_location_name("Hillsdale");
        assert_eq!(named.display_name(2647), "Hillsdale");
        assert_eq!(SegmentRecord::new(5).display_name(2647), "Seg2647");
    }

    #[test]
    fn test_snapshot_serializes_pairs_in_order() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(101, SegmentRecord::new(42)).unwrap();
        snapshot
            .insert(102, SegmentRecord::new(17).with_incident("X-Y-Z"))
            .unwrap();

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"[["Seg101","42"],["Seg102","17-X-Y-Z"]]"#);
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(7, SegmentRecord::new(1)).unwrap();
        let err = snapshot.insert(7, SegmentRecord::new(2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateSegment(7)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(7).map(|r| r.speed), Some(1));
    }
}

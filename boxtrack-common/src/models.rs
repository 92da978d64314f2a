//! Domain models: scans, milestone records, shipments
//!
//! Wire names follow the JSON documents produced by the field capture app
//! (`finalDestination`, `markedAsReceived`, `statusChanges`, `schoolLatitude`,
//! epoch-millisecond timestamps) so datasets can be loaded as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A point on the globe, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Position reported by the capture device, with its accuracy radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
    /// Accuracy radius in metres; non-numeric values deserialize as `None`
    #[serde(
        default,
        alias = "accuracyMeters",
        deserialize_with = "lenient_accuracy",
        skip_serializing_if = "Option::is_none"
    )]
    pub accuracy: Option<f64>,
}

impl ScanPoint {
    pub fn new(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
        }
    }

    /// Accuracy radius in metres, 0 when unknown
    pub fn accuracy_m(&self) -> f64 {
        match self.accuracy {
            Some(value) if value.is_finite() => value,
            _ => 0.0,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

fn lenient_accuracy<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Number(value) if value.is_finite() => Some(value),
        _ => None,
    })
}

/// Scan location as captured by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLocation {
    pub coords: ScanPoint,
    /// Device fix time, when it differs from the scan time
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<ScanPoint> for ScanLocation {
    fn from(coords: ScanPoint) -> Self {
        Self {
            coords,
            timestamp: None,
        }
    }
}

/// A single field scan of a shipment
///
/// Immutable once captured, except for `at_destination` which is recomputed
/// when the shipment's destination coordinates are corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: String,
    pub box_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    #[serde(rename = "finalDestination", alias = "atDestination", default)]
    pub at_destination: bool,
    #[serde(rename = "markedAsReceived", alias = "markedReceived", default)]
    pub marked_received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub location: ScanLocation,
}

impl Scan {
    /// Time the position was fixed, falling back to the scan time
    pub fn located_at(&self) -> DateTime<Utc> {
        self.location.timestamp.unwrap_or(self.time)
    }
}

/// The scan that set a milestone, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub scan: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
}

impl Milestone {
    pub fn from_scan(scan: &Scan) -> Self {
        Self {
            scan: scan.id.clone(),
            time: scan.time,
        }
    }
}

/// Milestone slots, in classification rank order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MilestoneKind {
    InProgress,
    Received,
    ReachedGps,
    ReachedAndReceived,
    Validated,
}

impl MilestoneKind {
    /// Fixed rank order used by the progress classifier
    pub const ORDERED: [MilestoneKind; 5] = [
        MilestoneKind::InProgress,
        MilestoneKind::Received,
        MilestoneKind::ReachedGps,
        MilestoneKind::ReachedAndReceived,
        MilestoneKind::Validated,
    ];
}

/// First qualifying scan for each milestone kind
///
/// Each slot is written at most once per derivation and never cleared;
/// a changed scan set is handled by deriving a fresh record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRecord {
    pub in_progress: Option<Milestone>,
    pub received: Option<Milestone>,
    pub reached_gps: Option<Milestone>,
    pub reached_and_received: Option<Milestone>,
    pub validated: Option<Milestone>,
}

impl MilestoneRecord {
    pub fn get(&self, kind: MilestoneKind) -> Option<&Milestone> {
        match kind {
            MilestoneKind::InProgress => self.in_progress.as_ref(),
            MilestoneKind::Received => self.received.as_ref(),
            MilestoneKind::ReachedGps => self.reached_gps.as_ref(),
            MilestoneKind::ReachedAndReceived => self.reached_and_received.as_ref(),
            MilestoneKind::Validated => self.validated.as_ref(),
        }
    }

    pub fn is_set(&self, kind: MilestoneKind) -> bool {
        self.get(kind).is_some()
    }

    /// True when no slot has been set
    pub fn is_empty(&self) -> bool {
        MilestoneKind::ORDERED.iter().all(|kind| !self.is_set(*kind))
    }

    /// Set a slot unless it is already set. Returns whether it was written.
    pub fn set_once(&mut self, kind: MilestoneKind, milestone: Milestone) -> bool {
        let slot = match kind {
            MilestoneKind::InProgress => &mut self.in_progress,
            MilestoneKind::Received => &mut self.received,
            MilestoneKind::ReachedGps => &mut self.reached_gps,
            MilestoneKind::ReachedAndReceived => &mut self.reached_and_received,
            MilestoneKind::Validated => &mut self.validated,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(milestone);
        true
    }

    /// Timestamps of every set slot, in rank order
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        MilestoneKind::ORDERED
            .iter()
            .filter_map(move |kind| self.get(*kind).map(|m| m.time))
    }
}

/// Current checkpoint summarizing a shipment's delivery state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressLabel {
    #[default]
    NoScans,
    InProgress,
    Received,
    ReachedGps,
    ReachedAndReceived,
    Validated,
}

impl ProgressLabel {
    pub const ALL: [ProgressLabel; 6] = [
        ProgressLabel::NoScans,
        ProgressLabel::InProgress,
        ProgressLabel::Received,
        ProgressLabel::ReachedGps,
        ProgressLabel::ReachedAndReceived,
        ProgressLabel::Validated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressLabel::NoScans => "noScans",
            ProgressLabel::InProgress => "inProgress",
            ProgressLabel::Received => "received",
            ProgressLabel::ReachedGps => "reachedGps",
            ProgressLabel::ReachedAndReceived => "reachedAndReceived",
            ProgressLabel::Validated => "validated",
        }
    }
}

impl From<MilestoneKind> for ProgressLabel {
    fn from(kind: MilestoneKind) -> Self {
        match kind {
            MilestoneKind::InProgress => ProgressLabel::InProgress,
            MilestoneKind::Received => ProgressLabel::Received,
            MilestoneKind::ReachedGps => ProgressLabel::ReachedGps,
            MilestoneKind::ReachedAndReceived => ProgressLabel::ReachedAndReceived,
            MilestoneKind::Validated => ProgressLabel::Validated,
        }
    }
}

impl fmt::Display for ProgressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProgressLabel::ALL
            .iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("Unknown progress label: {}", s)))
    }
}

/// Shipment ("box") projection consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub project: String,
    #[serde(rename = "schoolLatitude")]
    pub destination_latitude: f64,
    #[serde(rename = "schoolLongitude")]
    pub destination_longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    /// Destination code used to match coordinate corrections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_code: Option<String>,
    #[serde(default)]
    pub content: Option<BTreeMap<String, u64>>,
    #[serde(rename = "statusChanges", default)]
    pub milestones: Option<MilestoneRecord>,
    /// Cached `classify(milestones, now)`
    #[serde(default)]
    pub progress: ProgressLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<Milestone>,
}

impl Shipment {
    /// New shipment with no scans yet
    pub fn new(id: impl Into<String>, project: impl Into<String>, destination: Coordinates) -> Self {
        Self {
            id: id.into(),
            project: project.into(),
            destination_latitude: destination.latitude,
            destination_longitude: destination.longitude,
            district: None,
            school: None,
            school_code: None,
            content: None,
            milestones: None,
            progress: ProgressLabel::NoScans,
            last_scan: None,
        }
    }

    pub fn destination(&self) -> Coordinates {
        Coordinates::new(self.destination_latitude, self.destination_longitude)
    }

    pub fn set_destination(&mut self, destination: Coordinates) {
        self.destination_latitude = destination.latitude;
        self.destination_longitude = destination.longitude;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scan_deserializes_field_app_names() {
        let json = r#"{
            "id": "s1",
            "boxId": "b1",
            "time": 1700000000000,
            "finalDestination": true,
            "markedAsReceived": false,
            "location": { "coords": { "latitude": 1.5, "longitude": 2.5, "accuracy": 12 } }
        }"#;
        let scan: Scan = serde_json::from_str(json).unwrap();
        assert_eq!(scan.box_id, "b1");
        assert!(scan.at_destination);
        assert!(!scan.marked_received);
        assert_eq!(scan.time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(scan.location.coords.accuracy_m(), 12.0);
        assert_eq!(scan.located_at(), scan.time);
    }

    #[test]
    fn test_scan_accepts_short_aliases() {
        let json = r#"{
            "id": "s1", "boxId": "b1", "time": 0,
            "atDestination": true, "markedReceived": true,
            "location": { "coords": { "lat": 1.0, "lon": 2.0, "accuracyMeters": 30 } }
        }"#;
        let scan: Scan = serde_json::from_str(json).unwrap();
        assert!(scan.at_destination && scan.marked_received);
        assert_eq!(scan.location.coords.accuracy, Some(30.0));
    }

    #[test]
    fn test_non_numeric_accuracy_becomes_none() {
        for raw in [r#""high""#, "null", "{}", "[1]"] {
            let json = format!(r#"{{ "latitude": 0, "longitude": 0, "accuracy": {} }}"#, raw);
            let point: ScanPoint = serde_json::from_str(&json).unwrap();
            assert_eq!(point.accuracy, None, "accuracy {}", raw);
            assert_eq!(point.accuracy_m(), 0.0);
        }
    }

    #[test]
    fn test_set_once_never_overwrites() {
        let t = Utc.timestamp_millis_opt(100).unwrap();
        let mut record = MilestoneRecord::default();
        assert!(record.is_empty());
        assert!(record.set_once(MilestoneKind::Received, Milestone { scan: "a".into(), time: t }));
        assert!(!record.set_once(MilestoneKind::Received, Milestone { scan: "b".into(), time: t }));
        assert_eq!(record.received.as_ref().unwrap().scan, "a");
        assert!(!record.is_empty());
    }

    #[test]
    fn test_record_wire_format() {
        let t = Utc.timestamp_millis_opt(500).unwrap();
        let mut record = MilestoneRecord::default();
        record.set_once(MilestoneKind::ReachedAndReceived, Milestone { scan: "x".into(), time: t });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["reachedAndReceived"]["scan"], "x");
        assert_eq!(value["reachedAndReceived"]["time"], 500);
        assert!(value["inProgress"].is_null());
    }

    #[test]
    fn test_progress_label_parse_and_display() {
        for label in ProgressLabel::ALL {
            assert_eq!(label.as_str().parse::<ProgressLabel>().unwrap(), label);
            assert_eq!(label.to_string(), label.as_str());
        }
        assert_eq!("VALIDATED".parse::<ProgressLabel>().unwrap(), ProgressLabel::Validated);
        assert!("shipped".parse::<ProgressLabel>().is_err());
    }

    #[test]
    fn test_shipment_defaults() {
        let json = r#"{ "id": "b1", "project": "P", "schoolLatitude": 1.0, "schoolLongitude": 2.0 }"#;
        let shipment: Shipment = serde_json::from_str(json).unwrap();
        assert_eq!(shipment.progress, ProgressLabel::NoScans);
        assert!(shipment.milestones.is_none());
        assert!(shipment.content.is_none());
        assert_eq!(shipment.destination(), Coordinates::new(1.0, 2.0));
    }
}

//! Milestone indexing
//!
//! Derives a shipment's milestone record from its full scan set in a single
//! chronological pass. The derivation always starts from an empty record, so
//! the same scan set (in the same ingestion order) always yields the same
//! record and re-running it is harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Milestone, MilestoneKind, MilestoneRecord, ProgressLabel, Scan, Shipment};
use crate::progress::classify;

/// Derive the milestone record for one shipment's scans
///
/// Scans are visited in ascending time order; equal times keep their
/// ingestion order. For each scan the first matching rule applies:
///
/// 1. at destination and marked received, `validated` unset: `validated`
/// 2. at destination: `reachedAndReceived` when `received` is set and it is
///    unset, otherwise `reachedGps` when unset
/// 3. marked received: `reachedAndReceived` when `reachedGps` is set and it
///    is unset, otherwise `received` when unset
/// 4. neither flag, and nothing set yet: `inProgress`
pub fn derive_milestones(scans: &[Scan]) -> MilestoneRecord {
    let mut ordered: Vec<&Scan> = scans.iter().collect();
    // slice::sort_by_key is stable: ties stay in ingestion order
    ordered.sort_by_key(|scan| scan.time);

    let mut record = MilestoneRecord::default();
    for scan in ordered {
        apply_scan(&mut record, scan);
    }
    record
}

fn apply_scan(record: &mut MilestoneRecord, scan: &Scan) {
    let milestone = Milestone::from_scan(scan);

    if scan.at_destination && scan.marked_received && !record.is_set(MilestoneKind::Validated) {
        record.set_once(MilestoneKind::Validated, milestone);
    } else if scan.at_destination {
        if record.is_set(MilestoneKind::Received) && !record.is_set(MilestoneKind::ReachedAndReceived) {
            record.set_once(MilestoneKind::ReachedAndReceived, milestone);
        } else {
            record.set_once(MilestoneKind::ReachedGps, milestone);
        }
    } else if scan.marked_received {
        if record.is_set(MilestoneKind::ReachedGps) && !record.is_set(MilestoneKind::ReachedAndReceived) {
            record.set_once(MilestoneKind::ReachedAndReceived, milestone);
        } else {
            record.set_once(MilestoneKind::Received, milestone);
        }
    } else if record.is_empty() {
        record.set_once(MilestoneKind::InProgress, milestone);
    }
}

/// Most recent scan, earliest ingestion winning on equal times
pub fn latest_scan(scans: &[Scan]) -> Option<Milestone> {
    scans
        .iter()
        .fold(None::<&Scan>, |latest, scan| match latest {
            Some(current) if scan.time <= current.time => Some(current),
            _ => Some(scan),
        })
        .map(Milestone::from_scan)
}

/// Persistence instruction produced by indexing one shipment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneUpdate {
    pub shipment_id: String,
    #[serde(rename = "statusChanges")]
    pub milestones: MilestoneRecord,
    pub progress: ProgressLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<Milestone>,
}

impl MilestoneUpdate {
    /// Whether applying this update would modify the stored projection
    pub fn changes(&self, shipment: &Shipment) -> bool {
        shipment.milestones.as_ref() != Some(&self.milestones)
            || shipment.progress != self.progress
            || shipment.last_scan != self.last_scan
    }

    pub fn apply_to(&self, shipment: &mut Shipment) {
        shipment.milestones = Some(self.milestones.clone());
        shipment.progress = self.progress;
        shipment.last_scan = self.last_scan.clone();
    }
}

/// Index one shipment: milestone record, cached progress and last scan
pub fn index_shipment(shipment_id: &str, scans: &[Scan], now: DateTime<Utc>) -> MilestoneUpdate {
    let milestones = derive_milestones(scans);
    let progress = classify(Some(&milestones), now);

    MilestoneUpdate {
        shipment_id: shipment_id.to_string(),
        milestones,
        progress,
        last_scan: latest_scan(scans),
    }
}

//! Batch recompute jobs over many shipments
//!
//! Each job fans out one independent task per shipment on the rayon pool and
//! collects persistence instructions (scan flag updates, milestone updates)
//! for the caller to apply. Jobs hold no state between runs: re-running one
//! after a partial failure produces the same instructions.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::geo::{reclassify_scans, ScanFlagUpdate};
use crate::milestones::{index_shipment, MilestoneUpdate};
use crate::models::{Coordinates, Scan, Shipment};

/// Group scans by shipment id, keeping ingestion order within each group
pub fn group_scans(scans: &[Scan]) -> HashMap<String, Vec<Scan>> {
    let mut groups: HashMap<String, Vec<Scan>> = HashMap::new();
    for scan in scans {
        groups.entry(scan.box_id.clone()).or_default().push(scan.clone());
    }
    groups
}

fn warn_orphan_scans(shipments: &[Shipment], groups: &HashMap<String, Vec<Scan>>) {
    let known: HashSet<&str> = shipments.iter().map(|shipment| shipment.id.as_str()).collect();
    for (box_id, scans) in groups {
        if !known.contains(box_id.as_str()) {
            warn!(box_id = %box_id, scans = scans.len(), "Ignoring scans for unknown shipment");
        }
    }
}

fn count_modified(shipments: &[Shipment], updates: &[MilestoneUpdate]) -> usize {
    shipments
        .iter()
        .zip(updates)
        .filter(|(shipment, update)| update.changes(shipment))
        .count()
}

/// Result of [`reindex_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexOutcome {
    pub updates: Vec<MilestoneUpdate>,
    /// Updates that differ from the stored projection
    pub modified: usize,
}

/// Re-derive every shipment's milestone record from its scans
pub fn reindex_all(shipments: &[Shipment], scans: &[Scan], now: DateTime<Utc>) -> ReindexOutcome {
    debug!(shipments = shipments.len(), scans = scans.len(), "Reindex starting");

    let groups = group_scans(scans);
    warn_orphan_scans(shipments, &groups);

    let updates: Vec<MilestoneUpdate> = shipments
        .par_iter()
        .map(|shipment| {
            let scans = groups.get(&shipment.id).map(Vec::as_slice).unwrap_or_default();
            index_shipment(&shipment.id, scans, now)
        })
        .collect();

    let modified = count_modified(shipments, &updates);
    info!(shipments = shipments.len(), modified, "Reindex complete");

    ReindexOutcome { updates, modified }
}

/// Result of [`recalculate_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateOutcome {
    pub scan_updates: Vec<ScanFlagUpdate>,
    pub updates: Vec<MilestoneUpdate>,
    /// Scans whose destination flag flipped
    pub recalculated: usize,
    /// Milestone updates that differ from the stored projection
    pub modified: usize,
}

/// Reclassify every scan against its shipment's destination, then reindex
pub fn recalculate_all(
    shipments: &[Shipment],
    scans: &[Scan],
    tolerance_m: f64,
    now: DateTime<Utc>,
) -> RecalculateOutcome {
    debug!(
        shipments = shipments.len(),
        scans = scans.len(),
        tolerance_m,
        "Recalculation starting"
    );

    let groups = group_scans(scans);
    warn_orphan_scans(shipments, &groups);

    let per_shipment: Vec<(Vec<ScanFlagUpdate>, MilestoneUpdate)> = shipments
        .par_iter()
        .map(|shipment| {
            let mut own_scans = groups.get(&shipment.id).cloned().unwrap_or_default();
            let flips = reclassify_scans(&shipment.destination(), &mut own_scans, tolerance_m);
            (flips, index_shipment(&shipment.id, &own_scans, now))
        })
        .collect();

    let (flips, updates): (Vec<Vec<ScanFlagUpdate>>, Vec<MilestoneUpdate>) = per_shipment.into_iter().unzip();
    let scan_updates: Vec<ScanFlagUpdate> = flips.into_iter().flatten().collect();
    let modified = count_modified(shipments, &updates);

    info!(
        shipments = shipments.len(),
        recalculated = scan_updates.len(),
        modified,
        "Recalculation complete"
    );

    RecalculateOutcome {
        recalculated: scan_updates.len(),
        scan_updates,
        updates,
        modified,
    }
}

/// Corrected destination coordinates for every shipment with a given code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateCorrection {
    pub school_code: String,
    #[serde(rename = "schoolLatitude")]
    pub latitude: f64,
    #[serde(rename = "schoolLongitude")]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSummary {
    /// Shipments whose code matched a correction
    pub matched: usize,
    /// Matched shipments whose destination actually moved
    pub updated: usize,
    /// Ids of matched shipments, in input order
    pub affected: Vec<String>,
}

/// Move every shipment matching a correction's code to the new destination
pub fn apply_coordinate_corrections(
    shipments: &mut [Shipment],
    corrections: &[CoordinateCorrection],
) -> CorrectionSummary {
    let by_code: HashMap<&str, Coordinates> = corrections
        .iter()
        .map(|correction| {
            (
                correction.school_code.as_str(),
                Coordinates::new(correction.latitude, correction.longitude),
            )
        })
        .collect();

    let mut summary = CorrectionSummary::default();
    for shipment in shipments.iter_mut() {
        let Some(destination) = shipment
            .school_code
            .as_deref()
            .and_then(|code| by_code.get(code))
        else {
            continue;
        };
        summary.matched += 1;
        summary.affected.push(shipment.id.clone());
        if shipment.destination() != *destination {
            shipment.set_destination(*destination);
            summary.updated += 1;
        }
    }

    info!(
        corrections = corrections.len(),
        matched = summary.matched,
        updated = summary.updated,
        "Applied coordinate corrections"
    );
    summary
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOutcome {
    pub summary: CorrectionSummary,
    /// `None` when no destination moved
    pub recalculation: Option<RecalculateOutcome>,
}

/// Apply coordinate corrections, then recalculate the shipments they touched
pub fn correct_and_recalculate(
    shipments: &mut [Shipment],
    scans: &[Scan],
    corrections: &[CoordinateCorrection],
    tolerance_m: f64,
    now: DateTime<Utc>,
) -> CorrectionOutcome {
    let summary = apply_coordinate_corrections(shipments, corrections);
    if summary.updated == 0 {
        return CorrectionOutcome {
            summary,
            recalculation: None,
        };
    }

    let affected: HashSet<&str> = summary.affected.iter().map(String::as_str).collect();
    let subset: Vec<Shipment> = shipments
        .iter()
        .filter(|shipment| affected.contains(shipment.id.as_str()))
        .cloned()
        .collect();
    let affected_scans: Vec<Scan> = scans
        .iter()
        .filter(|scan| affected.contains(scan.box_id.as_str()))
        .cloned()
        .collect();

    let recalculation = recalculate_all(&subset, &affected_scans, tolerance_m, now);
    CorrectionOutcome {
        summary,
        recalculation: Some(recalculation),
    }
}

/// Apply scan flag updates in place; returns how many scans changed
pub fn apply_scan_updates(scans: &mut [Scan], updates: &[ScanFlagUpdate]) -> usize {
    let by_id: HashMap<&str, bool> = updates
        .iter()
        .map(|update| (update.scan_id.as_str(), update.at_destination))
        .collect();

    let mut changed = 0;
    for scan in scans.iter_mut() {
        if let Some(&at_destination) = by_id.get(scan.id.as_str()) {
            if scan.at_destination != at_destination {
                scan.at_destination = at_destination;
                changed += 1;
            }
        }
    }
    changed
}

/// Apply milestone updates in place; returns how many shipments changed
pub fn apply_milestone_updates(shipments: &mut [Shipment], updates: &[MilestoneUpdate]) -> usize {
    let by_id: HashMap<&str, &MilestoneUpdate> = updates
        .iter()
        .map(|update| (update.shipment_id.as_str(), update))
        .collect();

    let mut changed = 0;
    for shipment in shipments.iter_mut() {
        if let Some(update) = by_id.get(shipment.id.as_str()) {
            if update.changes(shipment) {
                update.apply_to(shipment);
                changed += 1;
            }
        }
    }
    changed
}

//! Per-shipment delivery report
//!
//! One flat row per shipment summarizing where it was last seen and when it
//! reached, was received at, and was validated at its destination. Rows are
//! meant for spreadsheet export, so the content map is flattened into the
//! row's columns. A content item named like a fixed column is emitted as
//! `content.<item>` instead.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::batch::group_scans;
use crate::geo::distance;
use crate::models::{Scan, Shipment};

/// Scan flags a report column is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCondition {
    Any,
    AtDestination,
    MarkedReceived,
    /// Both at destination and marked received
    Validated,
}

impl ScanCondition {
    pub fn matches(&self, scan: &Scan) -> bool {
        match self {
            ScanCondition::Any => true,
            ScanCondition::AtDestination => scan.at_destination,
            ScanCondition::MarkedReceived => scan.marked_received,
            ScanCondition::Validated => scan.at_destination && scan.marked_received,
        }
    }
}

/// Most recent scan matching `condition`; on equal times the first one seen wins
pub fn latest_scan_where(scans: &[Scan], condition: ScanCondition) -> Option<&Scan> {
    scans
        .iter()
        .filter(|scan| condition.matches(scan))
        .fold(None, |latest: Option<&Scan>, scan| match latest {
            Some(current) if scan.time <= current.time => Some(current),
            _ => Some(scan),
        })
}

/// Serialized names of the fixed [`ReportRow`] columns
const REPORT_COLUMNS: [&str; 19] = [
    "id",
    "project",
    "district",
    "school",
    "schoolLatitude",
    "schoolLongitude",
    "lastScanLatitude",
    "lastScanLongitude",
    "lastScanDistanceInMeters",
    "lastScanDate",
    "reachedGps",
    "reachedDate",
    "received",
    "receivedDistanceInMeters",
    "receivedDate",
    "receivedComment",
    "validated",
    "validatedDate",
    "validatedComment",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub id: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    pub school_latitude: f64,
    pub school_longitude: f64,
    pub last_scan_latitude: Option<f64>,
    pub last_scan_longitude: Option<f64>,
    pub last_scan_distance_in_meters: Option<u64>,
    pub last_scan_date: Option<NaiveDate>,
    pub reached_gps: bool,
    pub reached_date: Option<NaiveDate>,
    pub received: bool,
    pub received_distance_in_meters: Option<u64>,
    pub received_date: Option<NaiveDate>,
    pub received_comment: Option<String>,
    pub validated: bool,
    pub validated_date: Option<NaiveDate>,
    pub validated_comment: Option<String>,
    #[serde(flatten)]
    pub content: BTreeMap<String, u64>,
}

fn distance_from_destination(shipment: &Shipment, scan: &Scan) -> u64 {
    distance(&shipment.destination(), &scan.location.coords.coordinates()).round() as u64
}

fn content_columns(shipment: &Shipment) -> BTreeMap<String, u64> {
    shipment
        .content
        .iter()
        .flatten()
        .map(|(item, count)| {
            let column = if REPORT_COLUMNS.contains(&item.as_str()) {
                format!("content.{}", item)
            } else {
                item.clone()
            };
            (column, *count)
        })
        .collect()
}

fn fix_date(scan: &Scan) -> NaiveDate {
    scan.located_at().date_naive()
}

/// Build the report row of one shipment from its scans
pub fn report_row(shipment: &Shipment, scans: &[Scan]) -> ReportRow {
    let last = latest_scan_where(scans, ScanCondition::Any);
    let reached = latest_scan_where(scans, ScanCondition::AtDestination);
    let received = latest_scan_where(scans, ScanCondition::MarkedReceived);
    let validated = latest_scan_where(scans, ScanCondition::Validated);

    ReportRow {
        id: shipment.id.clone(),
        project: shipment.project.clone(),
        district: shipment.district.clone(),
        school: shipment.school.clone(),
        school_latitude: shipment.destination_latitude,
        school_longitude: shipment.destination_longitude,
        last_scan_latitude: last.map(|scan| scan.location.coords.latitude),
        last_scan_longitude: last.map(|scan| scan.location.coords.longitude),
        last_scan_distance_in_meters: last.map(|scan| distance_from_destination(shipment, scan)),
        last_scan_date: last.map(fix_date),
        reached_gps: reached.is_some(),
        reached_date: reached.map(fix_date),
        received: received.is_some(),
        received_distance_in_meters: received.map(|scan| distance_from_destination(shipment, scan)),
        received_date: received.map(fix_date),
        received_comment: received.and_then(|scan| scan.comment.clone()),
        validated: validated.is_some(),
        validated_date: validated.map(fix_date),
        validated_comment: validated.and_then(|scan| scan.comment.clone()),
        content: content_columns(shipment),
    }
}

/// Report rows for every shipment, in input order
pub fn report_rows(shipments: &[Shipment], scans: &[Scan]) -> Vec<ReportRow> {
    let by_shipment = group_scans(scans);
    shipments
        .iter()
        .map(|shipment| {
            let scans = by_shipment
                .get(shipment.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            report_row(shipment, scans)
        })
        .collect()
}

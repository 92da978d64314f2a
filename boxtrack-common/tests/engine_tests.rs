//! End-to-end tests: raw scans → destination flags → milestones → insights
//!
//! Covers the delivery funnel scenarios plus a small dataset in
//! the JSON shape exported by the field app.

use boxtrack_common::batch::{apply_milestone_updates, reindex_all};
use boxtrack_common::geo::is_at_destination;
use boxtrack_common::insights::{compute_insights, InsightsOptions, InsightsResult};
use boxtrack_common::{
    classify, derive_milestones, Coordinates, Milestone, MilestoneRecord, ProgressLabel, Scan, ScanPoint,
    Shipment,
};
use chrono::{DateTime, TimeZone, Utc};

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn scan(id: &str, ms: i64, at_destination: bool, marked_received: bool) -> Scan {
    Scan {
        id: id.to_string(),
        box_id: "b1".to_string(),
        time: at(ms),
        at_destination,
        marked_received,
        comment: None,
        location: ScanPoint::new(0.0, 0.0, None).into(),
    }
}

#[test]
fn test_received_then_reached() {
    let scans = vec![scan("s1", 100, false, false), scan("s2", 200, false, true), scan("s3", 300, true, false)];
    let record = derive_milestones(&scans);

    assert_eq!(record.in_progress, Some(Milestone { scan: "s1".into(), time: at(100) }));
    assert_eq!(record.received, Some(Milestone { scan: "s2".into(), time: at(200) }));
    assert_eq!(record.reached_and_received, Some(Milestone { scan: "s3".into(), time: at(300) }));
    assert_eq!(record.reached_gps, None);
    assert_eq!(record.validated, None);
    assert_eq!(classify(Some(&record), at(1_000)), ProgressLabel::ReachedAndReceived);
}

#[test]
fn test_single_validating_scan() {
    let record = derive_milestones(&[scan("s1", 500, true, true)]);
    assert_eq!(
        record,
        MilestoneRecord {
            validated: Some(Milestone { scan: "s1".into(), time: at(500) }),
            ..Default::default()
        }
    );
    assert_eq!(classify(Some(&record), at(1_000)), ProgressLabel::Validated);
}

#[test]
fn test_paris_proximity() {
    let destination = Coordinates::new(48.8566, 2.3522);
    let point = ScanPoint::new(48.9066, 2.3522, Some(1000.0));
    assert!(is_at_destination(&destination, &point));
}

#[test]
fn test_repartition_counts() {
    let mut shipments = Vec::new();
    for (id, record) in [
        ("a", Some(validated())),
        ("b", Some(validated())),
        ("c", None),
        ("d", Some(in_progress())),
    ] {
        let mut shipment = Shipment::new(id, "P", Coordinates::new(0.0, 0.0));
        shipment.milestones = record;
        shipments.push(shipment);
    }

    let options = InsightsOptions {
        grouped: false,
        ..Default::default()
    };
    let InsightsResult::Single(insights) = compute_insights(Some(shipments.as_slice()), &options, at(10_000)) else {
        panic!("expected ungrouped insights");
    };
    assert_eq!(insights.repartition.validated, 2);
    assert_eq!(insights.repartition.no_scans, 1);
    assert_eq!(insights.repartition.in_progress, 1);
    assert_eq!(insights.repartition.total, 4);
}

fn validated() -> MilestoneRecord {
    MilestoneRecord {
        validated: Some(Milestone { scan: "v".into(), time: at(1_000) }),
        ..Default::default()
    }
}

fn in_progress() -> MilestoneRecord {
    MilestoneRecord {
        in_progress: Some(Milestone { scan: "p".into(), time: at(1_000) }),
        ..Default::default()
    }
}

const DATASET: &str = r#"{
    "boxes": [
        { "id": "b1", "project": "Literacy", "schoolLatitude": 48.8566, "schoolLongitude": 2.3522,
          "content": { "books": 20, "tablets": 2 } },
        { "id": "b2", "project": "Literacy", "schoolLatitude": 45.7640, "schoolLongitude": 4.8357,
          "content": { "books": 10 } },
        { "id": "b3", "project": "Health", "schoolLatitude": 43.2965, "schoolLongitude": 5.3698 }
    ],
    "scans": [
        { "id": "s1", "boxId": "b1", "time": 1704067200000, "finalDestination": false, "markedAsReceived": false,
          "location": { "coords": { "latitude": 47.0, "longitude": 2.0, "accuracy": 20 } } },
        { "id": "s2", "boxId": "b1", "time": 1704240000000, "finalDestination": true, "markedAsReceived": true,
          "comment": "All good", "location": { "coords": { "latitude": 48.857, "longitude": 2.352, "accuracy": 8 } } },
        { "id": "s3", "boxId": "b2", "time": 1704153600000, "finalDestination": false, "markedAsReceived": true,
          "location": { "coords": { "latitude": 45.0, "longitude": 4.0, "accuracy": "unknown" } } }
    ]
}"#;

#[derive(serde::Deserialize)]
struct Dataset {
    boxes: Vec<Shipment>,
    scans: Vec<Scan>,
}

#[test]
fn test_dataset_pipeline() {
    let Dataset { mut boxes, scans } = serde_json::from_str(DATASET).unwrap();
    let now = at(1_710_000_000_000);

    let outcome = reindex_all(&boxes, &scans, now);
    assert_eq!(outcome.modified, 3);
    apply_milestone_updates(&mut boxes, &outcome.updates);

    assert_eq!(boxes[0].progress, ProgressLabel::Validated);
    assert_eq!(boxes[1].progress, ProgressLabel::Received);
    assert_eq!(boxes[2].progress, ProgressLabel::NoScans);
    assert_eq!(boxes[0].last_scan.as_ref().map(|m| m.scan.as_str()), Some("s2"));

    let result = compute_insights(Some(boxes.as_slice()), &InsightsOptions::default(), now);
    let InsightsResult::Grouped(projects) = &result else {
        panic!("expected grouped insights");
    };
    let literacy = &projects["Literacy"];
    assert_eq!(literacy.repartition.total, 2);
    assert_eq!(literacy.content["books"].total, 30);
    assert_eq!(literacy.content["books"].validated_total, 20);
    assert_eq!(literacy.content["tablets"].validated_total, 2);
    // 2024-01-01 minus a padding day through 2024-01-03 plus one
    assert_eq!(literacy.timeline.first().unwrap().day.to_string(), "2023-12-31");
    assert_eq!(literacy.timeline.last().unwrap().day.to_string(), "2024-01-04");
    assert!(projects["Health"].timeline.is_empty());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["Literacy"]["repartition"]["validated"], 1);
    assert_eq!(json["Health"]["repartition"]["noScans"], 1);
}

//! # BoxTrack Common Library
//!
//! Delivery-progress inference shared by all BoxTrack tools:
//! - Domain models (scans, milestone records, shipments)
//! - Destination proximity checks and map helpers
//! - Milestone indexing and progress classification
//! - Dashboard insights (repartition, timeline, content)
//! - Batch recompute jobs and delivery reports
//! - Configuration loading

pub mod batch;
pub mod config;
pub mod error;
pub mod geo;
pub mod insights;
pub mod milestones;
pub mod models;
pub mod progress;
pub mod report;
pub mod time;

pub use error::{Error, Result};
pub use geo::is_at_destination;
pub use insights::{compute_insights, Insights, InsightsOptions, InsightsResult};
pub use milestones::{derive_milestones, index_shipment, MilestoneUpdate};
pub use models::{
    Coordinates, Milestone, MilestoneKind, MilestoneRecord, ProgressLabel, Scan, ScanPoint, Shipment,
};
pub use progress::classify;

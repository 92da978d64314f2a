//! Progress classification
//!
//! Reduces a milestone record to a single label by walking the fixed rank
//! order and keeping the last milestone reached at or before the cutoff.
//! Rank is not inferred from timestamps: the indexer only sets a higher-rank
//! slot once its prerequisites hold, and the classifier relies on that.

use chrono::{DateTime, Utc};

use crate::models::{MilestoneKind, MilestoneRecord, ProgressLabel, Shipment};

/// Label of a milestone record as observed at `cutoff`
///
/// Passing a past cutoff reconstructs what the label would have been then.
pub fn classify(record: Option<&MilestoneRecord>, cutoff: DateTime<Utc>) -> ProgressLabel {
    let Some(record) = record else {
        return ProgressLabel::NoScans;
    };

    MilestoneKind::ORDERED
        .iter()
        .fold(ProgressLabel::NoScans, |label, kind| match record.get(*kind) {
            Some(milestone) if milestone.time <= cutoff => ProgressLabel::from(*kind),
            _ => label,
        })
}

impl Shipment {
    /// Progress derived from the shipment's milestone record
    pub fn current_progress(&self, now: DateTime<Utc>) -> ProgressLabel {
        classify(self.milestones.as_ref(), now)
    }
}

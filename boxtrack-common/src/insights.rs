//! Dashboard insights over shipment populations
//!
//! Everything here is recomputed from the shipments handed in: label
//! repartitions at a cutoff, a day-by-day timeline of past repartitions,
//! and content tallies split by validation. Identical input always gives
//! identical output.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::models::{ProgressLabel, Shipment};
use crate::progress::classify;
use crate::time::{one_day, utc_day};

/// Default timeline history (about six months)
pub const DEFAULT_TIMELINE_WINDOW_DAYS: i64 = 182;

/// Longest accepted timeline window (about 100 years)
pub const MAX_TIMELINE_WINDOW_DAYS: i64 = 36_500;

/// Shipment count per progress label at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repartition {
    pub no_scans: u64,
    pub in_progress: u64,
    pub received: u64,
    pub reached_gps: u64,
    pub reached_and_received: u64,
    pub validated: u64,
    pub total: u64,
}

impl Repartition {
    pub fn count(&self, label: ProgressLabel) -> u64 {
        match label {
            ProgressLabel::NoScans => self.no_scans,
            ProgressLabel::InProgress => self.in_progress,
            ProgressLabel::Received => self.received,
            ProgressLabel::ReachedGps => self.reached_gps,
            ProgressLabel::ReachedAndReceived => self.reached_and_received,
            ProgressLabel::Validated => self.validated,
        }
    }

    fn counter(&mut self, label: ProgressLabel) -> &mut u64 {
        match label {
            ProgressLabel::NoScans => &mut self.no_scans,
            ProgressLabel::InProgress => &mut self.in_progress,
            ProgressLabel::Received => &mut self.received,
            ProgressLabel::ReachedGps => &mut self.reached_gps,
            ProgressLabel::ReachedAndReceived => &mut self.reached_and_received,
            ProgressLabel::Validated => &mut self.validated,
        }
    }

    /// Count one shipment under `label`
    pub fn record(&mut self, label: ProgressLabel) {
        *self.counter(label) += 1;
        self.total += 1;
    }
}

/// Repartition snapshot for one day of the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub day: NaiveDate,
    #[serde(flatten)]
    pub repartition: Repartition,
}

/// Quantities of one content item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTally {
    pub total: u64,
    pub validated_total: u64,
}

/// Dashboard payload for one shipment population
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub repartition: Repartition,
    pub timeline: Vec<TimelineEntry>,
    pub content: BTreeMap<String, ContentTally>,
}

/// How [`compute_insights`] partitions and filters shipments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightsOptions {
    /// One payload per project instead of a single global one
    pub grouped: bool,
    /// Keep only these projects
    pub project_filter: Option<BTreeSet<String>>,
    pub timeline_window_days: i64,
}

impl Default for InsightsOptions {
    fn default() -> Self {
        Self {
            grouped: true,
            project_filter: None,
            timeline_window_days: DEFAULT_TIMELINE_WINDOW_DAYS,
        }
    }
}

impl InsightsOptions {
    fn keeps(&self, project: &str) -> bool {
        self.project_filter
            .as_ref()
            .map_or(true, |projects| projects.contains(project))
    }
}

/// Result of [`compute_insights`]
///
/// `Empty` serializes as `{}` so callers see the same shape for "no data"
/// whether or not grouping was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightsResult {
    Empty,
    Single(Insights),
    Grouped(BTreeMap<String, Insights>),
}

impl InsightsResult {
    pub fn is_empty(&self) -> bool {
        match self {
            InsightsResult::Empty => true,
            InsightsResult::Single(_) => false,
            InsightsResult::Grouped(projects) => projects.is_empty(),
        }
    }
}

impl Serialize for InsightsResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InsightsResult::Empty => serializer.serialize_map(Some(0))?.end(),
            InsightsResult::Single(insights) => insights.serialize(serializer),
            InsightsResult::Grouped(projects) => projects.serialize(serializer),
        }
    }
}

/// Tally each shipment's label at `cutoff`
pub fn repartition<'a, I>(shipments: I, cutoff: DateTime<Utc>) -> Repartition
where
    I: IntoIterator<Item = &'a Shipment>,
{
    let mut counts = Repartition::default();
    for shipment in shipments {
        counts.record(classify(shipment.milestones.as_ref(), cutoff));
    }
    counts
}

/// Day-by-day repartitions covering the milestone history
///
/// Steps run 24 h apart from `max(min, last - window) - 1 day` to
/// `last = max + 1 day` inclusive, each labelled with its UTC date. A label
/// only changes at a milestone time, so each shipment contributes at most
/// one transition per set slot and the cost stays linear in shipments plus
/// days.
///
/// `window_days` is clamped to `1..=MAX_TIMELINE_WINDOW_DAYS`. Milestones at
/// the edge of the representable time range give an empty timeline.
pub fn timeline<'a, I>(shipments: I, window_days: i64) -> Vec<TimelineEntry>
where
    I: IntoIterator<Item = &'a Shipment>,
{
    let shipments: Vec<&Shipment> = shipments.into_iter().collect();

    let mut timestamps = shipments
        .iter()
        .filter_map(|shipment| shipment.milestones.as_ref())
        .flat_map(|record| record.timestamps());
    let Some(seed) = timestamps.next() else {
        return Vec::new();
    };
    let (min, max) = timestamps.fold((seed, seed), |(lo, hi), t| (lo.min(t), hi.max(t)));

    let window = Duration::days(window_days.clamp(1, MAX_TIMELINE_WINDOW_DAYS));
    let Some(last) = max.checked_add_signed(one_day()) else {
        return Vec::new();
    };
    let start = last.checked_sub_signed(window).map_or(min, |start| min.max(start));
    let Some(first) = start.checked_sub_signed(one_day()) else {
        return Vec::new();
    };
    let day_ms = one_day().num_milliseconds();
    let steps = ((last - first).num_milliseconds() / day_ms + 1) as usize;

    // Per-step label deltas; every shipment starts as noScans
    let mut deltas = vec![[0_i64; 6]; steps];
    deltas[0][label_slot(ProgressLabel::NoScans)] += shipments.len() as i64;

    for shipment in &shipments {
        let Some(record) = shipment.milestones.as_ref() else {
            continue;
        };
        let mut times: Vec<DateTime<Utc>> = record.timestamps().collect();
        times.sort();
        times.dedup();

        let mut previous = ProgressLabel::NoScans;
        for time in times {
            let label = classify(Some(record), time);
            if label == previous {
                continue;
            }
            let offset = (time - first).num_milliseconds();
            let step = if offset <= 0 {
                0
            } else {
                ((offset + day_ms - 1) / day_ms) as usize
            };
            if step < steps {
                deltas[step][label_slot(previous)] -= 1;
                deltas[step][label_slot(label)] += 1;
            }
            previous = label;
        }
    }

    let mut running = [0_i64; 6];
    let entries: Vec<TimelineEntry> = deltas
        .iter()
        .enumerate()
        .map(|(step, delta)| {
            for (count, change) in running.iter_mut().zip(delta) {
                *count += change;
            }
            let mut snapshot = Repartition {
                total: shipments.len() as u64,
                ..Default::default()
            };
            for label in ProgressLabel::ALL {
                *snapshot.counter(label) = running[label_slot(label)] as u64;
            }
            TimelineEntry {
                day: utc_day(first + Duration::days(step as i64)),
                repartition: snapshot,
            }
        })
        .collect();

    debug!(
        shipments = shipments.len(),
        days = entries.len(),
        "Built insights timeline"
    );
    entries
}

fn label_slot(label: ProgressLabel) -> usize {
    match label {
        ProgressLabel::NoScans => 0,
        ProgressLabel::InProgress => 1,
        ProgressLabel::Received => 2,
        ProgressLabel::ReachedGps => 3,
        ProgressLabel::ReachedAndReceived => 4,
        ProgressLabel::Validated => 5,
    }
}

/// Per-item content totals, with the share carried by validated shipments
pub fn content<'a, I>(shipments: I) -> BTreeMap<String, ContentTally>
where
    I: IntoIterator<Item = &'a Shipment>,
{
    let mut tallies: BTreeMap<String, ContentTally> = BTreeMap::new();

    for shipment in shipments {
        let Some(items) = shipment.content.as_ref() else {
            continue;
        };
        let validated = shipment.progress == ProgressLabel::Validated
            || shipment
                .milestones
                .as_ref()
                .is_some_and(|record| record.validated.is_some());

        for (item, count) in items {
            let tally = tallies.entry(item.clone()).or_default();
            tally.total += count;
            if validated {
                tally.validated_total += count;
            }
        }
    }

    tallies
}

fn summarize(sample: &[&Shipment], options: &InsightsOptions, now: DateTime<Utc>) -> Insights {
    Insights {
        repartition: repartition(sample.iter().copied(), now),
        timeline: timeline(sample.iter().copied(), options.timeline_window_days),
        content: content(sample.iter().copied()),
    }
}

/// Build dashboard insights for a pre-authorized shipment population
///
/// Absent or empty input gives [`InsightsResult::Empty`]. Grouped mode
/// returns one payload per (kept) project; ungrouped mode one payload over
/// every kept shipment.
pub fn compute_insights(
    shipments: Option<&[Shipment]>,
    options: &InsightsOptions,
    now: DateTime<Utc>,
) -> InsightsResult {
    let Some(shipments) = shipments.filter(|shipments| !shipments.is_empty()) else {
        return InsightsResult::Empty;
    };

    if !options.grouped {
        let sample: Vec<&Shipment> = shipments
            .iter()
            .filter(|shipment| options.keeps(&shipment.project))
            .collect();
        debug!(shipments = sample.len(), "Computing ungrouped insights");
        return InsightsResult::Single(summarize(&sample, options, now));
    }

    let mut by_project: BTreeMap<&str, Vec<&Shipment>> = BTreeMap::new();
    for shipment in shipments {
        if options.keeps(&shipment.project) {
            by_project.entry(shipment.project.as_str()).or_default().push(shipment);
        }
    }
    debug!(projects = by_project.len(), "Computing grouped insights");

    InsightsResult::Grouped(
        by_project
            .into_iter()
            .map(|(project, sample)| (project.to_string(), summarize(&sample, options, now)))
            .collect(),
    )
}

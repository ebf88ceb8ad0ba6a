//! Per-node run summary

use crate::types::Outcome;
use chrono::{DateTime, Local, TimeDelta};
use std::time::Duration;

/// Outcome of one item with the time it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Result of applying one node
///
/// Created when the apply begins and finished when the last item has
/// reached a terminal outcome. The four counters always add up to the
/// number of recorded items.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    node: String,
    start: DateTime<Local>,
    end: Option<DateTime<Local>>,
    pub correct: usize,
    pub fixed: usize,
    pub skipped: usize,
    pub failed: usize,
    items: Vec<ItemRecord>,
}

impl ApplyResult {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            start: Local::now(),
            end: None,
            correct: 0,
            fixed: 0,
            skipped: 0,
            failed: 0,
            items: Vec::new(),
        }
    }

    /// Record a terminal outcome and count it
    ///
    /// `Pending` is not an outcome an item can finish with and is ignored.
    pub fn record(&mut self, id: impl Into<String>, outcome: Outcome, duration: Duration) {
        let counter = match outcome {
            Outcome::Pending => return,
            Outcome::Correct => &mut self.correct,
            Outcome::Fixed => &mut self.fixed,
            Outcome::Skipped { .. } => &mut self.skipped,
            Outcome::Failed { .. } => &mut self.failed,
        };
        *counter += 1;
        self.items.push(ItemRecord {
            id: id.into(),
            outcome,
            duration,
        });
    }

    /// Set the end timestamp
    pub fn finish(&mut self) {
        self.end = Some(Local::now());
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Local>> {
        self.end
    }

    /// Wall-clock duration of the run (up to now while unfinished)
    pub fn duration(&self) -> TimeDelta {
        self.end.unwrap_or_else(Local::now) - self.start
    }

    pub fn total(&self) -> usize {
        self.correct + self.fixed + self.skipped + self.failed
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.items.iter().find(|r| r.id == id).map(|r| &r.outcome)
    }

    /// Records of failed items, in completion order
    pub fn failures(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// `"<c> OK, <f> fixed, <s> skipped, <x> failed"`
    pub fn format_node_result(&self) -> String {
        format!(
            "{} OK, {} fixed, {} skipped, {} failed",
            self.correct, self.fixed, self.skipped, self.failed
        )
    }

    /// Start and completion lines of the run report
    pub fn report_lines(&self) -> Vec<String> {
        vec![
            format!(
                "{}: run started at {}",
                self.node,
                self.start.format("%Y-%m-%d %H:%M:%S")
            ),
            format!(
                "{}: run completed after {} ({})",
                self.node,
                format_duration(self.duration()),
                self.format_node_result()
            ),
        ]
    }
}

/// Render a duration as `H:MM:SS`
pub fn format_duration(duration: TimeDelta) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

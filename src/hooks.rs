//! Lifecycle events as structured log records
//!
//! Every event is one record on the `converge::events` target with
//! `key=value` fields, so it can be filtered through `RUST_LOG`.

use declarative::{ApplyResult, Hooks, ItemStatus, Outcome};

const EVENTS: &str = "converge::events";

pub struct LogHooks;

impl Hooks for LogHooks {
    fn apply_start(&self, node: &str, interactive: bool) {
        log::info!(target: EVENTS, "event=apply_start node={node} interactive={interactive}");
    }

    fn apply_end(&self, node: &str, result: &ApplyResult) {
        log::info!(
            target: EVENTS,
            "event=apply_end node={node} correct={} fixed={} skipped={} failed={} duration_ms={}",
            result.correct,
            result.fixed,
            result.skipped,
            result.failed,
            result.duration().num_milliseconds()
        );
    }

    fn item_apply_start(&self, node: &str, item_id: &str) {
        log::debug!(target: EVENTS, "event=item_apply_start node={node} item={item_id}");
    }

    fn item_apply_end(&self, node: &str, item_id: &str, outcome: &Outcome) {
        log::debug!(
            target: EVENTS,
            "event=item_apply_end node={node} item={item_id} outcome={}",
            outcome.label()
        );
    }

    fn item_fixed(&self, node: &str, item_id: &str, status: &ItemStatus) {
        log::info!(
            target: EVENTS,
            "event=item_fixed node={node} item={item_id} fixed={}",
            status.needs_fixing().join(",")
        );
    }
}

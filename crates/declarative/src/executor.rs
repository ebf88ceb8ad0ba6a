//! Execution engine - applies one node's items with bounded parallelism
//!
//! Items are scheduled as soon as every dependency has reached a terminal
//! outcome. Completing an item spawns its newly eligible dependents on
//! the same worker pool; a failed or skipped item marks all of its
//! transitive dependents skipped without probing them.

use crate::context::{ConfirmCallback, Hooks, Target};
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::item::{BoxedItem, Item};
use crate::result::ApplyResult;
use crate::types::{ApplyOptions, Outcome};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Apply every item of a node and collect the outcomes
///
/// # Type Parameters
/// * `C` - Confirm callback type
/// * `H` - Hooks type
///
/// # Arguments
/// * `node` - Name of the node being applied
/// * `items` - The node's fully materialized item set
/// * `target` - Transport to the node
/// * `opts` - Worker count, interactive and force flags
/// * `confirm` - Asked before each fix in interactive mode
/// * `hooks` - Lifecycle callbacks
///
/// # Errors
/// Fails before any item runs if the dependency graph is invalid or the
/// worker pool cannot be created. Item failures are never returned here;
/// they are recorded in the result.
pub fn apply_node<C, H>(
    node: &str,
    items: &[BoxedItem],
    target: &dyn Target,
    opts: &ApplyOptions,
    confirm: &mut C,
    hooks: &H,
) -> Result<ApplyResult>
where
    C: ConfirmCallback,
    H: Hooks + ?Sized,
{
    let graph = DependencyGraph::build(items)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.worker_count())
        .thread_name(|i| format!("item-worker-{i}"))
        .build()?;

    hooks.apply_start(node, opts.interactive);
    log::debug!(
        "{node}: applying {} items with {} workers",
        items.len(),
        opts.worker_count()
    );

    let run = Run {
        node,
        items,
        graph: &graph,
        target,
        opts,
        hooks,
        confirm: Mutex::new(confirm),
        state: Mutex::new(State {
            outcomes: vec![Outcome::Pending; items.len()],
            scheduled: vec![false; items.len()],
            result: ApplyResult::new(node),
        }),
    };

    let roots = {
        let mut state = run.lock_state();
        let roots = graph.roots();
        for &root in &roots {
            state.scheduled[root] = true;
        }
        roots
    };
    pool.scope(|scope| {
        for root in roots {
            run.spawn(scope, root);
        }
    });

    let mut result = run
        .state
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .result;
    result.finish();
    hooks.apply_end(node, &result);
    Ok(result)
}

struct State {
    outcomes: Vec<Outcome>,
    /// Set once an item has been handed to a worker
    scheduled: Vec<bool>,
    result: ApplyResult,
}

struct Run<'a, C, H: ?Sized> {
    node: &'a str,
    items: &'a [BoxedItem],
    graph: &'a DependencyGraph,
    target: &'a dyn Target,
    opts: &'a ApplyOptions,
    hooks: &'a H,
    confirm: Mutex<&'a mut C>,
    state: Mutex<State>,
}

impl<C, H> Run<'_, C, H>
where
    C: ConfirmCallback,
    H: Hooks + ?Sized,
{
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // a panicking item is recorded as failed; the table stays usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn<'s>(&'s self, scope: &rayon::Scope<'s>, index: usize) {
        scope.spawn(move |scope| {
            let item = &self.items[index];
            let id = item.id();
            self.hooks.item_apply_start(self.node, &id);

            let started = Instant::now();
            let forced = self.is_forced(index);
            let outcome = match catch_unwind(AssertUnwindSafe(|| self.apply_item(item.as_ref(), forced))) {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => Outcome::Failed {
                    error: format!("{e:#}"),
                },
                Err(payload) => Outcome::Failed {
                    error: format!("panicked: {}", panic_message(payload.as_ref())),
                },
            };

            for next in self.complete(index, outcome, started.elapsed()) {
                self.spawn(scope, next);
            }
        });
    }

    /// Whether a trigger source of `index` has been fixed in this run
    fn is_forced(&self, index: usize) -> bool {
        let state = self.lock_state();
        self.graph
            .triggered_by(index)
            .iter()
            .any(|&source| state.outcomes[source] == Outcome::Fixed)
    }

    /// Probe, confirm and fix one item
    fn apply_item(&self, item: &dyn Item, forced: bool) -> anyhow::Result<Outcome> {
        let id = item.id();
        let status = item.get_status(self.target)?;
        log::debug!("{}: {id} needs fixing: {:?}", self.node, status.needs_fixing());

        if status.correct() {
            if !forced {
                return Ok(Outcome::Correct);
            }
            log::info!("{}: {id} triggered", self.node);
        }

        if self.opts.needs_confirmation() {
            let question = item.ask(self.target, &status)?;
            let prompt = if question.is_empty() {
                format!("{}: {id} (triggered)", self.node)
            } else {
                format!("{}: {id}\n{question}", self.node)
            };
            // one prompt at a time across all workers
            let approved = {
                let mut confirm = self.confirm.lock().unwrap_or_else(PoisonError::into_inner);
                confirm.confirm(&prompt)?
            };
            if !approved {
                return Ok(Outcome::Skipped {
                    reason: "declined".to_string(),
                });
            }
        }

        item.fix(self.target, &status)?;
        log::info!("{}: fixed {id}", self.node);
        self.hooks.item_fixed(self.node, &id, &status);
        Ok(Outcome::Fixed)
    }

    /// Record a terminal outcome and return the dependents that became eligible
    ///
    /// The outcome, its count and any skips it causes are applied under
    /// one lock acquisition.
    fn complete(&self, index: usize, outcome: Outcome, duration: Duration) -> Vec<usize> {
        let id = self.graph.id(index).to_string();
        let mut finished = Vec::new();
        let mut ready = Vec::new();
        {
            let mut state = self.lock_state();
            state.outcomes[index] = outcome.clone();
            state.result.record(&id, outcome.clone(), duration);
            finished.push((id.clone(), outcome.clone()));

            if outcome.blocks_dependents() {
                for dependent in self.graph.transitive_dependents(index) {
                    if state.outcomes[dependent] != Outcome::Pending {
                        continue;
                    }
                    let skipped = Outcome::Skipped {
                        reason: format!("dependency {id} {}", outcome.label()),
                    };
                    let dependent_id = self.graph.id(dependent).to_string();
                    state.outcomes[dependent] = skipped.clone();
                    state.scheduled[dependent] = true;
                    state
                        .result
                        .record(&dependent_id, skipped.clone(), Duration::ZERO);
                    finished.push((dependent_id, skipped));
                }
            } else if outcome.unblocks_dependents() {
                for &dependent in self.graph.dependents(index) {
                    let eligible = !state.scheduled[dependent]
                        && self
                            .graph
                            .dependencies(dependent)
                            .iter()
                            .all(|&dep| state.outcomes[dep].is_terminal());
                    if eligible {
                        state.scheduled[dependent] = true;
                        ready.push(dependent);
                    }
                }
            }
        }

        for (id, outcome) in &finished {
            match outcome {
                Outcome::Failed { error } => log::warn!("{}: {id} failed: {error}", self.node),
                Outcome::Skipped { reason } => log::warn!("{}: {id} skipped ({reason})", self.node),
                _ => {}
            }
            self.hooks.item_apply_end(self.node, id, outcome);
        }
        ready
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use crate::context::{AutoConfirm, AutoDecline, NoHooks};
    use crate::error::Error;
    use crate::item::ItemBase;
    use crate::testing::FakeTarget;
    use crate::types::ItemStatus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Correct,
        Fixable,
        ProbeError,
        FixError,
        Panic,
    }

    /// Calls made to test items, in order
    type CallLog = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Default)]
    struct Gauge {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    #[derive(Debug)]
    struct TestItem {
        base: ItemBase,
        behavior: Behavior,
        calls: CallLog,
        gauge: Option<Arc<Gauge>>,
    }

    impl Item for TestItem {
        fn item_type(&self) -> &'static str {
            "action"
        }

        fn base(&self) -> &ItemBase {
            &self.base
        }

        fn get_status(&self, _target: &dyn Target) -> anyhow::Result<ItemStatus> {
            self.calls.lock().unwrap().push(format!("status {}", self.name()));
            if let Some(gauge) = &self.gauge {
                let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.max.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                gauge.current.fetch_sub(1, Ordering::SeqCst);
            }
            match self.behavior {
                Behavior::Correct => Ok(ItemStatus::correct_status()),
                Behavior::ProbeError => anyhow::bail!("connection refused"),
                Behavior::Panic => panic!("probe exploded"),
                Behavior::Fixable | Behavior::FixError => Ok(ItemStatus::new(["command"])),
            }
        }

        fn fix(&self, _target: &dyn Target, _status: &ItemStatus) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("fix {}", self.name()));
            match self.behavior {
                Behavior::FixError => anyhow::bail!("exit code 1"),
                _ => Ok(()),
            }
        }
    }

    struct Fixture {
        items: Vec<BoxedItem>,
        calls: CallLog,
        bundle: Arc<Bundle>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                items: Vec::new(),
                calls: CallLog::default(),
                bundle: Arc::new(Bundle::new("bundle", "node1", "/b")),
            }
        }

        fn item(mut self, name: &str, behavior: Behavior, needs: &[&str], triggers: &[&str]) -> Self {
            let mut base = ItemBase::new(Arc::clone(&self.bundle), name);
            base.needs = needs.iter().map(|n| format!("action:{n}")).collect();
            base.triggers = triggers.iter().map(|t| format!("action:{t}")).collect();
            self.items.push(Box::new(TestItem {
                base,
                behavior,
                calls: Arc::clone(&self.calls),
                gauge: None,
            }));
            self
        }

        fn apply(&self, opts: &ApplyOptions, confirm: &mut impl ConfirmCallback) -> ApplyResult {
            apply_node("node1", &self.items, &FakeTarget::new(), opts, confirm, &NoHooks).unwrap()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    /// Answers confirmations from a script and counts prompts
    struct Scripted {
        answers: Vec<bool>,
        prompts: Vec<String>,
    }

    impl ConfirmCallback for Scripted {
        fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
            self.prompts.push(prompt.to_string());
            Ok(self.answers.pop().unwrap_or(false))
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl Hooks for RecordingHooks {
        fn apply_start(&self, node: &str, interactive: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("apply_start {node} {interactive}"));
        }

        fn apply_end(&self, node: &str, result: &ApplyResult) {
            self.events
                .lock()
                .unwrap()
                .push(format!("apply_end {node} {}", result.total()));
        }

        fn item_fixed(&self, _node: &str, item_id: &str, _status: &ItemStatus) {
            self.events.lock().unwrap().push(format!("fixed {item_id}"));
        }
    }

    fn outcome_label(result: &ApplyResult, name: &str) -> &'static str {
        result
            .outcome(&format!("action:{name}"))
            .map_or("missing", Outcome::label)
    }

    #[test]
    fn test_zero_items_interactive() {
        let opts = ApplyOptions {
            interactive: true,
            ..Default::default()
        };
        let hooks = RecordingHooks::default();
        let result = apply_node("node1", &[], &FakeTarget::new(), &opts, &mut AutoDecline, &hooks)
            .unwrap();

        assert_eq!(result.total(), 0);
        assert!(result.end().is_some());
        let lines = result.report_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("(0 OK, 0 fixed, 0 skipped, 0 failed)"));
        assert_eq!(
            *hooks.events.lock().unwrap(),
            ["apply_start node1 true", "apply_end node1 0"]
        );
    }

    #[test]
    fn test_failure_skips_transitive_dependents() {
        let fixture = Fixture::new()
            .item("a", Behavior::FixError, &[], &[])
            .item("b", Behavior::Fixable, &["a"], &[])
            .item("c", Behavior::Correct, &["b"], &[])
            .item("d", Behavior::Fixable, &[], &[]);
        let result = fixture.apply(&ApplyOptions::default(), &mut AutoConfirm);

        assert_eq!(outcome_label(&result, "a"), "failed");
        assert_eq!(outcome_label(&result, "b"), "skipped");
        assert_eq!(outcome_label(&result, "c"), "skipped");
        assert_eq!(outcome_label(&result, "d"), "fixed");
        assert_eq!(result.total(), 4);

        let calls = fixture.calls();
        assert!(!calls.iter().any(|c| c.ends_with(" b") || c.ends_with(" c")));
        let failure = result.failures().next().unwrap();
        assert!(matches!(&failure.outcome, Outcome::Failed { error } if error.contains("exit code 1")));
    }

    #[test]
    fn test_probe_error_and_panic_are_isolated() {
        let fixture = Fixture::new()
            .item("probe", Behavior::ProbeError, &[], &[])
            .item("boom", Behavior::Panic, &[], &[])
            .item("after_boom", Behavior::Fixable, &["boom"], &[])
            .item("fine", Behavior::Correct, &[], &[]);
        let result = fixture.apply(&ApplyOptions::default(), &mut AutoConfirm);

        assert_eq!(outcome_label(&result, "probe"), "failed");
        assert_eq!(outcome_label(&result, "boom"), "failed");
        assert_eq!(outcome_label(&result, "after_boom"), "skipped");
        assert_eq!(outcome_label(&result, "fine"), "correct");
        assert_eq!(result.format_node_result(), "1 OK, 0 fixed, 1 skipped, 2 failed");
    }

    #[test]
    fn test_dependencies_run_first() {
        let fixture = Fixture::new()
            .item("second", Behavior::Fixable, &["first"], &[])
            .item("first", Behavior::Fixable, &[], &[]);
        fixture.apply(&ApplyOptions::default(), &mut AutoConfirm);
        assert_eq!(
            fixture.calls(),
            ["status first", "fix first", "status second", "fix second"]
        );
    }

    #[test]
    fn test_interactive_decline_skips() {
        let fixture = Fixture::new()
            .item("a", Behavior::Fixable, &[], &[])
            .item("b", Behavior::Correct, &["a"], &[]);
        let opts = ApplyOptions {
            interactive: true,
            ..Default::default()
        };
        let mut confirm = Scripted {
            answers: vec![false],
            prompts: Vec::new(),
        };
        let result = fixture.apply(&opts, &mut confirm);

        assert_eq!(outcome_label(&result, "a"), "skipped");
        assert_eq!(outcome_label(&result, "b"), "skipped");
        assert_eq!(confirm.prompts.len(), 1);
        assert!(confirm.prompts[0].contains("action:a"));
        assert!(!fixture.calls().contains(&"fix a".to_string()));
    }

    #[test]
    fn test_interactive_only_asks_for_incorrect_items() {
        let fixture = Fixture::new()
            .item("ok", Behavior::Correct, &[], &[])
            .item("bad", Behavior::Fixable, &[], &[]);
        let opts = ApplyOptions {
            interactive: true,
            ..Default::default()
        };
        let mut confirm = Scripted {
            answers: vec![true],
            prompts: Vec::new(),
        };
        let result = fixture.apply(&opts, &mut confirm);
        assert_eq!(confirm.prompts.len(), 1);
        assert_eq!(outcome_label(&result, "bad"), "fixed");
        assert_eq!(outcome_label(&result, "ok"), "correct");
    }

    #[test]
    fn test_force_never_prompts() {
        let fixture = Fixture::new()
            .item("a", Behavior::Fixable, &[], &[])
            .item("b", Behavior::Correct, &[], &[]);
        let opts = ApplyOptions {
            interactive: true,
            force: true,
            ..Default::default()
        };
        let result = fixture.apply(&opts, &mut AutoDecline);
        assert_eq!(outcome_label(&result, "a"), "fixed");
        assert_eq!(outcome_label(&result, "b"), "correct");
    }

    #[test]
    fn test_trigger_forces_fix() {
        let fixture = Fixture::new()
            .item("config", Behavior::Fixable, &[], &["restart"])
            .item("restart", Behavior::Correct, &[], &[]);
        let result = fixture.apply(&ApplyOptions::default(), &mut AutoConfirm);
        assert_eq!(outcome_label(&result, "restart"), "fixed");
        assert!(fixture.calls().contains(&"fix restart".to_string()));
    }

    #[test]
    fn test_trigger_not_fired_when_source_correct() {
        let fixture = Fixture::new()
            .item("config", Behavior::Correct, &[], &["restart"])
            .item("restart", Behavior::Correct, &[], &[]);
        let result = fixture.apply(&ApplyOptions::default(), &mut AutoConfirm);
        assert_eq!(outcome_label(&result, "restart"), "correct");
        assert!(!fixture.calls().contains(&"fix restart".to_string()));
    }

    #[test]
    fn test_hooks_see_fixes() {
        let fixture = Fixture::new()
            .item("a", Behavior::Fixable, &[], &[])
            .item("b", Behavior::Correct, &[], &[]);
        let hooks = RecordingHooks::default();
        apply_node(
            "node1",
            &fixture.items,
            &FakeTarget::new(),
            &ApplyOptions::default(),
            &mut AutoConfirm,
            &hooks,
        )
        .unwrap();

        let events = hooks.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("apply_start node1 false"));
        assert!(events.contains(&"fixed action:a".to_string()));
        assert!(!events.contains(&"fixed action:b".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("apply_end node1 2"));
    }

    #[test]
    fn test_cycle_aborts_before_any_item_runs() {
        let fixture = Fixture::new()
            .item("a", Behavior::Fixable, &["b"], &[])
            .item("b", Behavior::Fixable, &["a"], &[]);
        let hooks = RecordingHooks::default();
        let err = apply_node(
            "node1",
            &fixture.items,
            &FakeTarget::new(),
            &ApplyOptions::default(),
            &mut AutoConfirm,
            &hooks,
        )
        .unwrap_err();

        assert!(matches!(err, Error::DependencyCycle(_)));
        assert!(fixture.calls().is_empty());
        assert!(hooks.events.lock().unwrap().is_empty());
    }

    /// Approves every prompt and records how many were open at once
    #[derive(Default)]
    struct OverlapConfirm {
        gauge: Gauge,
        prompts: usize,
    }

    impl ConfirmCallback for OverlapConfirm {
        fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
            let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.gauge.current.fetch_sub(1, Ordering::SeqCst);
            self.prompts += 1;
            Ok(true)
        }
    }

    #[test]
    fn test_interactive_prompts_never_overlap() {
        let fixture = (0..12).fold(Fixture::new(), |fixture, i| {
            fixture.item(&format!("item{i}"), Behavior::Fixable, &[], &[])
        });
        let opts = ApplyOptions {
            workers: 8,
            interactive: true,
            ..Default::default()
        };
        let mut confirm = OverlapConfirm::default();
        let result = fixture.apply(&opts, &mut confirm);

        assert_eq!(result.fixed, 12);
        assert_eq!(confirm.prompts, 12);
        assert_eq!(confirm.gauge.max.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_count_bounds_concurrency() {
        let gauge = Arc::new(Gauge::default());
        let calls = CallLog::default();
        let bundle = Arc::new(Bundle::new("bundle", "node1", "/b"));
        let items: Vec<BoxedItem> = (0..8)
            .map(|i| {
                Box::new(TestItem {
                    base: ItemBase::new(Arc::clone(&bundle), format!("item{i}")),
                    behavior: Behavior::Correct,
                    calls: Arc::clone(&calls),
                    gauge: Some(Arc::clone(&gauge)),
                }) as BoxedItem
            })
            .collect();
        let opts = ApplyOptions {
            workers: 2,
            ..Default::default()
        };
        let result =
            apply_node("node1", &items, &FakeTarget::new(), &opts, &mut AutoConfirm, &NoHooks)
                .unwrap();

        assert_eq!(result.correct, 8);
        assert!(gauge.max.load(Ordering::SeqCst) <= 2);
        assert!(gauge.max.load(Ordering::SeqCst) >= 1);
    }
}

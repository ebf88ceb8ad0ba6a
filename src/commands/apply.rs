//! `converge apply` - converge nodes to their desired state

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{ApplyOptions, ApplyResult, AutoConfirm, ConfirmCallback, ItemRegistry, Target};
use dialoguer::Confirm;
use rayon::prelude::*;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::hooks::LogHooks;
use crate::repo::{Node, Repository};
use crate::target;
use crate::ui;

/// Asks the operator on the terminal, showing what would change
pub struct TerminalConfirm;

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        println!();
        println!("{}", ui::question(prompt));
        let confirmed = Confirm::new()
            .with_prompt("Fix?")
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let repo = Repository::open(&std::env::current_dir()?)?;
    let nodes = repo.select(&args.target)?;
    let registry = ItemRegistry::builtin();
    let opts = ApplyOptions {
        workers: usize::from(args.item_workers),
        interactive: args.interactive,
        force: args.force,
    };

    let mut aborted = 0;
    if args.interactive {
        // prompts of different nodes must not interleave
        for node in nodes {
            let target = target::for_node(node);
            let result = apply_node(
                &repo,
                node,
                &registry,
                target.as_ref(),
                &opts,
                &mut TerminalConfirm,
            );
            aborted += usize::from(!print_report(ctx, &node.name, &result));
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(usize::from(args.node_workers))
            .build()
            .context("Failed to create node worker pool")?;
        let results: Vec<(String, Result<ApplyResult>)> = pool.install(|| {
            nodes
                .par_iter()
                .map(|node| {
                    let target = target::for_node(node);
                    let result = apply_node(
                        &repo,
                        node,
                        &registry,
                        target.as_ref(),
                        &opts,
                        &mut AutoConfirm,
                    );
                    (node.name.clone(), result)
                })
                .collect()
        });
        for (name, result) in &results {
            aborted += usize::from(!print_report(ctx, name, result));
        }
    }

    if aborted > 0 {
        bail!("{aborted} node(s) could not be applied");
    }
    Ok(())
}

/// Load a node's items and apply them
///
/// Errors are node-level: invalid configuration or an invalid
/// dependency graph. Item failures are part of the returned result.
pub fn apply_node<C: ConfirmCallback>(
    repo: &Repository,
    node: &Node,
    registry: &ItemRegistry,
    target: &dyn Target,
    opts: &ApplyOptions,
    confirm: &mut C,
) -> Result<ApplyResult> {
    let items = repo
        .load_items(node, registry)
        .with_context(|| format!("Failed to load items for {}", node.name))?;
    let result = declarative::apply_node(&node.name, &items, target, opts, confirm, &LogHooks)?;
    Ok(result)
}

/// Print a node's report; returns false if the node was aborted
fn print_report(ctx: &Context, name: &str, result: &Result<ApplyResult>) -> bool {
    match result {
        Ok(result) => {
            for line in result.report_lines() {
                ui::report_line(&line);
            }
            for failure in result.failures() {
                if let declarative::Outcome::Failed { error } = &failure.outcome {
                    ui::failure(&failure.id, error);
                }
            }
            if ctx.verbose > 0 && result.skipped > 0 {
                ui::warn(&format!("{name}: {} items skipped", result.skipped));
            }
            true
        }
        Err(e) => {
            ui::error(&format!("{name}: {e:#}"));
            false
        }
    }
}

//! `converge nodes` - list nodes and groups

use anyhow::Result;

use crate::Context;
use crate::repo::Repository;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let repo = Repository::open(&std::env::current_dir()?)?;

    if !ctx.quiet {
        ui::header("Nodes");
    }
    for node in repo.nodes() {
        if ctx.quiet {
            println!("{}", node.name);
            continue;
        }
        ui::kv(&node.name, &node.hostname);
        if ctx.verbose > 0 && !node.bundles.is_empty() {
            ui::dim(&format!("  bundles: {}", node.bundles.join(", ")));
        }
    }

    if !ctx.quiet {
        let groups: Vec<_> = repo.groups().collect();
        if !groups.is_empty() {
            ui::header("Groups");
            for (name, members) in groups {
                ui::kv(name, &members.join(", "));
            }
        }
    }
    Ok(())
}

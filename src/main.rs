mod cli;
mod commands;
mod hooks;
mod repo;
mod target;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use repo::NoSuchRepository;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // log lines would interleave with interactive prompts
    let interactive = matches!(&cli.command, Command::Apply(args) if args.interactive);

    env_logger::Builder::new()
        .filter_level(if cli.quiet || (interactive && cli.verbose == 0) {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Test(args) => commands::test::run(&ctx, args.target.as_deref()),
        Command::Nodes => commands::nodes::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result
        && e.downcast_ref::<NoSuchRepository>().is_some()
    {
        eprintln!("! {e}");
        std::process::exit(1);
    }
    result
}

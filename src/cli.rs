use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge nodes to the state their bundles describe", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply the desired state to one or more nodes
    Apply(ApplyArgs),

    /// Validate items and dependencies without contacting any node
    Test(TestArgs),

    /// List the nodes and groups of the repository
    Nodes,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Node or group name, or a comma-separated list of them
    pub target: String,

    /// Ask before fixing each item
    #[arg(short, long)]
    pub interactive: bool,

    /// Answer every interactive question with yes
    #[arg(short, long)]
    pub force: bool,

    /// Number of items applied concurrently on each node
    #[arg(
        short = 'p',
        long,
        default_value_t = 4,
        env = "CONVERGE_ITEM_WORKERS",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub item_workers: u16,

    /// Number of nodes applied concurrently (ignored with --interactive)
    #[arg(
        long,
        default_value_t = 1,
        env = "CONVERGE_NODE_WORKERS",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub node_workers: u16,
}

#[derive(Args)]
pub struct TestArgs {
    /// Node or group name, or a comma-separated list (default: all nodes)
    pub target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_defaults() {
        let cli = Cli::try_parse_from(["converge", "apply", "web1"]).unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target, "web1");
        assert!(!args.interactive);
        assert_eq!(args.item_workers, 4);
    }

    #[test]
    fn test_apply_flags() {
        let cli =
            Cli::try_parse_from(["converge", "-v", "apply", "web1,db", "-i", "-f", "-p", "8"])
                .unwrap();
        assert_eq!(cli.verbose, 1);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.interactive && args.force);
        assert_eq!(args.item_workers, 8);
        assert!(Cli::try_parse_from(["converge", "apply", "web1", "-p", "0"]).is_err());
    }
}

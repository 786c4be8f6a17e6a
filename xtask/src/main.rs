use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for worldgit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run fmt, clippy, tests and docs in order, stopping at the first failure
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates, warnings denied
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
}

/// One cargo invocation: a label for the log line and its arguments.
struct Step {
    label: &'static str,
    args: &'static [&'static str],
}

const FMT: Step = Step {
    label: "fmt check",
    args: &["fmt", "--all", "--", "--check"],
};
const CLIPPY: Step = Step {
    label: "clippy",
    args: &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
};
const TEST: Step = Step {
    label: "test",
    args: &["test", "--workspace"],
};
const DOC: Step = Step {
    label: "doc",
    args: &["doc", "--workspace", "--no-deps"],
};

fn main() -> Result<()> {
    let steps: &[Step] = match Cli::parse().command {
        Commands::Check => &[FMT, CLIPPY, TEST, DOC],
        Commands::Fmt => &[FMT],
        Commands::Clippy => &[CLIPPY],
        Commands::Test => &[TEST],
        Commands::Doc => &[DOC],
    };
    steps.iter().try_for_each(run)
}

fn run(step: &Step) -> Result<()> {
    println!("==> cargo {}", step.args.join(" "));
    let status = Command::new("cargo").args(step.args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {} failed", step.label);
    }
    Ok(())
}

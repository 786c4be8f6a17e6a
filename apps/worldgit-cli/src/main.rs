use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use worldgit_author::{Command, Plugin};
use worldgit_common::{BlockPos, is_empty_block};
use worldgit_kernel::BlockWorld;
use worldgit_persist::{FORMAT_VERSION, RepoConfig};

/// Demo world kept next to the repository so edits survive between runs.
const WORLD_FILE: &str = "world.json";

#[derive(Parser)]
#[command(name = "worldgit", about = "Version block edits with commit, revert, rollback and stash")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON config file (root, stash_threshold, compression_level)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository directory (overrides the config file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Pending changes allowed before an automatic stash
    #[arg(long)]
    stash_threshold: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and repository format
    Info,
    /// Place a block, recording the change
    Place {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,
        block: String,
    },
    /// Break the block at a position, recording the change
    Break {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,
    },
    /// Print the demo world's blocks
    Blocks,
    /// Show commit count, pending changes and HEAD
    Status,
    /// Commit pending (and stashed) changes
    Commit {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Undo the commit at HEAD, discarding uncommitted changes first
    Revert,
    /// Undo every uncommitted change
    Rollback,
    /// Flush pending changes to a stash file
    Stash,
    /// Restore every stash file into the pending buffer
    Unstash,
    /// List commits from HEAD back to the root
    Log {
        /// Show at most this many commits
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Print one commit as JSON
    Show { timestamp: u64 },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = load_config(&cli)?;

    if let Commands::Info = cli.command {
        println!("worldgit v{}", env!("CARGO_PKG_VERSION"));
        println!("author: {}", worldgit_author::crate_info());
        println!("persist: {} (format v{FORMAT_VERSION})", worldgit_persist::crate_info());
        println!("root: {}", config.root.display());
        println!("stash threshold: {}", config.stash_threshold);
        return Ok(());
    }

    let plugin = Plugin::setup(&config).context("failed to open repository")?;
    let world_path = config.root.join(WORLD_FILE);
    let mut world = load_world(&world_path)?;

    let reply = run(&cli.command, &plugin, &mut world);
    for line in reply {
        println!("{line}");
    }

    save_world(&world_path, &world)?;
    plugin.shutdown();
    Ok(())
}

fn run(command: &Commands, plugin: &Plugin, world: &mut BlockWorld) -> Vec<String> {
    let git = match command {
        Commands::Info => return Vec::new(),
        Commands::Place { x, y, z, block } => {
            let pos = BlockPos::new(*x, *y, *z);
            let prior = world.block_at(pos).to_string();
            if is_empty_block(&prior) {
                plugin.tracker().on_block_placed(pos, block);
            } else {
                plugin.tracker().on_block_changed(pos, &prior, block);
            }
            world.put(pos, block);
            return vec![format!("Placed {block} at {pos} (was {prior}).")];
        }
        Commands::Break { x, y, z } => {
            let pos = BlockPos::new(*x, *y, *z);
            let prior = world.block_at(pos).to_string();
            if is_empty_block(&prior) {
                return vec![format!("Nothing to break at {pos}.")];
            }
            plugin.tracker().on_block_broken(pos, &prior);
            world.put(pos, worldgit_common::EMPTY_BLOCK);
            return vec![format!("Broke {prior} at {pos}.")];
        }
        Commands::Blocks => {
            if world.block_count() == 0 {
                return vec!["The world is empty.".to_string()];
            }
            return world
                .blocks()
                .iter()
                .map(|(pos, block)| format!("{pos} {block}"))
                .collect();
        }
        Commands::Status => Command::Status,
        Commands::Commit { message } => Command::Commit {
            message: message.join(" "),
        },
        Commands::Revert => Command::Revert,
        Commands::Rollback => Command::Rollback,
        Commands::Stash => Command::Stash,
        Commands::Unstash => Command::Unstash,
        Commands::Log { count } => Command::Log { limit: *count },
        Commands::Show { timestamp } => Command::Show {
            timestamp: *timestamp,
        },
    };
    git.execute(plugin.engine(), world)
}

fn load_config(cli: &Cli) -> anyhow::Result<RepoConfig> {
    let mut config = match &cli.config {
        Some(path) => RepoConfig::load(path)?,
        None => RepoConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(threshold) = cli.stash_threshold {
        config.stash_threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

fn load_world(path: &Path) -> anyhow::Result<BlockWorld> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no saved world, starting empty");
        return Ok(BlockWorld::new());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let world: BlockWorld = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    tracing::debug!(path = %path.display(), blocks = world.block_count(), "world loaded");
    Ok(world)
}

fn save_world(path: &Path, world: &BlockWorld) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    serde_json::to_writer_pretty(file, world)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), blocks = world.block_count(), "world saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(tmp: &tempfile::TempDir) -> (Plugin, BlockWorld) {
        let plugin = Plugin::setup(&RepoConfig::at(tmp.path())).unwrap();
        (plugin, BlockWorld::new())
    }

    #[test]
    fn cli_parses_negative_coordinates() {
        let cli = Cli::try_parse_from(["worldgit", "place", "-3", "64", "-12", "Stone"]).unwrap();
        match cli.command {
            Commands::Place { x, y, z, block } => {
                assert_eq!((x, y, z), (-3, 64, -12));
                assert_eq!(block, "Stone");
            }
            _ => panic!("expected place"),
        }
    }

    #[test]
    fn commit_requires_message() {
        assert!(Cli::try_parse_from(["worldgit", "commit"]).is_err());
    }

    #[test]
    fn place_commit_revert_restores_world() {
        let tmp = tempfile::tempdir().unwrap();
        let (plugin, mut world) = setup(&tmp);

        run(
            &Commands::Place {
                x: 0,
                y: 0,
                z: 0,
                block: "Stone".into(),
            },
            &plugin,
            &mut world,
        );
        let reply = run(
            &Commands::Commit {
                message: vec!["first".into(), "block".into()],
            },
            &plugin,
            &mut world,
        );
        assert!(reply[0].ends_with("first block"));

        run(&Commands::Break { x: 0, y: 0, z: 0 }, &plugin, &mut world);
        assert_eq!(world.block_count(), 0);

        run(&Commands::Revert, &plugin, &mut world);
        assert_eq!(world.block_count(), 0);
        assert_eq!(plugin.engine().status().unwrap().commits, 0);
    }

    #[test]
    fn world_file_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(WORLD_FILE);
        let mut world = BlockWorld::new();
        world.put(BlockPos::new(1, 2, 3), "Glass");

        save_world(&path, &world).unwrap();
        let loaded = load_world(&path).unwrap();
        assert_eq!(loaded.block_at(BlockPos::new(1, 2, 3)), "Glass");
        assert!(load_world(&tmp.path().join("missing.json")).unwrap().blocks().is_empty());
    }
}

use std::sync::Arc;

use worldgit_kernel::BlockTarget;
use worldgit_persist::RepoConfig;

use crate::commands::{Command, ParseError};
use crate::engine::{Engine, EngineError};
use crate::tracker::BlockTracker;

/// Host lifecycle adapter: owns the engine for one world and hands out the
/// observer and command entry points.
#[derive(Debug)]
pub struct Plugin {
    engine: Arc<Engine>,
    tracker: BlockTracker,
}

impl Plugin {
    /// Startup hook. Initializes the repository and restores changes stashed
    /// by the previous shutdown.
    pub fn setup(config: &RepoConfig) -> Result<Self, EngineError> {
        tracing::info!(root = %config.root.display(), "setting up worldgit");
        let engine = Arc::new(Engine::open(config)?);
        if let Err(e) = engine.unstash() {
            tracing::warn!(error = %e, "could not restore stashed changes at startup");
        }
        let tracker = BlockTracker::new(Arc::clone(&engine));
        Ok(Self { engine, tracker })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn tracker(&self) -> &BlockTracker {
        &self.tracker
    }

    /// Handle one `git ...` command line from the host.
    pub fn dispatch(&self, line: &str, target: &mut dyn BlockTarget) -> Vec<String> {
        match Command::parse(line) {
            Ok(cmd) => {
                tracing::debug!(?cmd, "dispatching command");
                cmd.execute(&self.engine, target)
            }
            Err(ParseError::Empty) => Command::Help.execute(&self.engine, target),
            Err(e) => vec![e.to_string()],
        }
    }

    /// Shutdown hook. Stashes whatever is pending; failures are logged only.
    pub fn shutdown(self) {
        tracing::info!("shutting down worldgit");
        if let Err(e) = self.engine.shutdown() {
            tracing::warn!(error = %e, "pending changes could not be stashed at shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldgit_common::BlockPos;
    use worldgit_kernel::BlockWorld;

    #[test]
    fn restart_keeps_uncommitted_work() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RepoConfig::at(tmp.path().join(".worldgit"));

        let plugin = Plugin::setup(&config).unwrap();
        plugin.tracker().on_block_placed(BlockPos::new(0, 1, 0), "Cobble");
        plugin.tracker().on_block_placed(BlockPos::new(0, 2, 0), "Cobble");
        plugin.shutdown();

        let plugin = Plugin::setup(&config).unwrap();
        assert_eq!(plugin.engine().buffer().len(), 2);
        assert!(plugin.engine().store().stash_ids().unwrap().is_empty());

        let mut world = BlockWorld::new();
        let reply = plugin.dispatch("commit tower", &mut world);
        assert!(reply[0].starts_with("Committed 2 changes"));
    }

    #[test]
    fn dispatch_reports_parse_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin = Plugin::setup(&RepoConfig::at(tmp.path())).unwrap();
        let mut world = BlockWorld::new();

        assert_eq!(
            plugin.dispatch("merge main", &mut world),
            vec!["unknown subcommand \"merge\", try `git help`"]
        );
        assert_eq!(plugin.dispatch("", &mut world)[0], "Git Command Help:");
    }
}

//! Command surface: the `git` subcommands a host exposes to players.
//!
//! Every command produces human-readable reply lines. Failures become reply
//! lines too; nothing here panics or propagates into the host.

use worldgit_kernel::BlockTarget;
use worldgit_persist::Timestamp;

use crate::engine::{CommitOutcome, Engine, RevertOutcome, StashOutcome};

/// `(usage, description)` for every subcommand.
pub const HELP: &[(&str, &str)] = &[
    ("git status", "Shows the current status of the repository"),
    ("git commit <message>", "Commits the current changes to the repository"),
    ("git revert", "Reverts the world to the previous commit"),
    ("git rollback", "Rolls back the world to the last commit"),
    ("git stash", "Stashes uncommitted changes to disk to free memory"),
    ("git unstash", "Restores stashed changes into the pending buffer"),
    ("git log [count]", "Lists commits from HEAD back to the first one"),
    ("git show <timestamp>", "Prints one commit as JSON"),
    ("git help", "Displays this help information"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Commit { message: String },
    Revert,
    Rollback,
    Stash,
    Unstash,
    Log { limit: Option<usize> },
    Show { timestamp: Timestamp },
    Help,
}

/// Errors from parsing a command line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing subcommand, try `git help`")]
    Empty,
    #[error("unknown subcommand {0:?}, try `git help`")]
    Unknown(String),
    #[error("`git commit` needs a message")]
    MissingMessage,
    #[error("invalid {what}: {value:?}")]
    InvalidNumber { what: &'static str, value: String },
}

impl Command {
    /// Parse the words after `git`. The commit message is the rest of the line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (sub, rest) = line
            .split_once(char::is_whitespace)
            .map(|(s, r)| (s, r.trim()))
            .unwrap_or((line, ""));

        match sub {
            "" => Err(ParseError::Empty),
            "status" => Ok(Self::Status),
            "commit" if rest.is_empty() => Err(ParseError::MissingMessage),
            "commit" => Ok(Self::Commit {
                message: rest.to_string(),
            }),
            "revert" => Ok(Self::Revert),
            "rollback" => Ok(Self::Rollback),
            "stash" => Ok(Self::Stash),
            "unstash" => Ok(Self::Unstash),
            "log" if rest.is_empty() => Ok(Self::Log { limit: None }),
            "log" => Ok(Self::Log {
                limit: Some(parse_number("count", rest)?),
            }),
            "show" => Ok(Self::Show {
                timestamp: parse_number("timestamp", rest)?,
            }),
            "help" => Ok(Self::Help),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }

    /// Run against `engine`, writing replayed blocks into `target`.
    pub fn execute(&self, engine: &Engine, target: &mut dyn BlockTarget) -> Vec<String> {
        match self.run(engine, target) {
            Ok(lines) => lines,
            Err(e) => vec![format!("Error: {e}")],
        }
    }

    fn run(
        &self,
        engine: &Engine,
        target: &mut dyn BlockTarget,
    ) -> Result<Vec<String>, crate::EngineError> {
        let lines = match self {
            Self::Status => {
                let s = engine.status()?;
                let mut lines = vec![
                    "Current Repository Status:".to_string(),
                    format!("{} commits in repository.", s.commits),
                    format!("Changes since last commit: {}", s.pending),
                ];
                if s.stashes > 0 {
                    lines.push(format!("Stash files on disk: {}", s.stashes));
                }
                lines.push(format!("HEAD: {}", s.head));
                lines
            }
            Self::Commit { message } => match engine.commit(message)? {
                CommitOutcome::Committed {
                    timestamp, changes, ..
                } => vec![format!(
                    "Committed {changes} changes as {timestamp}: {message}"
                )],
                CommitOutcome::NothingToCommit => vec!["No changes to commit.".to_string()],
            },
            Self::Revert => match engine.revert_latest(target)? {
                RevertOutcome::Reverted {
                    timestamp,
                    message,
                    changes,
                    head,
                } => vec![
                    format!("Reverted commit {timestamp} ({changes} changes): {message}"),
                    format!("HEAD is now {head}."),
                ],
                RevertOutcome::NothingToRevert => vec!["No commits to revert.".to_string()],
            },
            Self::Rollback => {
                let n = engine.rollback(target)?;
                vec![format!("Rolled back {n} uncommitted changes.")]
            }
            Self::Stash => match engine.stash()? {
                StashOutcome::Stashed { timestamp, changes } => {
                    vec![format!("Stashed {changes} changes as {timestamp}.")]
                }
                StashOutcome::NothingToStash => vec!["No changes to stash.".to_string()],
            },
            Self::Unstash => {
                let r = engine.unstash()?;
                let mut lines = vec![format!(
                    "Restored {} changes from {} stash files.",
                    r.changes, r.files
                )];
                if r.skipped > 0 {
                    lines.push(format!("{} stash files could not be restored.", r.skipped));
                }
                lines
            }
            Self::Log { limit } => {
                let commits = engine.log()?;
                if commits.is_empty() {
                    return Ok(vec!["No commits yet.".to_string()]);
                }
                commits
                    .iter()
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|c| format!("{} ({} changes) {}", c.timestamp, c.changes.len(), c.message))
                    .collect()
            }
            Self::Show { timestamp } => match engine.store().read_commit(*timestamp)? {
                Some(commit) => match serde_json::to_string_pretty(&commit) {
                    Ok(json) => json.lines().map(str::to_string).collect(),
                    Err(e) => vec![format!("Error: {e}")],
                },
                None => vec![format!("No commit {timestamp}.")],
            },
            Self::Help => std::iter::once("Git Command Help:".to_string())
                .chain(HELP.iter().map(|(usage, what)| format!("/{usage} - {what}")))
                .collect(),
        };
        Ok(lines)
    }
}

fn parse_number<T: std::str::FromStr>(what: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        what,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldgit_common::{BlockPos, EMPTY_BLOCK};
    use worldgit_kernel::BlockWorld;
    use worldgit_persist::RepoConfig;

    #[test]
    fn parse_subcommands() {
        assert_eq!(Command::parse("status"), Ok(Command::Status));
        assert_eq!(
            Command::parse("  commit   built the   bridge "),
            Ok(Command::Commit {
                message: "built the   bridge".into()
            })
        );
        assert_eq!(Command::parse("log 3"), Ok(Command::Log { limit: Some(3) }));
        assert_eq!(Command::parse("show 17"), Ok(Command::Show { timestamp: 17 }));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Command::parse(""), Err(ParseError::Empty));
        assert_eq!(Command::parse("commit"), Err(ParseError::MissingMessage));
        assert_eq!(Command::parse("push"), Err(ParseError::Unknown("push".into())));
        assert!(matches!(
            Command::parse("log many"),
            Err(ParseError::InvalidNumber { what: "count", .. })
        ));
    }

    #[test]
    fn session_replies() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::open(&RepoConfig::at(tmp.path())).unwrap();
        let mut world = BlockWorld::new();

        let reply = Command::Commit { message: "x".into() }.execute(&engine, &mut world);
        assert_eq!(reply, vec!["No changes to commit."]);

        engine.record_change(BlockPos::ORIGIN, EMPTY_BLOCK, "Stone");
        let reply = Command::parse("commit first").unwrap().execute(&engine, &mut world);
        assert!(reply[0].starts_with("Committed 1 changes as "));

        let reply = Command::Status.execute(&engine, &mut world);
        assert!(reply.contains(&"1 commits in repository.".to_string()));
        assert!(reply.contains(&"Changes since last commit: 0".to_string()));

        let reply = Command::Log { limit: None }.execute(&engine, &mut world);
        assert_eq!(reply.len(), 1);
        assert!(reply[0].ends_with("(1 changes) first"));

        let reply = Command::Revert.execute(&engine, &mut world);
        assert!(reply[0].starts_with("Reverted commit "));
        assert_eq!(reply[1], "HEAD is now 0.");

        let reply = Command::Revert.execute(&engine, &mut world);
        assert_eq!(reply, vec!["No commits to revert."]);
    }

    #[test]
    fn show_prints_wire_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::open(&RepoConfig::at(tmp.path())).unwrap();
        let mut world = BlockWorld::new();
        engine.record_change(BlockPos::new(3, 4, 5), "Stone", EMPTY_BLOCK);
        engine.commit("dig").unwrap();

        let head = engine.store().head();
        let text = Command::Show { timestamp: head }.execute(&engine, &mut world).join("\n");
        assert!(text.contains("\"parentTimestamp\": 0"));
        assert!(text.contains("\"priorValue\": \"Stone\""));

        let reply = Command::Show { timestamp: 1 }.execute(&engine, &mut world);
        assert_eq!(reply, vec!["No commit 1."]);
    }

    #[test]
    fn errors_become_reply_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::open(&RepoConfig::at(tmp.path())).unwrap();
        let mut world = BlockWorld::new();
        engine.store().set_head(42).unwrap();

        let reply = Command::Log { limit: None }.execute(&engine, &mut world);
        assert_eq!(reply, vec!["Error: HEAD points at missing commit 42"]);
    }

    #[test]
    fn help_lists_every_subcommand() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Engine::open(&RepoConfig::at(tmp.path())).unwrap();
        let reply = Command::Help.execute(&engine, &mut BlockWorld::new());
        assert_eq!(reply.len(), HELP.len() + 1);
        assert!(reply.iter().any(|l| l.starts_with("/git rollback")));
    }
}

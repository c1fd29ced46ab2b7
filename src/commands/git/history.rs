use clap::Parser;
use git2::ResetType;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::commits::{CommitKind, CommitRequest, create_commit};
use crate::domains::git::diff::FileStatus;
use crate::domains::git::repository::{
    current_branch, head_oid, resolve_commit, short_hash, signature,
};
use crate::domains::git::snapshot::WorktreeScope;
use crate::domains::merge::{LocalMergeOutcome, merge_into_head};
use crate::errors::SandboxError;

#[derive(Parser, Debug)]
#[command(
    name = "git commit",
    about = "Record changes to the repository",
    disable_help_flag = true
)]
struct CommitArgs {
    /// Commit message; repeated values become separate paragraphs
    #[arg(short = 'm', long = "message")]
    message: Vec<String>,
    /// Replace the tip of the current branch
    #[arg(long)]
    amend: bool,
    /// Allow a commit whose tree matches its parent
    #[arg(long = "allow-empty")]
    allow_empty: bool,
}

pub struct Commit;

impl Command for Commit {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<CommitArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: CommitArgs = parse_args("git commit", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;

        let message = (!parsed.message.is_empty()).then(|| parsed.message.join("\n\n"));
        let previous = head_oid(&repo)?;

        let sig = signature(state.git())?;
        let outcome = create_commit(
            &repo,
            &sig,
            &CommitRequest {
                message,
                amend: parsed.amend,
                allow_empty: parsed.allow_empty,
            },
        )?;
        if parsed.amend {
            state.update_orig_head(previous);
        }
        state.record_reflog(outcome.oid, outcome.reflog_message());

        let branch = current_branch(&repo)?.unwrap_or_else(|| "detached HEAD".to_string());
        let marker = match outcome.kind {
            CommitKind::Initial => " (root-commit)",
            CommitKind::Normal | CommitKind::Amend => "",
        };
        Ok(format!(
            "[{branch}{marker} {}] {}",
            short_hash(outcome.oid),
            outcome.summary
        ))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git reset",
    about = "Reset current HEAD to the specified state",
    disable_help_flag = true
)]
struct ResetArgs {
    /// Move HEAD only
    #[arg(long, conflicts_with_all = ["mixed", "hard"])]
    soft: bool,
    /// Move HEAD and reset the index (default)
    #[arg(long, conflicts_with = "hard")]
    mixed: bool,
    /// Move HEAD, reset the index and the working tree
    #[arg(long)]
    hard: bool,
    #[arg(default_value = "HEAD")]
    commit: String,
}

impl ResetArgs {
    fn mode(&self) -> ResetType {
        if self.soft {
            ResetType::Soft
        } else if self.hard {
            ResetType::Hard
        } else {
            ResetType::Mixed
        }
    }
}

fn status_code(status: FileStatus) -> char {
    match status {
        FileStatus::Added => 'A',
        FileStatus::Deleted => 'D',
        FileStatus::Modified => 'M',
        FileStatus::Renamed => 'R',
        FileStatus::Typechange => 'T',
    }
}

pub struct Reset;

impl Command for Reset {
    fn name(&self) -> &'static str {
        "reset"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<ResetArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: ResetArgs = parse_args("git reset", args)?;
        let state = session.state_mut()?;
        let handle = state.repo()?.clone();
        let repo = handle.open()?;
        let previous = head_oid(&repo)?;

        if previous.is_none() && parsed.commit == "HEAD" {
            let mut index = repo
                .index()
                .map_err(|e| SandboxError::git("reset", e))?;
            index.clear().map_err(|e| SandboxError::git("reset", e))?;
            index.write().map_err(|e| SandboxError::git("reset", e))?;
            return Ok(String::new());
        }

        let spec = state.expand_revision(&parsed.commit)?;
        let target = resolve_commit(&repo, &spec)?;
        let (target_id, target_summary) = (
            target.id(),
            target.summary().unwrap_or_default().to_string(),
        );
        cx.checkpoint()?;
        repo.reset(target.as_object(), parsed.mode(), None)
            .map_err(|e| SandboxError::git("reset", e))?;
        debug!("Reset {} to {target_id}", handle.root());

        state.update_orig_head(previous);
        state.record_reflog(target_id, format!("reset: moving to {}", parsed.commit));

        match parsed.mode() {
            ResetType::Hard => Ok(format!(
                "HEAD is now at {} {target_summary}",
                short_hash(target_id)
            )),
            ResetType::Mixed => {
                let snapshotter = state.snapshotter(&handle)?;
                let index = snapshotter.index_tree()?;
                // HEAD has already moved, so the report ignores cancellation.
                let worktree =
                    snapshotter.worktree_tree(WorktreeScope::Tracked, &CancellationToken::new())?;
                let unstaged = snapshotter.diff(Some(&index), Some(&worktree))?;
                if unstaged.is_empty() {
                    return Ok(String::new());
                }
                let lines: Vec<String> = unstaged
                    .files
                    .iter()
                    .map(|file| format!("{}\t{}", status_code(file.status), file.path))
                    .collect();
                Ok(format!("Unstaged changes after reset:\n{}", lines.join("\n")))
            }
            ResetType::Soft => Ok(String::new()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git merge",
    about = "Join another branch into the current one",
    disable_help_flag = true
)]
struct MergeArgs {
    /// Message for the merge commit
    #[arg(short = 'm', long = "message")]
    message: Option<String>,
    branch: String,
}

pub struct Merge;

impl Command for Merge {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<MergeArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: MergeArgs = parse_args("git merge", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;
        let spec = state.expand_revision(&parsed.branch)?;
        let theirs = resolve_commit(&repo, &spec)
            .map_err(|_| {
                SandboxError::invalid_input(
                    "",
                    format!("merge: {} - not something we can merge", parsed.branch),
                )
            })?
            .id();

        let previous = head_oid(&repo)?;
        let message = parsed
            .message
            .unwrap_or_else(|| format!("Merge branch '{}'", parsed.branch));
        let sig = signature(state.git())?;
        let outcome = merge_into_head(&repo, theirs, &message, &sig)?;

        state.update_orig_head(previous);
        if let Some(head) = outcome.head() {
            let detail = match &outcome {
                LocalMergeOutcome::FastForward { .. } => "Fast-forward".to_string(),
                _ => outcome.describe(),
            };
            state.record_reflog(head, format!("merge {}: {detail}", parsed.branch));
        }
        Ok(outcome.describe())
    }
}

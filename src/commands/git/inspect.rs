use clap::Parser;
use std::fmt::Write as _;

use super::open_current;
use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::diff::{DiffReport, FileStatus};
use crate::domains::git::history::walk_history;
use crate::domains::git::repository::{current_branch, head_oid, resolve_commit, short_hash};
use crate::domains::git::snapshot::WorktreeScope;
use crate::errors::SandboxError;

fn status_label(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Added => "new file:",
        FileStatus::Deleted => "deleted:",
        FileStatus::Modified => "modified:",
        FileStatus::Renamed => "renamed:",
        FileStatus::Typechange => "typechange:",
    }
}

fn push_section(out: &mut String, title: &str, hint: &str, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}");
    let _ = writeln!(out, "  ({hint})");
    for line in lines {
        let _ = writeln!(out, "\t{line}");
    }
}

fn labelled(report: &DiffReport) -> Vec<String> {
    report
        .files
        .iter()
        .map(|file| format!("{:<12}{}", status_label(file.status), file.path))
        .collect()
}

#[derive(Parser, Debug)]
#[command(
    name = "git status",
    about = "Show the working tree status",
    disable_help_flag = true
)]
struct StatusArgs {}

pub struct Status;

impl Command for Status {
    fn name(&self) -> &'static str {
        "status"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<StatusArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        parse_args::<StatusArgs>("git status", args)?;
        let state = session.state();
        let snapshotter = state.snapshotter(state.repo()?)?;
        let repo = snapshotter.repo();

        let mut out = match current_branch(repo)? {
            Some(branch) => format!("On branch {branch}\n"),
            None => format!(
                "HEAD detached at {}\n",
                head_oid(repo)?.map(short_hash).unwrap_or_default()
            ),
        };

        let head = snapshotter.head_tree()?;
        if head.is_none() {
            out.push_str("\nNo commits yet\n");
        }
        let index = snapshotter.index_tree()?;
        let tracked = snapshotter.worktree_tree(WorktreeScope::Tracked, &cx.cancel)?;
        let everything = snapshotter.worktree_tree(WorktreeScope::All, &cx.cancel)?;

        let staged = snapshotter.diff(head.as_ref(), Some(&index))?;
        let unstaged = snapshotter.diff(Some(&index), Some(&tracked))?;
        let untracked = snapshotter.diff(Some(&tracked), Some(&everything))?;

        push_section(
            &mut out,
            "Changes to be committed:",
            "use \"git rm --cached <file>...\" to unstage",
            labelled(&staged),
        );
        push_section(
            &mut out,
            "Changes not staged for commit:",
            "use \"git add <file>...\" to update what will be committed",
            labelled(&unstaged),
        );
        push_section(
            &mut out,
            "Untracked files:",
            "use \"git add <file>...\" to include in what will be committed",
            untracked.files.iter().map(|f| f.path.clone()).collect(),
        );

        let summary = match (staged.is_empty(), unstaged.is_empty(), untracked.is_empty()) {
            (true, true, true) if head.is_none() => {
                "nothing to commit (create/copy files and use \"git add\" to track)"
            }
            (true, true, true) => "nothing to commit, working tree clean",
            (true, false, _) => {
                "no changes added to commit (use \"git add\" and/or \"git commit -a\")"
            }
            (true, true, false) => {
                "nothing added to commit but untracked files present (use \"git add\" to track)"
            }
            (false, _, _) => "",
        };
        if !summary.is_empty() {
            out.push('\n');
            out.push_str(summary);
        }
        Ok(out.trim_end().to_string())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git diff",
    about = "Show changes between commits, the index and the working tree",
    disable_help_flag = true
)]
struct DiffArgs {
    /// Compare the index with HEAD (or the given commit)
    #[arg(long, visible_alias = "staged")]
    cached: bool,
    /// Print a diffstat instead of the patch
    #[arg(long)]
    stat: bool,
    /// Print only the names of changed files
    #[arg(long = "name-only")]
    name_only: bool,
    #[arg(num_args = 0..=2)]
    revisions: Vec<String>,
}

pub struct Diff;

impl Command for Diff {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<DiffArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: DiffArgs = parse_args("git diff", args)?;
        let state = session.state();
        let snapshotter = state.snapshotter(state.repo()?)?;
        let revisions: Vec<String> = parsed
            .revisions
            .iter()
            .map(|spec| state.expand_revision(spec))
            .collect::<Result<_, _>>()?;

        let report = match (revisions.as_slice(), parsed.cached) {
            ([], false) => {
                let index = snapshotter.index_tree()?;
                let worktree = snapshotter.worktree_tree(WorktreeScope::Tracked, &cx.cancel)?;
                snapshotter.diff(Some(&index), Some(&worktree))?
            }
            ([], true) => {
                let head = snapshotter.head_tree()?;
                let index = snapshotter.index_tree()?;
                snapshotter.diff(head.as_ref(), Some(&index))?
            }
            ([rev], false) => {
                let old = snapshotter.revision_tree(rev)?;
                let worktree = snapshotter.worktree_tree(WorktreeScope::Tracked, &cx.cancel)?;
                snapshotter.diff(Some(&old), Some(&worktree))?
            }
            ([rev], true) => {
                let old = snapshotter.revision_tree(rev)?;
                let index = snapshotter.index_tree()?;
                snapshotter.diff(Some(&old), Some(&index))?
            }
            ([old, new], _) => {
                let old = snapshotter.revision_tree(old)?;
                let new = snapshotter.revision_tree(new)?;
                snapshotter.diff(Some(&old), Some(&new))?
            }
            _ => {
                return Err(SandboxError::invalid_input(
                    "",
                    "usage: git diff [--cached] [<commit> [<commit>]]",
                ));
            }
        };

        let output = if parsed.name_only {
            report.name_only()
        } else if parsed.stat {
            report.stat()
        } else {
            report.patch.clone()
        };
        Ok(output.trim_end().to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "git log", about = "Show commit logs", disable_help_flag = true)]
struct LogArgs {
    /// One line per commit: abbreviated hash and subject
    #[arg(long)]
    oneline: bool,
    /// Limit the number of commits shown
    #[arg(short = 'n', long = "max-count")]
    max_count: Option<usize>,
    revision: Option<String>,
}

pub struct Log;

impl Command for Log {
    fn name(&self) -> &'static str {
        "log"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<LogArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: LogArgs = parse_args("git log", args)?;
        let state = session.state();
        let repo = open_current(state)?;
        let start = parsed
            .revision
            .as_deref()
            .map(|spec| state.expand_revision(spec))
            .transpose()?;
        let entries = walk_history(&repo, start.as_deref(), parsed.max_count)?;

        if parsed.oneline {
            return Ok(entries
                .iter()
                .map(|entry| format!("{} {}", short_hash(entry.oid), entry.summary()))
                .collect::<Vec<_>>()
                .join("\n"));
        }

        let blocks: Vec<String> = entries
            .iter()
            .map(|entry| {
                let body = entry
                    .message
                    .trim_end()
                    .lines()
                    .map(|line| format!("    {line}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "commit {}\nAuthor: {} <{}>\nDate:   {}\n\n{body}",
                    entry.oid,
                    entry.author_name,
                    entry.author_email,
                    entry.time.format("%a %b %-d %H:%M:%S %Y %z")
                )
            })
            .collect();
        Ok(blocks.join("\n\n"))
    }
}

pub struct Reflog;

impl Command for Reflog {
    fn name(&self) -> &'static str {
        "reflog"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        "usage: git reflog\n\nShow the session's HEAD movements, newest first".to_string()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        _args: &[String],
    ) -> Result<String, SandboxError> {
        let state = session.state();
        state.repo()?;
        Ok(state
            .reflog()
            .rev()
            .enumerate()
            .map(|(i, entry)| format!("{} HEAD@{{{i}}}: {}", entry.hash, entry.message))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git rev-parse",
    about = "Resolve revisions to object names",
    disable_help_flag = true
)]
struct RevParseArgs {
    /// Abbreviate object names
    #[arg(long)]
    short: bool,
    /// Print the short branch name a ref points at
    #[arg(long = "abbrev-ref")]
    abbrev_ref: bool,
    /// Print the repository's root directory
    #[arg(long = "show-toplevel")]
    show_toplevel: bool,
    revisions: Vec<String>,
}

pub struct RevParse;

impl Command for RevParse {
    fn name(&self) -> &'static str {
        "rev-parse"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<RevParseArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: RevParseArgs = parse_args("git rev-parse", args)?;
        let state = session.state();
        let handle = state.repo()?;
        let repo = handle.open()?;

        let mut lines = Vec::new();
        if parsed.show_toplevel {
            lines.push(handle.root().to_string());
        }
        for spec in &parsed.revisions {
            if parsed.abbrev_ref && spec == "HEAD" {
                lines.push(current_branch(&repo)?.unwrap_or_else(|| "HEAD".to_string()));
                continue;
            }
            if parsed.abbrev_ref
                && let Ok(reference) = repo.resolve_reference_from_short_name(spec)
            {
                lines.push(reference.shorthand().unwrap_or(spec).to_string());
                continue;
            }
            let oid = resolve_commit(&repo, &state.expand_revision(spec)?)?.id();
            lines.push(if parsed.short {
                short_hash(oid)
            } else {
                oid.to_string()
            });
        }
        Ok(lines.join("\n"))
    }
}

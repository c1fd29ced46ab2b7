use clap::Parser;
use git2::Repository;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::branches::{
    SwitchOutcome, checkout_detached, create_branch, delete_branch, list_branches, switch_branch,
};
use crate::domains::git::repository::{branch_exists, head_commit, head_oid, short_hash};
use crate::domains::sessions::entity::SessionState;
use crate::errors::SandboxError;

/// Appends a reflog entry for a HEAD move, skipped while HEAD is unborn.
fn record_switch(
    state: &mut SessionState,
    repo: &Repository,
    outcome: &SwitchOutcome,
) -> Result<(), SandboxError> {
    if let Some(head) = head_oid(repo)? {
        state.record_reflog(head, outcome.reflog_message());
    }
    Ok(())
}

fn switched_message(outcome: &SwitchOutcome) -> String {
    if outcome.created {
        format!("Switched to a new branch '{}'", outcome.to)
    } else {
        format!("Switched to branch '{}'", outcome.to)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git branch",
    about = "List, create, or delete branches",
    disable_help_flag = true
)]
struct BranchArgs {
    /// List remote-tracking branches too
    #[arg(short = 'a', long = "all")]
    all: bool,
    /// Delete a fully merged branch
    #[arg(short = 'd', long = "delete", conflicts_with = "force_delete")]
    delete: bool,
    /// Delete a branch regardless of its merge status
    #[arg(short = 'D')]
    force_delete: bool,
    name: Option<String>,
    start_point: Option<String>,
}

pub struct Branch;

impl Command for Branch {
    fn name(&self) -> &'static str {
        "branch"
    }

    fn access(&self, args: &[String]) -> AccessMode {
        let listing = args
            .iter()
            .all(|arg| matches!(arg.as_str(), "-a" | "--all"));
        if listing {
            AccessMode::Read
        } else {
            AccessMode::Write
        }
    }

    fn help(&self) -> String {
        render_help::<BranchArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: BranchArgs = parse_args("git branch", args)?;

        if parsed.delete || parsed.force_delete {
            let name = parsed.name.as_deref().ok_or_else(|| {
                SandboxError::invalid_input("", "fatal: branch name required")
            })?;
            let repo = session.state_mut()?.repo()?.open()?;
            let tip = delete_branch(&repo, name, parsed.force_delete)?;
            return Ok(format!("Deleted branch {name} (was {}).", short_hash(tip)));
        }

        if let Some(name) = parsed.name.as_deref() {
            let repo = session.state_mut()?.repo()?.open()?;
            create_branch(&repo, name, parsed.start_point.as_deref())?;
            return Ok(String::new());
        }

        let repo = session.state().repo()?.open()?;
        let lines: Vec<String> = list_branches(&repo, parsed.all)?
            .into_iter()
            .map(|branch| {
                let marker = if branch.is_head { '*' } else { ' ' };
                if branch.is_remote {
                    format!("{marker} remotes/{}", branch.name)
                } else {
                    format!("{marker} {}", branch.name)
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "git switch", about = "Switch branches", disable_help_flag = true)]
struct SwitchArgs {
    /// Create the branch at HEAD before switching to it
    #[arg(short = 'c', long = "create")]
    create: bool,
    branch: String,
}

pub struct Switch;

impl Command for Switch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<SwitchArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: SwitchArgs = parse_args("git switch", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;

        let outcome = switch_branch(&repo, &parsed.branch, parsed.create)?;
        record_switch(state, &repo, &outcome)?;
        Ok(switched_message(&outcome))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git checkout",
    about = "Switch branches or detach HEAD at a commit",
    disable_help_flag = true
)]
struct CheckoutArgs {
    /// Create a new branch and switch to it
    #[arg(short = 'b')]
    new_branch: Option<String>,
    target: Option<String>,
}

pub struct Checkout;

impl Command for Checkout {
    fn name(&self) -> &'static str {
        "checkout"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<CheckoutArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: CheckoutArgs = parse_args("git checkout", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;

        if let Some(name) = parsed.new_branch.as_deref() {
            let outcome = match parsed.target.as_deref() {
                Some(start) => {
                    let start = state.expand_revision(start)?;
                    create_branch(&repo, name, Some(&start))?;
                    let mut outcome = switch_branch(&repo, name, false)?;
                    outcome.created = true;
                    outcome
                }
                None => switch_branch(&repo, name, true)?,
            };
            record_switch(state, &repo, &outcome)?;
            return Ok(switched_message(&outcome));
        }

        let target = parsed.target.ok_or_else(|| {
            SandboxError::invalid_input("", "usage: git checkout [-b <branch>] <branch|commit>")
        })?;

        if branch_exists(&repo, &target) {
            let outcome = switch_branch(&repo, &target, false)?;
            record_switch(state, &repo, &outcome)?;
            return Ok(switched_message(&outcome));
        }

        let spec = state.expand_revision(&target)?;
        if repo.revparse_single(&spec).is_ok() {
            let outcome = checkout_detached(&repo, &spec)?;
            record_switch(state, &repo, &outcome)?;
            let summary = head_commit(&repo)?
                .and_then(|commit| commit.summary().map(str::to_string))
                .unwrap_or_default();
            return Ok(format!("HEAD is now at {} {summary}", outcome.to));
        }

        let outcome = switch_branch(&repo, &target, false).map_err(|_| {
            SandboxError::invalid_input(
                "",
                format!("error: pathspec '{target}' did not match any file(s) known to git"),
            )
        })?;
        record_switch(state, &repo, &outcome)?;
        Ok(switched_message(&outcome))
    }
}

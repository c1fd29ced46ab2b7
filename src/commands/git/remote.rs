use clap::{Parser, Subcommand};
use git2::Repository;
use log::info;
use std::sync::Arc;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::repository::{current_branch, head_oid, signature};
use crate::domains::merge::{LocalMergeOutcome, merge_into_head};
use crate::domains::remotes::registry::SharedRemote;
use crate::domains::remotes::transport::{RefUpdate, fetch_remote, push_branch, set_upstream};
use crate::errors::SandboxError;

const DEFAULT_REMOTE: &str = "origin";

/// Maps a remote configured in a session repository back to the shared
/// remote its URL points at.
fn shared_for(
    cx: &CommandContext,
    repo: &Repository,
    remote_name: &str,
) -> Result<(Arc<SharedRemote>, String), SandboxError> {
    let missing = || {
        SandboxError::invalid_input(
            "",
            format!(
                "fatal: '{remote_name}' does not appear to be a git repository\nfatal: Could not read from remote repository."
            ),
        )
    };
    let remote = repo.find_remote(remote_name).map_err(|_| missing())?;
    let url = remote.url().ok_or_else(missing)?.to_string();
    let shared = cx.remotes.resolve(&url).map_err(|_| missing())?;
    Ok((shared, url))
}

fn current_branch_or_fail(repo: &Repository) -> Result<String, SandboxError> {
    current_branch(repo)?.ok_or_else(|| {
        SandboxError::conflict("fatal: You are not currently on a branch.")
    })
}

fn fetch_lines(updates: &[RefUpdate], remote_name: &str) -> Vec<String> {
    let prefix = format!("refs/remotes/{remote_name}/");
    updates
        .iter()
        .filter_map(|update| {
            let branch = update.reference.strip_prefix(&prefix)?;
            Some(update.describe(branch, &format!("{remote_name}/{branch}")))
        })
        .collect()
}

#[derive(Parser, Debug)]
#[command(
    name = "git remote",
    about = "Manage the set of tracked repositories",
    disable_help_flag = true
)]
struct RemoteArgs {
    /// Show remote URLs after names
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    #[command(subcommand)]
    action: Option<RemoteAction>,
}

#[derive(Subcommand, Debug)]
enum RemoteAction {
    /// Add a remote pointing at a shared repository
    Add { name: String, url: String },
    /// Remove a remote and its remote-tracking branches
    #[command(visible_alias = "rm")]
    Remove { name: String },
}

pub struct Remote;

impl Command for Remote {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn access(&self, args: &[String]) -> AccessMode {
        let mutating = args
            .iter()
            .any(|arg| matches!(arg.as_str(), "add" | "remove" | "rm"));
        if mutating {
            AccessMode::Write
        } else {
            AccessMode::Read
        }
    }

    fn help(&self) -> String {
        render_help::<RemoteArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: RemoteArgs = parse_args("git remote", args)?;
        match parsed.action {
            Some(RemoteAction::Add { name, url }) => {
                let repo = session.state_mut()?.repo()?.open()?;
                if repo.find_remote(&name).is_ok() {
                    return Err(SandboxError::conflict(format!(
                        "error: remote {name} already exists."
                    )));
                }
                let shared = cx.remotes.resolve(&url).map_err(|_| {
                    SandboxError::invalid_input(
                        "",
                        format!("fatal: repository '{url}' does not exist"),
                    )
                })?;
                repo.remote(&name, &shared.url())
                    .map_err(|e| SandboxError::git("remote add", e))?;
                Ok(String::new())
            }
            Some(RemoteAction::Remove { name }) => {
                let repo = session.state_mut()?.repo()?.open()?;
                if repo.find_remote(&name).is_err() {
                    return Err(SandboxError::invalid_input(
                        "",
                        format!("error: No such remote: '{name}'"),
                    ));
                }
                repo.remote_delete(&name)
                    .map_err(|e| SandboxError::git("remote remove", e))?;
                Ok(String::new())
            }
            None => {
                let repo = session.state().repo()?.open()?;
                let names = repo
                    .remotes()
                    .map_err(|e| SandboxError::git("list remotes", e))?;
                let mut lines = Vec::new();
                for name in names.iter().flatten() {
                    if !parsed.verbose {
                        lines.push(name.to_string());
                        continue;
                    }
                    let remote = repo
                        .find_remote(name)
                        .map_err(|e| SandboxError::git("list remotes", e))?;
                    let url = remote.url().unwrap_or_default();
                    lines.push(format!("{name}\t{url} (fetch)"));
                    lines.push(format!("{name}\t{url} (push)"));
                }
                Ok(lines.join("\n"))
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git push",
    about = "Update a shared remote with local commits",
    disable_help_flag = true
)]
struct PushArgs {
    /// Allow non fast-forward updates
    #[arg(short = 'f', long = "force")]
    force: bool,
    /// Record the pushed branch as the upstream of the local one
    #[arg(short = 'u', long = "set-upstream")]
    set_upstream: bool,
    remote: Option<String>,
    branch: Option<String>,
}

pub struct Push;

impl Command for Push {
    fn name(&self) -> &'static str {
        "push"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<PushArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: PushArgs = parse_args("git push", args)?;
        let repo = session.state_mut()?.repo()?.open()?;
        let remote_name = parsed.remote.as_deref().unwrap_or(DEFAULT_REMOTE);
        let branch = match parsed.branch {
            Some(branch) => branch,
            None => current_branch_or_fail(&repo)?,
        };
        let (shared, url) = shared_for(cx, &repo, remote_name)?;
        cx.checkpoint()?;

        let update = push_branch(&repo, &shared, remote_name, &branch, parsed.force)?;
        if parsed.set_upstream {
            set_upstream(&repo, remote_name, &branch)?;
        }
        info!(
            "Session {} pushed {branch} to shared remote '{}'",
            cx.session_id,
            shared.name()
        );

        let mut output = if update.old == Some(update.new) {
            "Everything up-to-date".to_string()
        } else {
            format!("To {url}\n{}", update.describe(&branch, &branch))
        };
        if parsed.set_upstream {
            output.push_str(&format!(
                "\nbranch '{branch}' set up to track '{remote_name}/{branch}'."
            ));
        }
        Ok(output)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git fetch",
    about = "Download refs from a shared remote",
    disable_help_flag = true
)]
struct FetchArgs {
    remote: Option<String>,
}

pub struct Fetch;

impl Command for Fetch {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<FetchArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: FetchArgs = parse_args("git fetch", args)?;
        let repo = session.state_mut()?.repo()?.open()?;
        let remote_name = parsed.remote.as_deref().unwrap_or(DEFAULT_REMOTE);
        let (shared, url) = shared_for(cx, &repo, remote_name)?;
        cx.checkpoint()?;

        let lines = fetch_lines(&fetch_remote(&repo, &shared, remote_name)?, remote_name);
        if lines.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("From {url}\n{}", lines.join("\n")))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git pull",
    about = "Fetch from a shared remote and merge into the current branch",
    disable_help_flag = true
)]
struct PullArgs {
    remote: Option<String>,
    branch: Option<String>,
}

pub struct Pull;

impl Command for Pull {
    fn name(&self) -> &'static str {
        "pull"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<PullArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: PullArgs = parse_args("git pull", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;
        let remote_name = parsed.remote.as_deref().unwrap_or(DEFAULT_REMOTE);
        let branch = match parsed.branch {
            Some(branch) => branch,
            None => current_branch_or_fail(&repo)?,
        };
        let (shared, url) = shared_for(cx, &repo, remote_name)?;
        cx.checkpoint()?;

        let fetched = fetch_lines(&fetch_remote(&repo, &shared, remote_name)?, remote_name);
        let theirs = repo
            .find_reference(&format!("refs/remotes/{remote_name}/{branch}"))
            .ok()
            .and_then(|reference| reference.target())
            .ok_or_else(|| {
                SandboxError::invalid_input("", format!("fatal: couldn't find remote ref {branch}"))
            })?;

        let previous = head_oid(&repo)?;
        let sig = signature(state.git())?;
        let outcome = merge_into_head(
            &repo,
            theirs,
            &format!("Merge branch '{branch}' of {url}"),
            &sig,
        )?;
        state.update_orig_head(previous);
        if let Some(head) = outcome.head() {
            let detail = match &outcome {
                LocalMergeOutcome::FastForward { .. } => "Fast-forward".to_string(),
                _ => outcome.describe(),
            };
            state.record_reflog(head, format!("pull: {detail}"));
        }

        let mut output = String::new();
        if !fetched.is_empty() {
            output.push_str(&format!("From {url}\n{}\n", fetched.join("\n")));
        }
        output.push_str(&outcome.describe());
        Ok(output)
    }
}

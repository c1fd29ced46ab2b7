use clap::Parser;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::staging::{RemoveOptions, StageRequest, remove, stage};
use crate::domains::sessions::entity::SessionState;
use crate::errors::SandboxError;

fn relative_paths(state: &SessionState, inputs: &[String]) -> Result<Vec<String>, SandboxError> {
    inputs
        .iter()
        .map(|input| state.resolve(input).map(|(_, relative)| relative))
        .collect()
}

#[derive(Parser, Debug)]
#[command(
    name = "git add",
    about = "Add file contents to the index",
    disable_help_flag = true
)]
struct AddArgs {
    /// Stage every change in the repository, including deletions
    #[arg(short = 'A', long = "all")]
    all: bool,
    pathspec: Vec<String>,
}

pub struct Add;

impl Command for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<AddArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: AddArgs = parse_args("git add", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;

        let request = if parsed.all && parsed.pathspec.is_empty() {
            StageRequest::All
        } else {
            StageRequest::Paths(relative_paths(state, &parsed.pathspec)?)
        };
        stage(&repo, &request)?;
        Ok(String::new())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git rm",
    about = "Remove files from the working tree and from the index",
    disable_help_flag = true
)]
struct RmArgs {
    /// Only remove from the index, keep the working tree file
    #[arg(long)]
    cached: bool,
    /// Allow recursive removal when a directory is given
    #[arg(short = 'r')]
    recursive: bool,
    #[arg(required = true)]
    pathspec: Vec<String>,
}

pub struct GitRm;

impl Command for GitRm {
    fn name(&self) -> &'static str {
        "git-rm"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<RmArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: RmArgs = parse_args("git rm", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;
        let paths = relative_paths(state, &parsed.pathspec)?;

        let removed = remove(
            &repo,
            &paths,
            RemoveOptions {
                cached: parsed.cached,
                recursive: parsed.recursive,
            },
        )?;
        Ok(removed
            .iter()
            .map(|path| format!("rm '{path}'"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

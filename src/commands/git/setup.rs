use clap::Parser;
use log::info;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::repository::head_oid;
use crate::domains::remotes::transport::clone_remote;
use crate::errors::SandboxError;
use crate::shared::vpath;

#[derive(Parser, Debug)]
#[command(
    name = "git init",
    about = "Create an empty Git repository",
    disable_help_flag = true
)]
struct InitArgs {
    /// Directory to initialize, the current directory when omitted
    directory: Option<String>,
}

pub struct Init;

impl Command for Init {
    fn name(&self) -> &'static str {
        "init"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<InitArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: InitArgs = parse_args("git init", args)?;
        let state = session.state_mut()?;
        let path = state.absolute(parsed.directory.as_deref().unwrap_or("."))?;

        if state.is_repo_root(&path) || state.fs().exists(&vpath::join(&path, ".git")) {
            return Err(SandboxError::RepositoryExists { path });
        }
        let handle = state.init_repo(&path)?;
        Ok(format!(
            "Initialized empty Git repository in {}/",
            vpath::join(handle.root(), ".git")
        ))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git clone",
    about = "Clone a shared remote into a new directory",
    disable_help_flag = true
)]
struct CloneArgs {
    /// Shared remote name or its storage path
    repository: String,
    /// Destination, defaults to the remote's name
    directory: Option<String>,
}

pub struct CloneRepo;

impl Command for CloneRepo {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<CloneArgs>()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: CloneArgs = parse_args("git clone", args)?;
        let shared = cx.remotes.resolve(&parsed.repository).map_err(|_| {
            SandboxError::RemoteNotFound {
                name: parsed.repository.clone(),
            }
        })?;
        let state = session.state_mut()?;
        let directory = parsed
            .directory
            .unwrap_or_else(|| shared.name().to_string());
        let path = state.absolute(&directory)?;

        if state.fs().exists(&path)
            && (!state.fs().is_dir(&path) || !state.fs().list(&path, true)?.is_empty())
        {
            return Err(SandboxError::conflict(format!(
                "fatal: destination path '{directory}' already exists and is not an empty directory."
            )));
        }
        if let Some(parent) = vpath::parent(&path)
            && !state.fs().is_dir(parent)
        {
            return Err(SandboxError::invalid_input(
                "",
                format!("fatal: could not create work tree dir '{directory}': No such file or directory"),
            ));
        }
        cx.checkpoint()?;

        let repo = clone_remote(
            &shared,
            &state.fs().host_path(&path),
            &state.git().default_branch,
        )?;
        let head = head_oid(&repo)?;
        state.attach_repo(&path)?;
        if let Some(head) = head {
            state.record_reflog(head, format!("clone: from {}", shared.name()));
        }
        info!(
            "Session {} cloned '{}' into {path}",
            cx.session_id,
            shared.name()
        );

        let mut output = format!("Cloning into '{directory}'...");
        if head.is_none() {
            output.push_str("\nwarning: You appear to have cloned an empty repository.");
        }
        Ok(output)
    }
}

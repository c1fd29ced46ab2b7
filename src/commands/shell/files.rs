use clap::Parser;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::errors::SandboxError;
use crate::shared::vpath;

#[derive(Parser, Debug)]
#[command(name = "mkdir", about = "Create directories", disable_help_flag = true)]
struct MkdirArgs {
    /// Create missing parents and ignore existing directories
    #[arg(short = 'p', long = "parents")]
    parents: bool,
    #[arg(required = true)]
    paths: Vec<String>,
}

pub struct Mkdir;

impl Command for Mkdir {
    fn name(&self) -> &'static str {
        "mkdir"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<MkdirArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: MkdirArgs = parse_args("mkdir", args)?;
        let state = session.state_mut()?;
        for target in &parsed.paths {
            let path = state.absolute(target)?;
            state
                .fs()
                .create_dir(&path, parsed.parents)
                .map_err(|e| prefixed("mkdir", target, e))?;
        }
        Ok(String::new())
    }
}

#[derive(Parser, Debug)]
#[command(name = "touch", about = "Create empty files", disable_help_flag = true)]
struct TouchArgs {
    #[arg(required = true)]
    paths: Vec<String>,
}

pub struct Touch;

impl Command for Touch {
    fn name(&self) -> &'static str {
        "touch"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<TouchArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: TouchArgs = parse_args("touch", args)?;
        let state = session.state_mut()?;
        for target in &parsed.paths {
            let path = state.absolute(target)?;
            state
                .fs()
                .touch(&path)
                .map_err(|e| prefixed("touch", target, e))?;
        }
        Ok(String::new())
    }
}

#[derive(Parser, Debug)]
#[command(name = "cat", about = "Print file contents", disable_help_flag = true)]
struct CatArgs {
    #[arg(required = true)]
    paths: Vec<String>,
}

pub struct Cat;

impl Command for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<CatArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: CatArgs = parse_args("cat", args)?;
        let state = session.state();
        let mut output = String::new();
        for target in &parsed.paths {
            let path = state.absolute(target)?;
            let content = state
                .fs()
                .read(&path)
                .map_err(|e| prefixed("cat", target, e))?;
            output.push_str(&content);
        }
        Ok(output)
    }
}

/// Prints its arguments. Paired with `>`/`>>` it is the way to write files.
pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        "Usage: echo [text]...\n\nPrint the arguments separated by spaces".to_string()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        _session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        Ok(args.join(" "))
    }
}

#[derive(Parser, Debug)]
#[command(name = "rm", about = "Remove files or directories", disable_help_flag = true)]
struct RmArgs {
    /// Remove directories and their contents
    #[arg(short = 'r', short_alias = 'R', long = "recursive")]
    recursive: bool,
    /// Ignore missing files
    #[arg(short = 'f', long = "force")]
    force: bool,
    #[arg(required = true)]
    paths: Vec<String>,
}

pub struct Rm;

impl Command for Rm {
    fn name(&self) -> &'static str {
        "rm"
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
        let parsed: RmArgs = parse_args("rm", args)?;
        let state = session.state_mut()?;

        for target in &parsed.paths {
            let path = state.absolute(target)?;
            if vpath::strip_root(&path, state.current_dir()).is_some() {
                return Err(SandboxError::invalid_input(
                    "",
                    format!("rm: refusing to remove '{target}': current directory is inside it"),
                ));
            }
            if !state.fs().exists(&path) {
                if parsed.force {
                    continue;
                }
                return Err(SandboxError::invalid_input(
                    "",
                    format!("rm: cannot remove '{target}': No such file or directory"),
                ));
            }
            let is_dir = state.fs().is_dir(&path);
            state
                .fs()
                .remove(&path, parsed.recursive)
                .map_err(|e| prefixed("rm", target, e))?;

            if is_dir {
                state.forget_repos_under(&path);
                // Deleting `<repo>/.git` leaves a plain directory behind.
                if vpath::file_name(&path) == Some(".git")
                    && let Some(parent) = vpath::parent(&path)
                    && state.is_repo_root(parent)
                {
                    state.forget_repos_under(parent);
                }
            }
        }
        Ok(String::new())
    }
}

/// Rewrites filesystem errors in the `cmd: path: reason` shape.
fn prefixed(command: &str, target: &str, err: SandboxError) -> SandboxError {
    match err {
        SandboxError::InvalidInput { message, .. } => {
            let reason = message
                .rsplit_once(": ")
                .map(|(_, reason)| reason.to_string())
                .unwrap_or(message);
            SandboxError::invalid_input("", format!("{command}: {target}: {reason}"))
        }
        other => other,
    }
}

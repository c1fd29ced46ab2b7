use clap::Parser;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::errors::SandboxError;
use crate::shared::vpath;

#[derive(Parser, Debug)]
#[command(name = "pwd", about = "Print the current directory", disable_help_flag = true)]
struct PwdArgs {}

pub struct Pwd;

impl Command for Pwd {
    fn name(&self) -> &'static str {
        "pwd"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<PwdArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        parse_args::<PwdArgs>("pwd", args)?;
        Ok(session.state().current_dir().to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "cd", about = "Change the current directory", disable_help_flag = true)]
struct CdArgs {
    /// Target directory, `/` when omitted
    dir: Option<String>,
}

pub struct Cd;

impl Command for Cd {
    fn name(&self) -> &'static str {
        "cd"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<CdArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: CdArgs = parse_args("cd", args)?;
        let target = parsed.dir.unwrap_or_else(|| vpath::ROOT.to_string());
        session.state_mut()?.change_dir(&target)?;
        Ok(String::new())
    }
}

#[derive(Parser, Debug)]
#[command(name = "ls", about = "List directory contents", disable_help_flag = true)]
struct LsArgs {
    /// Include entries starting with `.`
    #[arg(short = 'a', long = "all")]
    all: bool,
    paths: Vec<String>,
}

pub struct Ls;

impl Command for Ls {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        render_help::<LsArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: LsArgs = parse_args("ls", args)?;
        let state = session.state();
        let targets = if parsed.paths.is_empty() {
            vec![".".to_string()]
        } else {
            parsed.paths
        };

        let mut sections = Vec::with_capacity(targets.len());
        for target in &targets {
            let path = state.absolute(target)?;
            let entries = state
                .fs()
                .list(&path, parsed.all)
                .map_err(|_| {
                    SandboxError::invalid_input(
                        "",
                        format!("ls: cannot access '{target}': No such file or directory"),
                    )
                })?;
            let listing = entries
                .into_iter()
                .map(|entry| {
                    if entry.is_dir {
                        format!("{}/", entry.name)
                    } else {
                        entry.name
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            if targets.len() > 1 {
                sections.push(format!("{target}:\n{listing}"));
            } else {
                sections.push(listing);
            }
        }
        Ok(sections.join("\n\n"))
    }
}

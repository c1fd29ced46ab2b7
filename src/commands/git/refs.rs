use clap::Parser;

use crate::commands::{
    AccessMode, Command, CommandContext, SessionAccess, parse_args, render_help,
};
use crate::domains::git::refs::{
    delete_ref, qualify_ref, read_symbolic_ref, update_ref, write_symbolic_ref,
};
use crate::domains::git::repository::current_branch;
use crate::errors::SandboxError;

#[derive(Parser, Debug)]
#[command(
    name = "git update-ref",
    about = "Update the object name stored in a ref",
    disable_help_flag = true
)]
struct UpdateRefArgs {
    /// Delete the ref instead of updating it
    #[arg(short = 'd')]
    delete: bool,
    reference: String,
    new_value: Option<String>,
}

pub struct UpdateRef;

impl Command for UpdateRef {
    fn name(&self) -> &'static str {
        "update-ref"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Write
    }

    fn help(&self) -> String {
        render_help::<UpdateRefArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: UpdateRefArgs = parse_args("git update-ref", args)?;
        let state = session.state_mut()?;
        let repo = state.repo()?.open()?;

        if parsed.delete {
            delete_ref(&repo, &parsed.reference)?;
            return Ok(String::new());
        }

        let value = parsed.new_value.as_deref().ok_or_else(|| {
            SandboxError::invalid_input("", "usage: git update-ref [-d] <ref> [<newvalue>]")
        })?;
        let value = state.expand_revision(value)?;
        let qualified = qualify_ref(&parsed.reference);
        let moves_head = qualified == "HEAD"
            || current_branch(&repo)?
                .is_some_and(|branch| qualified == format!("refs/heads/{branch}"));

        let oid = update_ref(&repo, &parsed.reference, &value)?;
        if moves_head {
            state.record_reflog(oid, "update-ref");
        }
        Ok(String::new())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "git symbolic-ref",
    about = "Read or modify a symbolic ref",
    disable_help_flag = true
)]
struct SymbolicRefArgs {
    /// Shorten the printed target
    #[arg(long)]
    short: bool,
    name: String,
    target: Option<String>,
}

pub struct SymbolicRef;

impl Command for SymbolicRef {
    fn name(&self) -> &'static str {
        "symbolic-ref"
    }

    fn access(&self, args: &[String]) -> AccessMode {
        let positional = args.iter().filter(|arg| !arg.starts_with('-')).count();
        if positional >= 2 {
            AccessMode::Write
        } else {
            AccessMode::Read
        }
    }

    fn help(&self) -> String {
        render_help::<SymbolicRefArgs>()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let parsed: SymbolicRefArgs = parse_args("git symbolic-ref", args)?;
        match parsed.target.as_deref() {
            Some(target) => {
                let repo = session.state_mut()?.repo()?.open()?;
                write_symbolic_ref(&repo, &parsed.name, target)?;
                Ok(String::new())
            }
            None => {
                let repo = session.state().repo()?.open()?;
                read_symbolic_ref(&repo, &parsed.name, parsed.short)
            }
        }
    }
}

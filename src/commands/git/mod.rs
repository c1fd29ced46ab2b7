//! Git porcelain. Each command is registered under its bare name; `git rm`
//! is `git-rm` so it does not shadow the shell `rm`.

pub mod branching;
pub mod history;
pub mod inspect;
pub mod refs;
pub mod remote;
pub mod setup;
pub mod staging;

use git2::Repository;

use super::{AccessMode, Command, CommandContext, CommandRegistryBuilder, SessionAccess};
use crate::domains::sessions::entity::SessionState;
use crate::errors::SandboxError;

pub const GIT_VERSION: &str = "git version 2.47.1 (GitGym)";

pub fn register(builder: &mut CommandRegistryBuilder) -> Result<(), SandboxError> {
    let table: [(&str, fn() -> Box<dyn Command>); 22] = [
        ("init", || Box::new(setup::Init)),
        ("clone", || Box::new(setup::CloneRepo)),
        ("add", || Box::new(staging::Add)),
        ("git-rm", || Box::new(staging::GitRm)),
        ("status", || Box::new(inspect::Status)),
        ("diff", || Box::new(inspect::Diff)),
        ("log", || Box::new(inspect::Log)),
        ("reflog", || Box::new(inspect::Reflog)),
        ("rev-parse", || Box::new(inspect::RevParse)),
        ("commit", || Box::new(history::Commit)),
        ("reset", || Box::new(history::Reset)),
        ("merge", || Box::new(history::Merge)),
        ("branch", || Box::new(branching::Branch)),
        ("switch", || Box::new(branching::Switch)),
        ("checkout", || Box::new(branching::Checkout)),
        ("update-ref", || Box::new(refs::UpdateRef)),
        ("symbolic-ref", || Box::new(refs::SymbolicRef)),
        ("remote", || Box::new(remote::Remote)),
        ("push", || Box::new(remote::Push)),
        ("fetch", || Box::new(remote::Fetch)),
        ("pull", || Box::new(remote::Pull)),
        ("version", || Box::new(Version)),
    ];
    for (name, constructor) in table {
        builder.register(name, constructor)?;
    }
    Ok(())
}

/// Opens the repository enclosing the current directory.
pub(crate) fn open_current(state: &SessionState) -> Result<Repository, SandboxError> {
    state.repo()?.open()
}

pub struct Version;

impl Command for Version {
    fn name(&self) -> &'static str {
        "version"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        "usage: git version\n\nPrint the version of the git emulation".to_string()
    }

    fn execute(
        &self,
        _cx: &CommandContext,
        _session: &mut SessionAccess<'_>,
        _args: &[String],
    ) -> Result<String, SandboxError> {
        Ok(GIT_VERSION.to_string())
    }
}

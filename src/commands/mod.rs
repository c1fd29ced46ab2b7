//! Command protocol shared by every shell and git command.
//!
//! A command declares the session access it needs for a given argument list;
//! the dispatcher acquires the matching lock, runs the command on a blocking
//! worker and releases the lock when the guard drops, on every exit path.

pub mod dispatcher;
pub mod git;
pub mod registry;
pub mod shell;
pub mod tokenizer;

use clap::{CommandFactory, Parser};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domains::remotes::RemoteRegistry;
use crate::domains::sessions::entity::SessionState;
use crate::errors::SandboxError;

pub use dispatcher::CommandDispatcher;
pub use registry::{CommandConstructor, CommandRegistry, CommandRegistryBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Per-invocation context handed to a command.
#[derive(Clone)]
pub struct CommandContext {
    pub session_id: String,
    pub cancel: CancellationToken,
    pub remotes: Arc<RemoteRegistry>,
    pub registry: Arc<CommandRegistry>,
}

impl CommandContext {
    /// Fails with [`SandboxError::Cancelled`] once the caller went away.
    pub fn checkpoint(&self) -> Result<(), SandboxError> {
        if self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        Ok(())
    }
}

/// The session state as granted by the dispatcher.
pub enum SessionAccess<'a> {
    Shared(&'a SessionState),
    Exclusive(&'a mut SessionState),
}

impl SessionAccess<'_> {
    pub fn state(&self) -> &SessionState {
        match self {
            SessionAccess::Shared(state) => state,
            SessionAccess::Exclusive(state) => state,
        }
    }

    pub fn state_mut(&mut self) -> Result<&mut SessionState, SandboxError> {
        match self {
            SessionAccess::Shared(_) => Err(SandboxError::conflict(
                "command requires exclusive session access",
            )),
            SessionAccess::Exclusive(state) => Ok(state),
        }
    }
}

pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lock the dispatcher must hold while running with `args`.
    fn access(&self, args: &[String]) -> AccessMode;

    fn help(&self) -> String;

    fn execute(
        &self,
        cx: &CommandContext,
        session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError>;
}

/// Parses `args` with a clap definition, turning usage errors into user
/// input errors.
pub(crate) fn parse_args<T: Parser>(program: &str, args: &[String]) -> Result<T, SandboxError> {
    T::try_parse_from(std::iter::once(program.to_string()).chain(args.iter().cloned()))
        .map_err(|e| SandboxError::invalid_input("", e.to_string().trim_end()))
}

pub(crate) fn render_help<T: CommandFactory>() -> String {
    T::command().render_help().to_string().trim_end().to_string()
}

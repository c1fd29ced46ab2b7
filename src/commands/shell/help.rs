use crate::commands::{AccessMode, Command, CommandContext, SessionAccess};
use crate::errors::SandboxError;

pub struct Help;

impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn access(&self, _args: &[String]) -> AccessMode {
        AccessMode::Read
    }

    fn help(&self) -> String {
        "Usage: help [command]\n\nList available commands or show help for one".to_string()
    }

    fn execute(
        &self,
        cx: &CommandContext,
        _session: &mut SessionAccess<'_>,
        args: &[String],
    ) -> Result<String, SandboxError> {
        let registry = &cx.registry;
        match args {
            [] => Ok(format!(
                "Available commands:\n{}",
                registry
                    .names()
                    .map(|name| format!("  {name}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
            [topic] if topic == "git" => Ok(
                "usage: git <command> [<args>]\n\nRun 'help <command>' for details on a specific command."
                    .to_string(),
            ),
            [topic, ..] => {
                let command = registry
                    .lookup(topic)
                    .or_else(|_| registry.lookup(&format!("git-{topic}")))?;
                Ok(command.help())
            }
        }
    }
}

use std::collections::BTreeMap;

use super::{Command, git, shell};
use crate::errors::SandboxError;

pub type CommandConstructor = fn() -> Box<dyn Command>;

/// Collects registrations during startup. Duplicate names are rejected.
#[derive(Default)]
pub struct CommandRegistryBuilder {
    constructors: BTreeMap<String, CommandConstructor>,
}

impl CommandRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        constructor: CommandConstructor,
    ) -> Result<&mut Self, SandboxError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(SandboxError::invalid_input(
                "command",
                format!("invalid command name '{name}'"),
            ));
        }
        if self.constructors.contains_key(name) {
            return Err(SandboxError::conflict(format!(
                "command '{name}' is already registered"
            )));
        }
        self.constructors.insert(name.to_string(), constructor);
        Ok(self)
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            constructors: self.constructors,
        }
    }
}

/// Immutable name to constructor table. Safe to share across threads
/// without synchronization once built.
pub struct CommandRegistry {
    constructors: BTreeMap<String, CommandConstructor>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::new()
    }

    /// Every built-in shell and git command.
    pub fn standard() -> Result<Self, SandboxError> {
        let mut builder = Self::builder();
        shell::register(&mut builder)?;
        git::register(&mut builder)?;
        Ok(builder.build())
    }

    pub fn lookup(&self, name: &str) -> Result<Box<dyn Command>, SandboxError> {
        self.constructors
            .get(name)
            .map(|construct| construct())
            .ok_or_else(|| SandboxError::UnknownCommand {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

use log::{debug, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::tokenizer::{Token, tokenize};
use super::{AccessMode, Command, CommandContext, CommandRegistry, SessionAccess};
use crate::domains::remotes::RemoteRegistry;
use crate::domains::sessions::entity::{Session, SessionState};
use crate::errors::{ErrorKind, SandboxError};
use crate::shared::blocking::run_blocking;

const GIT_PREFIX: &str = "git";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    target: String,
    append: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ParsedLine {
    words: Vec<String>,
    redirect: Option<Redirect>,
}

fn parse_line(line: &str) -> Result<ParsedLine, SandboxError> {
    let mut parsed = ParsedLine::default();
    let mut tokens = tokenize(line)?.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => parsed.words.push(word),
            Token::RedirectTruncate | Token::RedirectAppend => {
                let append = token == Token::RedirectAppend;
                let Some(Token::Word(target)) = tokens.next() else {
                    return Err(SandboxError::invalid_input(
                        "",
                        "syntax error near unexpected token `newline'",
                    ));
                };
                parsed.redirect = Some(Redirect { target, append });
            }
        }
    }
    Ok(parsed)
}

fn is_help_flag(arg: Option<&String>) -> bool {
    matches!(arg.map(String::as_str), Some("-h") | Some("--help"))
}

/// Tokenizes command lines, resolves them through the registry and runs
/// them under the session lock the command asks for.
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
    remotes: Arc<RemoteRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>, remotes: Arc<RemoteRegistry>) -> Self {
        Self { registry, remotes }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// `git <sub>` looks up `git-<sub>` first so git and shell commands with
    /// the same name can coexist.
    fn resolve(&self, words: &[String]) -> Result<(Box<dyn Command>, Vec<String>), SandboxError> {
        let head = words[0].as_str();
        if head != GIT_PREFIX {
            return Ok((self.registry.lookup(head)?, words[1..].to_vec()));
        }
        let Some(sub) = words.get(1).filter(|sub| !is_help_flag(Some(*sub))) else {
            return Ok((self.registry.lookup("help")?, vec![GIT_PREFIX.to_string()]));
        };
        let prefixed = format!("{GIT_PREFIX}-{sub}");
        let command = if self.registry.contains(&prefixed) {
            self.registry.lookup(&prefixed)?
        } else {
            self.registry.lookup(sub).map_err(|_| SandboxError::UnknownCommand {
                name: format!("{GIT_PREFIX} {sub}"),
            })?
        };
        Ok((command, words[2..].to_vec()))
    }

    pub async fn dispatch(
        &self,
        session: &Session,
        line: &str,
        cancel: CancellationToken,
    ) -> Result<String, SandboxError> {
        let parsed = parse_line(line)?;
        if parsed.words.is_empty() {
            return Ok(String::new());
        }
        let (command, args) = self.resolve(&parsed.words)?;
        if is_help_flag(args.first()) {
            return Ok(command.help());
        }

        session.touch();
        let mode = match parsed.redirect {
            Some(_) => AccessMode::Write,
            None => command.access(&args),
        };
        debug!(
            "Dispatching '{}' in session {} ({mode:?})",
            command.name(),
            session.id()
        );

        let cx = CommandContext {
            session_id: session.id().to_string(),
            cancel: cancel.clone(),
            remotes: Arc::clone(&self.remotes),
            registry: Arc::clone(&self.registry),
        };
        let name = command.name();

        let result = match mode {
            AccessMode::Read => {
                let guard = tokio::select! {
                    _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                    guard = session.read_owned() => guard,
                };
                run_blocking(name, move || {
                    let mut access = SessionAccess::Shared(&*guard);
                    command.execute(&cx, &mut access, &args)
                })
                .await
            }
            AccessMode::Write => {
                let mut guard = tokio::select! {
                    _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                    guard = session.write_owned() => guard,
                };
                let redirect = parsed.redirect;
                run_blocking(name, move || {
                    let output = {
                        let mut access = SessionAccess::Exclusive(&mut *guard);
                        command.execute(&cx, &mut access, &args)?
                    };
                    match redirect {
                        Some(redirect) => {
                            write_redirect(&*guard, &redirect, &output)?;
                            Ok(String::new())
                        }
                        None => Ok(output),
                    }
                })
                .await
            }
        };

        if let Err(err) = &result
            && err.kind() == ErrorKind::Library
        {
            warn!("Command '{name}' failed in session {}: {err}", session.id());
        }
        result
    }
}

fn write_redirect(state: &SessionState, redirect: &Redirect, output: &str) -> Result<(), SandboxError> {
    let path = state.absolute(&redirect.target)?;
    let mut content = output.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    if redirect.append {
        state.fs().append(&path, content.as_bytes())
    } else {
        state.fs().write(&path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_extracts_redirect_target() {
        let parsed = parse_line("echo hello >> notes.txt").unwrap();
        assert_eq!(parsed.words, vec!["echo", "hello"]);
        assert_eq!(
            parsed.redirect,
            Some(Redirect {
                target: "notes.txt".into(),
                append: true
            })
        );
    }

    #[test]
    fn dangling_redirect_is_a_syntax_error() {
        assert!(parse_line("echo hi >").is_err());
        assert!(parse_line("echo hi > >").is_err());
    }

    #[test]
    fn help_flag_detection() {
        assert!(is_help_flag(Some(&"-h".to_string())));
        assert!(is_help_flag(Some(&"--help".to_string())));
        assert!(!is_help_flag(Some(&"-m".to_string())));
        assert!(!is_help_flag(None));
    }
}

use serde::Serialize;
use std::fmt;

/// Coarse classification used by callers that need to map failures onto a
/// transport status (HTTP status code, exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserInput,
    NotFound,
    StateConflict,
    Library,
    Cancelled,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data")]
pub enum SandboxError {
    UnknownCommand {
        name: String,
    },
    SessionNotFound {
        session_id: String,
    },
    SessionAlreadyExists {
        session_id: String,
    },
    InvalidRemoteName {
        name: String,
        reason: String,
    },
    RemoteNotFound {
        name: String,
    },
    RemoteAlreadyExists {
        name: String,
    },
    PullRequestNotFound {
        id: u64,
    },
    PullRequestNotOpen {
        id: u64,
        state: String,
    },
    RemoteMismatch {
        id: u64,
        expected: String,
        actual: String,
    },
    NotARepository {
        path: String,
    },
    RepositoryExists {
        path: String,
    },
    InvalidInput {
        field: String,
        message: String,
    },
    StateConflict {
        message: String,
    },
    MergeConflict {
        files: Vec<String>,
        message: String,
    },
    GitOperationFailed {
        operation: String,
        message: String,
    },
    IoError {
        operation: String,
        path: String,
        message: String,
    },
    Cancelled,
}

impl SandboxError {
    pub fn git(operation: &str, error: impl ToString) -> Self {
        SandboxError::GitOperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn io(operation: &str, path: impl ToString, error: impl ToString) -> Self {
        SandboxError::IoError {
            operation: operation.to_string(),
            path: path.to_string(),
            message: error.to_string(),
        }
    }

    pub fn invalid_input(field: &str, message: impl ToString) -> Self {
        SandboxError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn conflict(message: impl ToString) -> Self {
        SandboxError::StateConflict {
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCommand { .. }
            | Self::InvalidRemoteName { .. }
            | Self::InvalidInput { .. } => ErrorKind::UserInput,
            Self::SessionNotFound { .. }
            | Self::RemoteNotFound { .. }
            | Self::PullRequestNotFound { .. }
            | Self::NotARepository { .. } => ErrorKind::NotFound,
            Self::SessionAlreadyExists { .. }
            | Self::RemoteAlreadyExists { .. }
            | Self::PullRequestNotOpen { .. }
            | Self::RemoteMismatch { .. }
            | Self::RepositoryExists { .. }
            | Self::StateConflict { .. }
            | Self::MergeConflict { .. } => ErrorKind::StateConflict,
            Self::GitOperationFailed { .. } | Self::IoError { .. } => ErrorKind::Library,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownCommand { name } => {
                write!(f, "unknown command: {name}")
            }
            Self::SessionNotFound { session_id } => {
                write!(f, "Session '{session_id}' not found")
            }
            Self::SessionAlreadyExists { session_id } => {
                write!(f, "Session '{session_id}' already exists")
            }
            Self::InvalidRemoteName { name, reason } => {
                write!(f, "invalid repository name '{name}': {reason}")
            }
            Self::RemoteNotFound { name } => {
                write!(f, "remote repository '{name}' not found")
            }
            Self::RemoteAlreadyExists { name } => {
                write!(f, "remote repository '{name}' already exists")
            }
            Self::PullRequestNotFound { id } => {
                write!(f, "pull request #{id} not found")
            }
            Self::PullRequestNotOpen { id, state } => {
                write!(f, "pull request #{id} is not open (state: {state})")
            }
            Self::RemoteMismatch {
                id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "pull request #{id} belongs to remote '{expected}', not '{actual}'"
                )
            }
            Self::NotARepository { .. } => {
                write!(
                    f,
                    "fatal: not a git repository (or any of the parent directories): .git"
                )
            }
            Self::RepositoryExists { path } => {
                write!(f, "repository already exists at {path}")
            }
            Self::InvalidInput { field, message } => {
                if field.is_empty() {
                    write!(f, "{message}")
                } else {
                    write!(f, "{field}: {message}")
                }
            }
            Self::StateConflict { message } => write!(f, "{message}"),
            Self::MergeConflict { files, message } => {
                write!(f, "{message}")?;
                for file in files {
                    write!(f, "\nCONFLICT (content): Merge conflict in {file}")?;
                }
                Ok(())
            }
            Self::GitOperationFailed { operation, message } => {
                write!(f, "Git operation '{operation}' failed: {message}")
            }
            Self::IoError {
                operation,
                path,
                message,
            } => {
                write!(f, "I/O error during '{operation}' on '{path}': {message}")
            }
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for SandboxError {}

impl From<SandboxError> for String {
    fn from(error: SandboxError) -> Self {
        error.to_string()
    }
}

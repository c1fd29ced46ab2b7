use git2::{
    Commit, ErrorCode, Oid, Repository, RepositoryInitOptions, Signature,
};
use std::path::{Path, PathBuf};

use crate::domains::settings::GitSettings;
use crate::errors::SandboxError;

pub const SHORT_HASH_LEN: usize = 7;

/// A repository living inside a session filesystem.
///
/// The handle only records where the repository is; every operation opens a
/// fresh [`Repository`] so handles stay `Send + Sync` and can sit inside the
/// session state shared between worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    root: String,
    workdir: PathBuf,
}

impl RepoHandle {
    pub fn init(root: &str, workdir: &Path, default_branch: &str) -> Result<Self, SandboxError> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(default_branch).mkpath(true);
        Repository::init_opts(workdir, &opts).map_err(|e| SandboxError::git("init", e))?;
        Ok(Self::attach(root, workdir))
    }

    /// Wraps a repository that already exists on disk (a fresh clone).
    pub fn attach(root: &str, workdir: &Path) -> Self {
        Self {
            root: root.to_string(),
            workdir: workdir.to_path_buf(),
        }
    }

    /// Virtual path of the repository root.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn open(&self) -> Result<Repository, SandboxError> {
        Repository::open(&self.workdir).map_err(|e| SandboxError::git("open repository", e))
    }
}

pub fn signature(settings: &GitSettings) -> Result<Signature<'static>, SandboxError> {
    Signature::now(&settings.author_name, &settings.author_email)
        .map_err(|e| SandboxError::git("signature", e))
}

pub fn short_hash(oid: Oid) -> String {
    let full = oid.to_string();
    full[..SHORT_HASH_LEN.min(full.len())].to_string()
}

pub fn normalize_branch_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

/// Commit HEAD points at, or `None` on an unborn branch.
pub fn head_oid(repo: &Repository) -> Result<Option<Oid>, SandboxError> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(SandboxError::git("read HEAD", e)),
    }
}

pub fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, SandboxError> {
    match head_oid(repo)? {
        Some(oid) => repo
            .find_commit(oid)
            .map(Some)
            .map_err(|e| SandboxError::git("read HEAD commit", e)),
        None => Ok(None),
    }
}

/// Short name of the branch HEAD points at, even when it has no commits yet.
/// `None` means HEAD is detached.
pub fn current_branch(repo: &Repository) -> Result<Option<String>, SandboxError> {
    let head = repo
        .find_reference("HEAD")
        .map_err(|e| SandboxError::git("read HEAD", e))?;
    Ok(head
        .symbolic_target()
        .map(|target| target.strip_prefix("refs/heads/").unwrap_or(target).to_string()))
}

/// Moves the branch HEAD points at (or HEAD itself when detached) to `oid`.
pub fn advance_head(repo: &Repository, oid: Oid, log_message: &str) -> Result<(), SandboxError> {
    let head = repo
        .find_reference("HEAD")
        .map_err(|e| SandboxError::git("read HEAD", e))?;
    match head.symbolic_target() {
        Some(target) => {
            repo.reference(target, oid, true, log_message)
                .map_err(|e| SandboxError::git("update branch", e))?;
        }
        None => {
            repo.set_head_detached(oid)
                .map_err(|e| SandboxError::git("update HEAD", e))?;
        }
    }
    Ok(())
}

pub fn resolve_commit<'r>(repo: &'r Repository, spec: &str) -> Result<Commit<'r>, SandboxError> {
    repo.revparse_single(spec)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| {
            SandboxError::invalid_input(
                "",
                format!(
                    "fatal: ambiguous argument '{spec}': unknown revision or path not in the working tree."
                ),
            )
        })
}

pub fn branch_exists(repo: &Repository, branch: &str) -> bool {
    repo.find_reference(&normalize_branch_ref(branch)).is_ok()
}

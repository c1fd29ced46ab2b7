use chrono::{DateTime, Utc};
use git2::Oid;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{
    OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use super::filesystem::SessionFs;
use crate::domains::git::repository::{RepoHandle, short_hash};
use crate::domains::git::snapshot::TreeSnapshotter;
use crate::domains::settings::GitSettings;
use crate::errors::SandboxError;
use crate::shared::vpath;

pub const ORIG_HEAD: &str = "ORIG_HEAD";

/// Per-session knobs copied out of the process settings at creation time.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    pub git: GitSettings,
    pub reflog_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflogEntry {
    pub hash: String,
    pub message: String,
}

/// Everything a command may touch. Lives behind the session's lock.
#[derive(Debug)]
pub struct SessionState {
    fs: SessionFs,
    repos: BTreeMap<String, RepoHandle>,
    current_dir: String,
    reflog: VecDeque<ReflogEntry>,
    orig_head: Option<Oid>,
    profile: SessionProfile,
}

impl SessionState {
    pub fn new(fs: SessionFs, profile: SessionProfile) -> Self {
        Self {
            fs,
            repos: BTreeMap::new(),
            current_dir: vpath::ROOT.to_string(),
            reflog: VecDeque::new(),
            orig_head: None,
            profile,
        }
    }

    pub fn fs(&self) -> &SessionFs {
        &self.fs
    }

    pub fn git(&self) -> &GitSettings {
        &self.profile.git
    }

    pub fn current_dir(&self) -> &str {
        &self.current_dir
    }

    /// Resolves `input` against the current directory.
    pub fn absolute(&self, input: &str) -> Result<String, SandboxError> {
        vpath::normalize(&self.current_dir, input)
    }

    pub fn change_dir(&mut self, input: &str) -> Result<&str, SandboxError> {
        let target = self.absolute(input)?;
        if !self.fs.is_dir(&target) {
            let reason = if self.fs.exists(&target) {
                "Not a directory"
            } else {
                "No such file or directory"
            };
            return Err(SandboxError::invalid_input("", format!("cd: {input}: {reason}")));
        }
        self.current_dir = target;
        Ok(&self.current_dir)
    }

    pub fn repos(&self) -> impl Iterator<Item = &RepoHandle> {
        self.repos.values()
    }

    pub fn is_repo_root(&self, path: &str) -> bool {
        self.repos.contains_key(path)
    }

    /// Creates a repository rooted at `path` (an absolute virtual path).
    pub fn init_repo(&mut self, path: &str) -> Result<&RepoHandle, SandboxError> {
        if self.repos.contains_key(path) {
            return Err(SandboxError::RepositoryExists {
                path: path.to_string(),
            });
        }
        if self.fs.is_file(path) {
            return Err(SandboxError::invalid_input(
                "",
                format!("fatal: cannot mkdir {path}: File exists"),
            ));
        }
        let handle = RepoHandle::init(path, &self.fs.host_path(path), &self.profile.git.default_branch)?;
        Ok(self.repos.entry(path.to_string()).or_insert(handle))
    }

    /// Registers a repository that was materialized on disk by other means.
    pub fn attach_repo(&mut self, path: &str) -> Result<&RepoHandle, SandboxError> {
        if self.repos.contains_key(path) {
            return Err(SandboxError::RepositoryExists {
                path: path.to_string(),
            });
        }
        let handle = RepoHandle::attach(path, &self.fs.host_path(path));
        Ok(self.repos.entry(path.to_string()).or_insert(handle))
    }

    /// Unregisters every repository rooted at or below `path`, after the
    /// directory holding them was deleted.
    pub fn forget_repos_under(&mut self, path: &str) -> usize {
        let before = self.repos.len();
        self.repos
            .retain(|root, _| vpath::strip_root(path, root).is_none());
        before - self.repos.len()
    }

    /// Nearest repository enclosing `path`, searching upward.
    pub fn repo_for(&self, path: &str) -> Result<&RepoHandle, SandboxError> {
        vpath::ancestors(path)
            .into_iter()
            .find_map(|candidate| self.repos.get(candidate))
            .ok_or_else(|| SandboxError::NotARepository {
                path: path.to_string(),
            })
    }

    /// Repository enclosing the current directory.
    pub fn repo(&self) -> Result<&RepoHandle, SandboxError> {
        self.repo_for(&self.current_dir)
    }

    /// Maps `input` to the repository of the current directory and the path
    /// relative to that repository's root (empty for the root itself).
    pub fn resolve(&self, input: &str) -> Result<(&RepoHandle, String), SandboxError> {
        let repo = self.repo()?;
        let absolute = self.absolute(input)?;
        let relative = vpath::strip_root(repo.root(), &absolute).ok_or_else(|| {
            SandboxError::invalid_input(
                "",
                format!(
                    "fatal: {input}: '{absolute}' is outside repository at '{}'",
                    repo.root()
                ),
            )
        })?;
        Ok((repo, relative.to_string()))
    }

    pub fn snapshotter(&self, repo: &RepoHandle) -> Result<TreeSnapshotter, SandboxError> {
        TreeSnapshotter::open(repo)
    }

    pub fn record_reflog(&mut self, head: Oid, message: impl Into<String>) {
        if self.profile.reflog_limit == 0 {
            return;
        }
        while self.reflog.len() >= self.profile.reflog_limit {
            self.reflog.pop_front();
        }
        self.reflog.push_back(ReflogEntry {
            hash: short_hash(head),
            message: message.into(),
        });
    }

    /// Entries in execution order.
    pub fn reflog(&self) -> impl DoubleEndedIterator<Item = &ReflogEntry> + ExactSizeIterator {
        self.reflog.iter()
    }

    pub fn update_orig_head(&mut self, head: Option<Oid>) {
        if let Some(head) = head {
            self.orig_head = Some(head);
        }
    }

    pub fn orig_head(&self) -> Option<Oid> {
        self.orig_head
    }

    /// Substitutes the session's `ORIG_HEAD` into a revision expression such
    /// as `ORIG_HEAD~1`.
    pub fn expand_revision(&self, spec: &str) -> Result<String, SandboxError> {
        let Some(rest) = spec.strip_prefix(ORIG_HEAD) else {
            return Ok(spec.to_string());
        };
        match self.orig_head {
            Some(oid) => Ok(format!("{oid}{rest}")),
            None => Err(SandboxError::invalid_input(
                "",
                format!(
                    "fatal: ambiguous argument '{spec}': unknown revision or path not in the working tree."
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_active_ms: AtomicI64,
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    pub fn new(id: &str, state: SessionState) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.last_active()).to_std().unwrap_or_default()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            last_active: self.last_active(),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().await
    }

    /// Shared access that can move onto a blocking worker thread.
    pub async fn read_owned(&self) -> OwnedRwLockReadGuard<SessionState> {
        Arc::clone(&self.state).read_owned().await
    }

    /// Exclusive access that can move onto a blocking worker thread.
    pub async fn write_owned(&self) -> OwnedRwLockWriteGuard<SessionState> {
        Arc::clone(&self.state).write_owned().await
    }
}

//! Process-wide registry of shared bare repositories.
//!
//! Every remote lives at `<root>/<name>` and owns a mutex that serializes
//! all ref reads and updates performed against it (push, fetch, clone,
//! pull-request merges). The map lock only guards lookups and membership
//! changes and is never held while touching the repository on disk.

use chrono::{DateTime, Utc};
use git2::{BranchType, Repository, RepositoryInitOptions};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::errors::SandboxError;
use crate::shared::remote_name::validate_remote_name;

#[derive(Debug)]
pub struct SharedRemote {
    name: String,
    path: PathBuf,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInfo {
    pub name: String,
    pub path: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub branches: Vec<String>,
}

impl SharedRemote {
    fn new(name: &str, path: PathBuf, created_by: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            path,
            created_by,
            created_at: Utc::now(),
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL session repositories record for this remote.
    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Exclusive access to the remote's refs. Blocking; call from worker threads.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self) -> Result<Repository, SandboxError> {
        Repository::open_bare(&self.path).map_err(|e| SandboxError::git("open remote", e))
    }

    pub fn branches(&self) -> Result<Vec<String>, SandboxError> {
        let repo = self.open()?;
        let mut names = Vec::new();
        for item in repo
            .branches(Some(BranchType::Local))
            .map_err(|e| SandboxError::git("list remote branches", e))?
        {
            let (branch, _) = item.map_err(|e| SandboxError::git("list remote branches", e))?;
            if let Ok(Some(name)) = branch.name() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn info(&self) -> Result<RemoteInfo, SandboxError> {
        let branches = {
            let _guard = self.lock();
            self.branches()?
        };
        Ok(RemoteInfo {
            name: self.name.clone(),
            path: self.url(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            branches,
        })
    }
}

pub struct RemoteRegistry {
    root: PathBuf,
    default_branch: String,
    remotes: RwLock<HashMap<String, Arc<SharedRemote>>>,
}

impl RemoteRegistry {
    pub fn new(root: PathBuf, default_branch: &str) -> Self {
        Self {
            root,
            default_branch: default_branch.to_string(),
            remotes: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<SharedRemote>>> {
        self.remotes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<SharedRemote>>> {
        self.remotes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers bare repositories left on disk by a previous run.
    pub fn load_existing(&self) -> Result<usize, SandboxError> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| SandboxError::io("scan remotes", self.root.display(), e))?;

        let mut adopted = Vec::new();
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_remote_name(&name).is_err() {
                continue;
            }
            let path = entry.path();
            match Repository::open_bare(&path) {
                Ok(_) => adopted.push(Arc::new(SharedRemote::new(&name, path, None))),
                Err(e) => warn!("Ignoring {}: not a bare repository ({e})", path.display()),
            }
        }

        let count = adopted.len();
        let mut map = self.write_map();
        for remote in adopted {
            map.entry(remote.name.clone()).or_insert(remote);
        }
        info!("Adopted {count} existing shared remote(s) from {}", self.root.display());
        Ok(count)
    }

    pub fn create(
        &self,
        name: &str,
        created_by: Option<&str>,
    ) -> Result<Arc<SharedRemote>, SandboxError> {
        validate_remote_name(name)?;
        if self.read_map().contains_key(name) {
            return Err(SandboxError::RemoteAlreadyExists {
                name: name.to_string(),
            });
        }

        std::fs::create_dir_all(&self.root)
            .map_err(|e| SandboxError::io("create remotes root", self.root.display(), e))?;
        let path = self.root.join(name);
        // create_dir is atomic, so two racing creators cannot both win.
        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SandboxError::RemoteAlreadyExists {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(SandboxError::io("create remote", path.display(), e)),
        }

        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head(&self.default_branch);
        if let Err(e) = Repository::init_opts(&path, &opts) {
            let _ = std::fs::remove_dir_all(&path);
            return Err(SandboxError::git("init bare repository", e));
        }

        let remote = Arc::new(SharedRemote::new(
            name,
            path,
            created_by.map(str::to_string),
        ));
        self.write_map().insert(name.to_string(), Arc::clone(&remote));
        info!("Created shared remote '{name}' at {}", remote.path.display());
        Ok(remote)
    }

    pub fn get(&self, name: &str) -> Result<Arc<SharedRemote>, SandboxError> {
        self.read_map()
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::RemoteNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_map().contains_key(name)
    }

    /// Looks a remote up by name or by the storage path recorded as a URL.
    pub fn resolve(&self, spec: &str) -> Result<Arc<SharedRemote>, SandboxError> {
        if let Ok(remote) = self.get(spec) {
            return Ok(remote);
        }
        let candidate: PathBuf = Path::new(spec.strip_prefix("file://").unwrap_or(spec))
            .components()
            .collect();
        self.read_map()
            .values()
            .find(|remote| remote.path == candidate)
            .cloned()
            .ok_or_else(|| SandboxError::RemoteNotFound {
                name: spec.to_string(),
            })
    }

    pub fn list(&self) -> Vec<Arc<SharedRemote>> {
        let mut remotes: Vec<_> = self.read_map().values().cloned().collect();
        remotes.sort_by(|a, b| a.name.cmp(&b.name));
        remotes
    }

    /// Unregisters the remote and deletes its storage once in-flight
    /// operations holding its lock have finished.
    pub fn remove(&self, name: &str) -> Result<Arc<SharedRemote>, SandboxError> {
        let remote = self
            .write_map()
            .remove(name)
            .ok_or_else(|| SandboxError::RemoteNotFound {
                name: name.to_string(),
            })?;

        let _guard = remote.lock();
        if remote.path.exists() {
            std::fs::remove_dir_all(&remote.path)
                .map_err(|e| SandboxError::io("remove remote", remote.path.display(), e))?;
        }
        info!("Removed shared remote '{name}'");
        Ok(Arc::clone(&remote))
    }
}

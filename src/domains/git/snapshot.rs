//! Synthetic trees for the live worktree and index.
//!
//! libgit2 diffs two materialized trees. To compare the worktree or the index
//! with the same algorithm as committed history, [`TreeSnapshotter`] writes
//! the live content into an in-memory object store layered on top of the
//! repository's own and builds ordinary tree objects from it. Nothing is
//! written to the repository's on-disk object database.

use git2::{Oid, Repository, Tree, TreeBuilder};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::diff::DiffReport;
use super::repository::{RepoHandle, resolve_commit};
use crate::errors::SandboxError;

/// In-memory backend wins over loose (1) and packed (2) storage for writes.
const SCRATCH_ODB_PRIORITY: i32 = 1000;
const MODE_BLOB: i32 = 0o100644;
const MODE_EXECUTABLE: i32 = 0o100755;
const MODE_TREE: i32 = 0o040000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeScope {
    /// Only paths present in the index, as `git diff` sees the worktree.
    Tracked,
    /// Every regular file outside `.git` and nested repositories.
    All,
}

pub struct TreeSnapshotter {
    repo: Repository,
}

impl TreeSnapshotter {
    pub fn open(handle: &RepoHandle) -> Result<Self, SandboxError> {
        let repo = handle.open()?;
        {
            let odb = repo
                .odb()
                .map_err(|e| SandboxError::git("open object database", e))?;
            odb.add_new_mempack_backend(SCRATCH_ODB_PRIORITY)
                .map_err(|e| SandboxError::git("attach scratch object store", e))?;
        }
        Ok(Self { repo })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn head_tree(&self) -> Result<Option<Tree<'_>>, SandboxError> {
        match super::repository::head_commit(&self.repo)? {
            Some(commit) => commit
                .tree()
                .map(Some)
                .map_err(|e| SandboxError::git("read HEAD tree", e)),
            None => Ok(None),
        }
    }

    pub fn revision_tree(&self, spec: &str) -> Result<Tree<'_>, SandboxError> {
        resolve_commit(&self.repo, spec)?
            .tree()
            .map_err(|e| SandboxError::git("read tree", e))
    }

    /// Tree equivalent to what `git write-tree` would produce right now.
    pub fn index_tree(&self) -> Result<Tree<'_>, SandboxError> {
        let index = self
            .repo
            .index()
            .map_err(|e| SandboxError::git("read index", e))?;

        let mut root = DirNode::default();
        for entry in index.iter() {
            // Conflict stages are not part of any tree.
            if (entry.flags >> 12) & 0x3 != 0 {
                continue;
            }
            let Ok(path) = std::str::from_utf8(&entry.path) else {
                warn!("Skipping index entry with non UTF-8 path");
                continue;
            };
            root.insert(path, entry.id, entry.mode as i32);
        }

        self.materialize(&root)
    }

    pub fn worktree_tree(
        &self,
        scope: WorktreeScope,
        cancel: &CancellationToken,
    ) -> Result<Tree<'_>, SandboxError> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| {
                SandboxError::conflict("fatal: this operation must be run in a work tree")
            })?
            .to_path_buf();
        let index = self
            .repo
            .index()
            .map_err(|e| SandboxError::git("read index", e))?;

        let tracked: HashMap<String, i32> = index
            .iter()
            .filter_map(|entry| {
                let path = String::from_utf8(entry.path.clone()).ok()?;
                Some((path, entry.mode as i32))
            })
            .collect();

        let mut root = DirNode::default();
        let walker = WalkDir::new(&workdir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !is_excluded_dir(entry.path(), entry.depth(), entry.file_type().is_dir())
            });

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(SandboxError::Cancelled);
            }
            let entry =
                entry.map_err(|e| SandboxError::io("walk worktree", workdir.display(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_path(&workdir, entry.path()) else {
                warn!(
                    "Skipping worktree entry with non UTF-8 path: {}",
                    entry.path().display()
                );
                continue;
            };
            let tracked_mode = tracked.get(&relative).copied();
            if scope == WorktreeScope::Tracked && tracked_mode.is_none() {
                continue;
            }

            let content = std::fs::read(entry.path())
                .map_err(|e| SandboxError::io("read worktree file", entry.path().display(), e))?;
            let oid = self
                .repo
                .blob(&content)
                .map_err(|e| SandboxError::git("hash worktree file", e))?;
            let mode = match tracked_mode {
                Some(MODE_EXECUTABLE) => MODE_EXECUTABLE,
                _ => MODE_BLOB,
            };
            root.insert(&relative, oid, mode);
        }

        debug!("Synthesized worktree tree for {}", workdir.display());
        self.materialize(&root)
    }

    pub fn diff(
        &self,
        old: Option<&Tree<'_>>,
        new: Option<&Tree<'_>>,
    ) -> Result<DiffReport, SandboxError> {
        let mut opts = git2::DiffOptions::new();
        opts.include_typechange(true);
        let diff = self
            .repo
            .diff_tree_to_tree(old, new, Some(&mut opts))
            .map_err(|e| SandboxError::git("diff", e))?;
        DiffReport::from_diff(&diff)
    }

    fn materialize(&self, root: &DirNode) -> Result<Tree<'_>, SandboxError> {
        let oid = root.write(&self.repo)?;
        self.repo
            .find_tree(oid)
            .map_err(|e| SandboxError::git("load synthesized tree", e))
    }
}

fn is_excluded_dir(path: &Path, depth: usize, is_dir: bool) -> bool {
    if !is_dir || depth == 0 {
        return false;
    }
    path.file_name().is_some_and(|name| name == ".git") || path.join(".git").exists()
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    Some(parts?.join("/"))
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, (Oid, i32)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, oid: Oid, mode: i32) {
        match path.split_once('/') {
            Some((dir, rest)) => {
                self.dirs
                    .entry(dir.to_string())
                    .or_default()
                    .insert(rest, oid, mode);
            }
            None => {
                self.files.insert(path.to_string(), (oid, mode));
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.values().all(DirNode::is_empty)
    }

    fn write(&self, repo: &Repository) -> Result<Oid, SandboxError> {
        let mut builder: TreeBuilder<'_> = repo
            .treebuilder(None)
            .map_err(|e| SandboxError::git("build tree", e))?;
        for (name, (oid, mode)) in &self.files {
            builder
                .insert(name, *oid, *mode)
                .map_err(|e| SandboxError::git("build tree", e))?;
        }
        for (name, dir) in &self.dirs {
            if dir.is_empty() {
                continue;
            }
            let child = dir.write(repo)?;
            builder
                .insert(name, child, MODE_TREE)
                .map_err(|e| SandboxError::git("build tree", e))?;
        }
        builder.write().map_err(|e| SandboxError::git("write tree", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::diff::FileStatus;
    use git2::{IndexAddOption, Signature};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, RepoHandle) {
        let temp = TempDir::new().unwrap();
        let handle = RepoHandle::init("/r", &temp.path().join("r"), "main").unwrap();
        (temp, handle)
    }

    fn stage_all(handle: &RepoHandle) {
        let repo = handle.open().unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
    }

    fn commit(handle: &RepoHandle, message: &str) -> Oid {
        let repo = handle.open().unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parent = crate::domains::git::repository::head_commit(&repo).unwrap();
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn empty_file_commit_then_worktree_edit() {
        let (_temp, handle) = fixture();
        std::fs::write(handle.workdir().join("f"), "").unwrap();
        stage_all(&handle);
        commit(&handle, "c1");

        let snap = TreeSnapshotter::open(&handle).unwrap();
        let head = snap.head_tree().unwrap().unwrap();
        let report = snap.diff(None, Some(&head)).unwrap();
        assert_eq!(report.files.len(), 1);
        let file = &report.files[0];
        assert_eq!(file.path, "f");
        assert_eq!(file.status, FileStatus::Added);
        assert_eq!((file.additions, file.deletions), (0, 0));

        std::fs::write(handle.workdir().join("f"), "hello").unwrap();
        let cancel = CancellationToken::new();
        let index = snap.index_tree().unwrap();
        let worktree = snap.worktree_tree(WorktreeScope::Tracked, &cancel).unwrap();
        let report = snap.diff(Some(&index), Some(&worktree)).unwrap();

        assert_eq!(report.files.len(), 1);
        let file = &report.files[0];
        assert_eq!(file.status, FileStatus::Modified);
        assert_eq!((file.additions, file.deletions), (1, 0));
        let added: Vec<&str> = file
            .hunks
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| line.origin == '+')
            .map(|line| line.content.as_str())
            .collect();
        assert_eq!(added, vec!["hello"]);
    }

    #[test]
    fn index_tree_matches_written_tree() {
        let (_temp, handle) = fixture();
        std::fs::create_dir_all(handle.workdir().join("src/nested")).unwrap();
        std::fs::write(handle.workdir().join("src/nested/a.txt"), "a\n").unwrap();
        std::fs::write(handle.workdir().join("b.txt"), "b\n").unwrap();
        stage_all(&handle);

        let expected = handle.open().unwrap().index().unwrap().write_tree().unwrap();
        let snap = TreeSnapshotter::open(&handle).unwrap();
        assert_eq!(snap.index_tree().unwrap().id(), expected);
    }

    #[test]
    fn worktree_scope_controls_untracked_files() {
        let (_temp, handle) = fixture();
        std::fs::write(handle.workdir().join("tracked"), "t\n").unwrap();
        stage_all(&handle);
        std::fs::write(handle.workdir().join("untracked"), "u\n").unwrap();

        let snap = TreeSnapshotter::open(&handle).unwrap();
        let cancel = CancellationToken::new();
        let tracked = snap.worktree_tree(WorktreeScope::Tracked, &cancel).unwrap();
        let all = snap.worktree_tree(WorktreeScope::All, &cancel).unwrap();

        assert!(tracked.get_name("untracked").is_none());
        assert!(all.get_name("untracked").is_some());
        assert_eq!(tracked.id(), snap.index_tree().unwrap().id());
    }

    #[test]
    fn worktree_skips_nested_repositories() {
        let (_temp, handle) = fixture();
        std::fs::write(handle.workdir().join("top"), "x\n").unwrap();
        RepoHandle::init("/r/inner", &handle.workdir().join("inner"), "main").unwrap();
        std::fs::write(handle.workdir().join("inner/file"), "y\n").unwrap();

        let snap = TreeSnapshotter::open(&handle).unwrap();
        let tree = snap
            .worktree_tree(WorktreeScope::All, &CancellationToken::new())
            .unwrap();
        assert!(tree.get_name("top").is_some());
        assert!(tree.get_name("inner").is_none());
    }

    #[test]
    fn synthesized_objects_stay_out_of_the_object_database() {
        let (_temp, handle) = fixture();
        std::fs::write(handle.workdir().join("draft"), "unsaved\n").unwrap();

        let blob_id = {
            let snap = TreeSnapshotter::open(&handle).unwrap();
            let tree = snap
                .worktree_tree(WorktreeScope::All, &CancellationToken::new())
                .unwrap();
            tree.get_name("draft").unwrap().id()
        };

        let repo = handle.open().unwrap();
        assert!(repo.find_blob(blob_id).is_err());
    }

    #[test]
    fn cancelled_walk_stops_early() {
        let (_temp, handle) = fixture();
        std::fs::write(handle.workdir().join("f"), "x\n").unwrap();
        let snap = TreeSnapshotter::open(&handle).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = snap.worktree_tree(WorktreeScope::All, &cancel).unwrap_err();
        assert!(matches!(err, SandboxError::Cancelled));
    }
}

use chrono::Utc;
use git2::{Oid, Repository};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::strategy::{MergePlan, plan_merge};
use super::types::{NewPullRequest, PrMergeMode, PrMergeOutcome, PrState, PullRequest};
use crate::domains::git::repository::{normalize_branch_ref, signature};
use crate::domains::remotes::{RemoteRegistry, SharedRemote};
use crate::domains::settings::GitSettings;
use crate::errors::SandboxError;

const OPERATION_LABEL: &str = "merge_pull_request";

#[derive(Debug)]
struct PullRequestBook {
    next_id: u64,
    entries: BTreeMap<u64, PullRequest>,
}

impl Default for PullRequestBook {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }
}

/// Pull requests against shared remotes.
///
/// Merges run directly on the bare repository: no session worktree is
/// involved. Every operation that reads or moves refs of a remote holds that
/// remote's lock; the book mutex is only held for in-memory bookkeeping.
pub struct PullRequestEngine {
    remotes: Arc<RemoteRegistry>,
    git: GitSettings,
    book: Mutex<PullRequestBook>,
}

impl PullRequestEngine {
    pub fn new(remotes: Arc<RemoteRegistry>, git: GitSettings) -> Self {
        Self {
            remotes,
            git,
            book: Mutex::new(PullRequestBook::default()),
        }
    }

    fn book(&self) -> MutexGuard<'_, PullRequestBook> {
        self.book
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a pull request. Blocking; touches the remote's refs.
    pub fn create(&self, request: NewPullRequest) -> Result<PullRequest, SandboxError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(SandboxError::invalid_input("title", "title must not be empty"));
        }
        if request.source_branch.trim().is_empty() || request.target_branch.trim().is_empty() {
            return Err(SandboxError::invalid_input(
                "branch",
                "source and target branches are required",
            ));
        }
        if request.source_branch == request.target_branch {
            return Err(SandboxError::invalid_input(
                "branch",
                "source and target branches must differ",
            ));
        }

        let remote = self.remotes.get(&request.remote_name)?;
        let _guard = remote.lock();
        // A concurrent removal may have unregistered the remote while we waited.
        if !self.remotes.contains(remote.name()) {
            return Err(SandboxError::RemoteNotFound {
                name: request.remote_name.clone(),
            });
        }
        let repo = remote.open()?;
        branch_tip(&repo, &remote, &request.source_branch)?;
        branch_tip(&repo, &remote, &request.target_branch)?;

        let mut book = self.book();
        let id = book.next_id;
        book.next_id += 1;
        let pr = PullRequest {
            id,
            title: title.to_string(),
            description: request.description,
            source_branch: request.source_branch,
            target_branch: request.target_branch,
            creator: request.creator,
            remote_name: request.remote_name,
            state: PrState::Open,
            created_at: Utc::now(),
            merged_at: None,
        };
        book.entries.insert(id, pr.clone());
        info!(
            "Opened pull request #{id} on '{}': {} -> {}",
            pr.remote_name, pr.source_branch, pr.target_branch
        );
        Ok(pr)
    }

    pub fn get(&self, id: u64) -> Result<PullRequest, SandboxError> {
        self.book()
            .entries
            .get(&id)
            .cloned()
            .ok_or(SandboxError::PullRequestNotFound { id })
    }

    pub fn list(&self, remote: Option<&str>) -> Vec<PullRequest> {
        self.book()
            .entries
            .values()
            .filter(|pr| remote.is_none_or(|name| pr.remote_name == name))
            .cloned()
            .collect()
    }

    fn checked_open(&self, id: u64, remote_name: &str) -> Result<PullRequest, SandboxError> {
        let pr = self.get(id)?;
        if pr.remote_name != remote_name {
            return Err(SandboxError::RemoteMismatch {
                id,
                expected: pr.remote_name,
                actual: remote_name.to_string(),
            });
        }
        if pr.state != PrState::Open {
            return Err(SandboxError::PullRequestNotOpen {
                id,
                state: pr.state.to_string(),
            });
        }
        Ok(pr)
    }

    /// Merges the source branch into the target branch on the shared remote.
    /// Blocking; run it on a worker thread.
    pub fn merge(&self, id: u64, remote_name: &str) -> Result<PrMergeOutcome, SandboxError> {
        self.checked_open(id, remote_name)?;
        let remote = self.remotes.get(remote_name)?;

        let _guard = remote.lock();
        // Re-read under the remote lock: a concurrent merge of the same PR wins once.
        let pr = self.checked_open(id, remote_name)?;
        let repo = remote.open()?;
        let source = branch_tip(&repo, &remote, &pr.source_branch)?;
        let target = branch_tip(&repo, &remote, &pr.target_branch)?;
        let target_ref = normalize_branch_ref(&pr.target_branch);
        debug!("{OPERATION_LABEL}: #{id} source={source} target={target}");

        let (mode, new_target) = match plan_merge(&repo, target, source)? {
            MergePlan::UpToDate => (PrMergeMode::AlreadyUpToDate, target),
            MergePlan::FastForward(oid) => {
                repo.reference(
                    &target_ref,
                    oid,
                    true,
                    &format!("pull request #{id}: fast-forward"),
                )
                .map_err(|e| SandboxError::git("update target branch", e))?;
                (PrMergeMode::FastForward, oid)
            }
            MergePlan::Merge { tree } => {
                let oid = self.write_merge_commit(&repo, &pr, &target_ref, tree, target, source)?;
                (PrMergeMode::MergeCommit, oid)
            }
        };

        let merged = {
            let mut book = self.book();
            let entry = book
                .entries
                .get_mut(&id)
                .ok_or(SandboxError::PullRequestNotFound { id })?;
            entry.state = PrState::Merged;
            entry.merged_at = Some(Utc::now());
            entry.clone()
        };
        info!(
            "Merged pull request #{id} into '{}' on '{}' ({mode:?})",
            merged.target_branch, merged.remote_name
        );

        Ok(PrMergeOutcome {
            pull_request: merged,
            mode,
            target_commit: new_target.to_string(),
        })
    }

    fn write_merge_commit(
        &self,
        repo: &Repository,
        pr: &PullRequest,
        target_ref: &str,
        tree: Oid,
        target: Oid,
        source: Oid,
    ) -> Result<Oid, SandboxError> {
        let tree = repo
            .find_tree(tree)
            .map_err(|e| SandboxError::git("merge pull request", e))?;
        let target_commit = repo
            .find_commit(target)
            .map_err(|e| SandboxError::git("merge pull request", e))?;
        let source_commit = repo
            .find_commit(source)
            .map_err(|e| SandboxError::git("merge pull request", e))?;
        let author = signature(&self.git)?;
        let message = format!(
            "Merge pull request #{} from {}\n\n{}",
            pr.id, pr.source_branch, pr.title
        );
        repo.commit(
            Some(target_ref),
            &author,
            &author,
            &message,
            &tree,
            &[&target_commit, &source_commit],
        )
        .map_err(|e| SandboxError::git("create merge commit", e))
    }

    pub fn close(&self, id: u64) -> Result<PullRequest, SandboxError> {
        let pr = self.get(id)?;
        // Serialize with in-flight merges of the same remote.
        let remote = self.remotes.get(&pr.remote_name).ok();
        let _guard = remote.as_ref().map(|remote| remote.lock());

        let mut book = self.book();
        let entry = book
            .entries
            .get_mut(&id)
            .ok_or(SandboxError::PullRequestNotFound { id })?;
        if entry.state != PrState::Open {
            return Err(SandboxError::PullRequestNotOpen {
                id,
                state: entry.state.to_string(),
            });
        }
        entry.state = PrState::Closed;
        info!("Closed pull request #{id}");
        Ok(entry.clone())
    }

    /// Drops every pull request that targets `remote_name`. Returns how many
    /// were removed.
    pub fn forget_remote(&self, remote_name: &str) -> usize {
        let mut book = self.book();
        let before = book.entries.len();
        book.entries.retain(|_, pr| pr.remote_name != remote_name);
        let removed = before - book.entries.len();
        if removed > 0 {
            info!("Removed {removed} pull request(s) of deleted remote '{remote_name}'");
        }
        removed
    }
}

fn branch_tip(repo: &Repository, remote: &SharedRemote, branch: &str) -> Result<Oid, SandboxError> {
    repo.find_reference(&normalize_branch_ref(branch))
        .ok()
        .and_then(|reference| reference.target())
        .ok_or_else(|| {
            SandboxError::invalid_input(
                "branch",
                format!(
                    "branch '{branch}' does not exist on remote '{}'",
                    remote.name()
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Signature};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        registry: Arc<RemoteRegistry>,
        engine: PullRequestEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let registry = Arc::new(RemoteRegistry::new(temp.path().join("remotes"), "main"));
            let engine = PullRequestEngine::new(Arc::clone(&registry), GitSettings::default());
            Self {
                _temp: temp,
                registry,
                engine,
            }
        }
    }

    fn commit_on(repo: &Repository, branch: &str, files: &[(&str, &str)], parents: &[Oid]) -> Oid {
        let mut builder = repo.treebuilder(None).unwrap();
        for (name, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(name, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit> = parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        let oid = repo.commit(None, &sig, &sig, "c", &tree, &parent_refs).unwrap();
        repo.reference(&format!("refs/heads/{branch}"), oid, true, "test")
            .unwrap();
        oid
    }

    fn request(remote: &str, source: &str, target: &str) -> NewPullRequest {
        NewPullRequest {
            title: "Add feature".into(),
            description: String::new(),
            source_branch: source.into(),
            target_branch: target.into(),
            creator: "alice".into(),
            remote_name: remote.into(),
        }
    }

    fn seeded(fx: &Fixture, name: &str) -> (Oid, Oid) {
        let remote = fx.registry.create(name, None).unwrap();
        let repo = remote.open().unwrap();
        let base = commit_on(&repo, "main", &[("a", "a\n")], &[]);
        let feature = commit_on(&repo, "feature", &[("a", "a\n"), ("b", "b\n")], &[base]);
        (base, feature)
    }

    #[test]
    fn create_requires_existing_remote_and_branches() {
        let fx = Fixture::new();
        let err = fx.engine.create(request("ghost", "feature", "main")).unwrap_err();
        assert!(matches!(err, SandboxError::RemoteNotFound { .. }));

        seeded(&fx, "team");
        let err = fx.engine.create(request("team", "nope", "main")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let first = fx.engine.create(request("team", "feature", "main")).unwrap();
        let second = fx.engine.create(request("team", "feature", "main")).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.state, PrState::Open);
    }

    #[test]
    fn fast_forward_merge_then_second_merge_fails() {
        let fx = Fixture::new();
        let (_, feature) = seeded(&fx, "team");
        let pr = fx.engine.create(request("team", "feature", "main")).unwrap();

        let outcome = fx.engine.merge(pr.id, "team").unwrap();
        assert_eq!(outcome.mode, PrMergeMode::FastForward);
        assert_eq!(outcome.pull_request.state, PrState::Merged);
        let repo = fx.registry.get("team").unwrap().open().unwrap();
        assert_eq!(
            repo.find_reference("refs/heads/main").unwrap().target(),
            Some(feature)
        );

        let err = fx.engine.merge(pr.id, "team").unwrap_err();
        assert!(matches!(err, SandboxError::PullRequestNotOpen { .. }));
        assert_eq!(
            repo.find_reference("refs/heads/main").unwrap().target(),
            Some(feature)
        );
    }

    #[test]
    fn diverged_branches_get_merge_commit() {
        let fx = Fixture::new();
        let (base, feature) = seeded(&fx, "team");
        let repo = fx.registry.get("team").unwrap().open().unwrap();
        let main = commit_on(&repo, "main", &[("a", "a\n"), ("c", "c\n")], &[base]);

        let pr = fx.engine.create(request("team", "feature", "main")).unwrap();
        let outcome = fx.engine.merge(pr.id, "team").unwrap();
        assert_eq!(outcome.mode, PrMergeMode::MergeCommit);

        let head = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(head.parent_ids().collect::<Vec<_>>(), vec![main, feature]);
        assert_eq!(
            head.message().unwrap(),
            "Merge pull request #1 from feature\n\nAdd feature"
        );
        let tree = head.tree().unwrap();
        assert!(tree.get_name("b").is_some());
        assert!(tree.get_name("c").is_some());
    }

    #[test]
    fn conflicting_merge_leaves_pr_open() {
        let fx = Fixture::new();
        let (base, _) = seeded(&fx, "team");
        let repo = fx.registry.get("team").unwrap().open().unwrap();
        commit_on(&repo, "feature", &[("a", "theirs\n")], &[base]);
        let main = commit_on(&repo, "main", &[("a", "ours\n")], &[base]);

        let pr = fx.engine.create(request("team", "feature", "main")).unwrap();
        let err = fx.engine.merge(pr.id, "team").unwrap_err();
        assert!(matches!(err, SandboxError::MergeConflict { .. }));
        assert_eq!(fx.engine.get(pr.id).unwrap().state, PrState::Open);
        assert_eq!(
            repo.find_reference("refs/heads/main").unwrap().target(),
            Some(main)
        );
    }

    #[test]
    fn merge_rejects_remote_mismatch_and_unknown_ids() {
        let fx = Fixture::new();
        seeded(&fx, "team");
        seeded(&fx, "other");
        let pr = fx.engine.create(request("team", "feature", "main")).unwrap();

        let err = fx.engine.merge(pr.id, "other").unwrap_err();
        assert!(matches!(err, SandboxError::RemoteMismatch { .. }));
        let err = fx.engine.merge(99, "team").unwrap_err();
        assert!(matches!(err, SandboxError::PullRequestNotFound { id: 99 }));
    }

    #[test]
    fn close_and_forget_remote() {
        let fx = Fixture::new();
        seeded(&fx, "team");
        seeded(&fx, "other");
        let a = fx.engine.create(request("team", "feature", "main")).unwrap();
        let b = fx.engine.create(request("other", "feature", "main")).unwrap();

        assert_eq!(fx.engine.close(a.id).unwrap().state, PrState::Closed);
        assert!(fx.engine.close(a.id).is_err());
        assert!(fx.engine.merge(a.id, "team").is_err());

        assert_eq!(fx.engine.forget_remote("team"), 1);
        let remaining = fx.engine.list(None);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
        assert!(fx.engine.list(Some("team")).is_empty());

        let c = fx.engine.create(request("other", "feature", "main")).unwrap();
        assert_eq!(c.id, 3);
    }
}

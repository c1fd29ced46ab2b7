use git2::build::CheckoutBuilder;
use git2::{Branch, BranchType, Commit, Oid, Repository};
use log::info;
use serde::Serialize;

use super::repository::{
    current_branch, head_commit, head_oid, normalize_branch_ref, resolve_commit, short_hash,
};
use crate::errors::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_head: bool,
    pub is_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub from: String,
    pub to: String,
    pub created: bool,
}

impl SwitchOutcome {
    pub fn reflog_message(&self) -> String {
        format!("checkout: moving from {} to {}", self.from, self.to)
    }
}

fn validate_branch_name(name: &str) -> Result<(), SandboxError> {
    let valid = Branch::name_is_valid(name).map_err(|e| SandboxError::git("branch", e))?;
    if !valid || name.starts_with('-') {
        return Err(SandboxError::invalid_input(
            "",
            format!("fatal: '{name}' is not a valid branch name"),
        ));
    }
    Ok(())
}

/// Human label for where HEAD currently is: branch name or abbreviated hash.
pub fn describe_head(repo: &Repository) -> Result<String, SandboxError> {
    if let Some(branch) = current_branch(repo)? {
        return Ok(branch);
    }
    Ok(head_oid(repo)?.map(short_hash).unwrap_or_else(|| "HEAD".to_string()))
}

pub fn list_branches(repo: &Repository, include_remote: bool) -> Result<Vec<BranchInfo>, SandboxError> {
    let filter = if include_remote { None } else { Some(BranchType::Local) };
    let head = current_branch(repo)?;
    let mut branches = Vec::new();
    for item in repo
        .branches(filter)
        .map_err(|e| SandboxError::git("list branches", e))?
    {
        let (branch, kind) = item.map_err(|e| SandboxError::git("list branches", e))?;
        let Some(name) = branch
            .name()
            .map_err(|e| SandboxError::git("list branches", e))?
        else {
            continue;
        };
        let is_remote = kind == BranchType::Remote;
        branches.push(BranchInfo {
            is_head: !is_remote && head.as_deref() == Some(name),
            name: name.to_string(),
            is_remote,
        });
    }
    branches.sort_by(|a, b| (a.is_remote, &a.name).cmp(&(b.is_remote, &b.name)));
    Ok(branches)
}

pub fn create_branch(repo: &Repository, name: &str, start: Option<&str>) -> Result<Oid, SandboxError> {
    validate_branch_name(name)?;
    if repo.find_branch(name, BranchType::Local).is_ok() {
        return Err(SandboxError::conflict(format!(
            "fatal: a branch named '{name}' already exists"
        )));
    }

    let target = match start {
        Some(spec) => resolve_commit(repo, spec)?,
        None => head_commit(repo)?.ok_or_else(|| {
            SandboxError::conflict(format!(
                "fatal: not a valid object name: '{}'",
                current_branch(repo).ok().flatten().unwrap_or_else(|| "HEAD".into())
            ))
        })?,
    };

    repo.branch(name, &target, false)
        .map_err(|e| SandboxError::git("create branch", e))?;
    info!("Created branch {name} at {}", short_hash(target.id()));
    Ok(target.id())
}

pub fn delete_branch(repo: &Repository, name: &str, force: bool) -> Result<Oid, SandboxError> {
    let mut branch = repo
        .find_branch(name, BranchType::Local)
        .map_err(|_| SandboxError::invalid_input("", format!("error: branch '{name}' not found")))?;
    if current_branch(repo)?.as_deref() == Some(name) {
        return Err(SandboxError::conflict(format!(
            "error: cannot delete branch '{name}' checked out in the current worktree"
        )));
    }
    let tip = branch
        .get()
        .target()
        .ok_or_else(|| SandboxError::git("delete branch", "branch has no target"))?;

    if !force && let Some(head) = head_oid(repo)? {
        let merged = head == tip
            || repo
                .graph_descendant_of(head, tip)
                .map_err(|e| SandboxError::git("delete branch", e))?;
        if !merged {
            return Err(SandboxError::conflict(format!(
                "error: the branch '{name}' is not fully merged.\nIf you are sure you want to delete it, run 'git branch -D {name}'."
            )));
        }
    }

    branch
        .delete()
        .map_err(|e| SandboxError::git("delete branch", e))?;
    Ok(tip)
}

/// Updates the worktree and index to `target`, refusing to overwrite local
/// modifications. HEAD is not moved.
pub fn checkout_commit(repo: &Repository, target: &Commit<'_>) -> Result<(), SandboxError> {
    checkout_object(repo, target.as_object())
}

/// Same as [`checkout_commit`] for any tree-ish object.
pub fn checkout_object(repo: &Repository, target: &git2::Object<'_>) -> Result<(), SandboxError> {
    let mut builder = CheckoutBuilder::new();
    builder.safe();
    repo.checkout_tree(target, Some(&mut builder))
        .map_err(|e| {
            if e.code() == git2::ErrorCode::Conflict {
                SandboxError::conflict(
                    "error: Your local changes to the following files would be overwritten by checkout.\nPlease commit your changes or stash them before you switch branches.",
                )
            } else {
                SandboxError::git("checkout", e)
            }
        })
}

/// `git switch [-c] <name>`. An unknown local name that exists as a
/// remote-tracking branch creates a local branch from it.
pub fn switch_branch(repo: &Repository, name: &str, create: bool) -> Result<SwitchOutcome, SandboxError> {
    let from = describe_head(repo)?;
    let reference = normalize_branch_ref(name);

    if create {
        validate_branch_name(name)?;
        if repo.find_branch(name, BranchType::Local).is_ok() {
            return Err(SandboxError::conflict(format!(
                "fatal: a branch named '{name}' already exists"
            )));
        }
        if let Some(head) = head_commit(repo)? {
            repo.branch(name, &head, false)
                .map_err(|e| SandboxError::git("create branch", e))?;
        }
        repo.set_head(&reference)
            .map_err(|e| SandboxError::git("switch", e))?;
        return Ok(SwitchOutcome {
            from,
            to: name.to_string(),
            created: true,
        });
    }

    let mut created = false;
    let target = match repo.find_branch(name, BranchType::Local) {
        Ok(branch) => branch
            .get()
            .peel_to_commit()
            .map_err(|e| SandboxError::git("switch", e))?,
        Err(_) => {
            let tracking = find_tracking_candidate(repo, name)?.ok_or_else(|| {
                SandboxError::invalid_input("", format!("fatal: invalid reference: {name}"))
            })?;
            created = true;
            tracking
        }
    };

    checkout_commit(repo, &target)?;
    if created {
        repo.branch(name, &target, false)
            .map_err(|e| SandboxError::git("create branch", e))?;
    }
    repo.set_head(&reference)
        .map_err(|e| SandboxError::git("switch", e))?;

    Ok(SwitchOutcome {
        from,
        to: name.to_string(),
        created,
    })
}

fn find_tracking_candidate<'r>(repo: &'r Repository, name: &str) -> Result<Option<Commit<'r>>, SandboxError> {
    let remotes = repo
        .remotes()
        .map_err(|e| SandboxError::git("list remotes", e))?;
    for remote in remotes.iter().flatten() {
        let candidate = format!("refs/remotes/{remote}/{name}");
        if let Ok(reference) = repo.find_reference(&candidate) {
            let commit = reference
                .peel_to_commit()
                .map_err(|e| SandboxError::git("switch", e))?;
            return Ok(Some(commit));
        }
    }
    Ok(None)
}

/// `git checkout <rev>` for something that is not a local branch.
pub fn checkout_detached(repo: &Repository, spec: &str) -> Result<SwitchOutcome, SandboxError> {
    let from = describe_head(repo)?;
    let target = resolve_commit(repo, spec)?;
    checkout_commit(repo, &target)?;
    repo.set_head_detached(target.id())
        .map_err(|e| SandboxError::git("checkout", e))?;
    Ok(SwitchOutcome {
        from,
        to: short_hash(target.id()),
        created: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::commits::{CommitRequest, create_commit};
    use crate::domains::git::repository::RepoHandle;
    use crate::domains::git::staging::{StageRequest, stage};
    use git2::Signature;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = RepoHandle::init("/", temp.path(), "main")
            .unwrap()
            .open()
            .unwrap();
        (temp, repo)
    }

    fn commit_file(temp: &TempDir, repo: &Repository, name: &str, content: &str) -> Oid {
        std::fs::write(temp.path().join(name), content).unwrap();
        stage(repo, &StageRequest::All).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        create_commit(
            repo,
            &sig,
            &CommitRequest {
                message: Some(format!("write {name}")),
                ..Default::default()
            },
        )
        .unwrap()
        .oid
    }

    #[test]
    fn create_list_and_switch() {
        let (temp, repo) = fixture();
        commit_file(&temp, &repo, "a", "a\n");
        create_branch(&repo, "feature", None).unwrap();

        let names: Vec<(String, bool)> = list_branches(&repo, false)
            .unwrap()
            .into_iter()
            .map(|b| (b.name, b.is_head))
            .collect();
        assert_eq!(
            names,
            vec![("feature".to_string(), false), ("main".to_string(), true)]
        );

        let outcome = switch_branch(&repo, "feature", false).unwrap();
        assert_eq!(outcome.reflog_message(), "checkout: moving from main to feature");
        assert_eq!(current_branch(&repo).unwrap().as_deref(), Some("feature"));
    }

    #[test]
    fn switch_updates_worktree_contents() {
        let (temp, repo) = fixture();
        commit_file(&temp, &repo, "a", "main\n");
        switch_branch(&repo, "feature", true).unwrap();
        commit_file(&temp, &repo, "a", "feature\n");

        switch_branch(&repo, "main", false).unwrap();
        assert_eq!(std::fs::read_to_string(temp.path().join("a")).unwrap(), "main\n");
    }

    #[test]
    fn switch_refuses_to_clobber_local_changes() {
        let (temp, repo) = fixture();
        commit_file(&temp, &repo, "a", "main\n");
        switch_branch(&repo, "feature", true).unwrap();
        commit_file(&temp, &repo, "a", "feature\n");
        std::fs::write(temp.path().join("a"), "dirty\n").unwrap();

        let err = switch_branch(&repo, "main", false).unwrap_err();
        assert!(err.to_string().contains("would be overwritten"));
        assert_eq!(current_branch(&repo).unwrap().as_deref(), Some("feature"));
        assert_eq!(std::fs::read_to_string(temp.path().join("a")).unwrap(), "dirty\n");
    }

    #[test]
    fn delete_requires_merge_unless_forced() {
        let (temp, repo) = fixture();
        commit_file(&temp, &repo, "a", "a\n");
        switch_branch(&repo, "topic", true).unwrap();
        commit_file(&temp, &repo, "b", "b\n");
        switch_branch(&repo, "main", false).unwrap();

        let err = delete_branch(&repo, "topic", false).unwrap_err();
        assert!(err.to_string().contains("not fully merged"));
        delete_branch(&repo, "topic", true).unwrap();
        assert!(repo.find_branch("topic", BranchType::Local).is_err());

        let err = delete_branch(&repo, "main", true).unwrap_err();
        assert!(err.to_string().contains("cannot delete branch 'main'"));
    }

    #[test]
    fn invalid_names_and_duplicates_are_rejected() {
        let (temp, repo) = fixture();
        commit_file(&temp, &repo, "a", "a\n");
        assert!(create_branch(&repo, "bad..name", None).is_err());
        create_branch(&repo, "dup", None).unwrap();
        assert!(create_branch(&repo, "dup", None)
            .unwrap_err()
            .to_string()
            .contains("already exists"));
    }

    #[test]
    fn detached_checkout_of_previous_commit() {
        let (temp, repo) = fixture();
        let first = commit_file(&temp, &repo, "a", "one\n");
        commit_file(&temp, &repo, "a", "two\n");

        let outcome = checkout_detached(&repo, "HEAD~1").unwrap();
        assert_eq!(outcome.to, short_hash(first));
        assert_eq!(head_oid(&repo).unwrap(), Some(first));
        assert_eq!(current_branch(&repo).unwrap(), None);
        assert_eq!(std::fs::read_to_string(temp.path().join("a")).unwrap(), "one\n");
    }
}

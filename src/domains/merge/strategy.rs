use git2::{ErrorCode, MergeOptions, Oid, Repository};
use log::debug;
use std::collections::BTreeSet;

use crate::errors::SandboxError;

const OPERATION_LABEL: &str = "merge_plan";
const CONFLICT_SAMPLE_LIMIT: usize = 20;

/// How `theirs` can be brought into `ours`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    /// `theirs` is already reachable from `ours`.
    UpToDate,
    /// `ours` is an ancestor of `theirs`; the ref can simply advance.
    FastForward(Oid),
    /// A clean three-way merge produced this tree.
    Merge { tree: Oid },
}

/// Computes the merge of two commits without touching refs or any worktree.
/// Content conflicts fail with [`SandboxError::MergeConflict`]; unrelated
/// histories are refused.
pub fn plan_merge(repo: &Repository, ours: Oid, theirs: Oid) -> Result<MergePlan, SandboxError> {
    if ours == theirs {
        return Ok(MergePlan::UpToDate);
    }

    let base = match repo.merge_base(ours, theirs) {
        Ok(base) => base,
        Err(e) if e.code() == ErrorCode::NotFound => {
            return Err(SandboxError::conflict(
                "fatal: refusing to merge unrelated histories",
            ));
        }
        Err(e) => return Err(SandboxError::git("merge-base", e)),
    };
    debug!("{OPERATION_LABEL}: ours={ours} theirs={theirs} base={base}");

    if base == theirs {
        return Ok(MergePlan::UpToDate);
    }
    if base == ours {
        return Ok(MergePlan::FastForward(theirs));
    }

    let ours_commit = repo
        .find_commit(ours)
        .map_err(|e| SandboxError::git("merge", e))?;
    let theirs_commit = repo
        .find_commit(theirs)
        .map_err(|e| SandboxError::git("merge", e))?;

    let mut opts = MergeOptions::new();
    opts.fail_on_conflict(false);
    let mut index = repo
        .merge_commits(&ours_commit, &theirs_commit, Some(&opts))
        .map_err(|e| SandboxError::git("merge", e))?;

    if index.has_conflicts() {
        let files = collect_conflicting_paths(&index)?;
        return Err(SandboxError::MergeConflict {
            files,
            message: "Automatic merge failed; conflicts must be resolved manually".to_string(),
        });
    }

    let tree = index
        .write_tree_to(repo)
        .map_err(|e| SandboxError::git("write merge tree", e))?;
    Ok(MergePlan::Merge { tree })
}

pub fn collect_conflicting_paths(index: &git2::Index) -> Result<Vec<String>, SandboxError> {
    let mut seen = BTreeSet::new();
    let conflicts = index
        .conflicts()
        .map_err(|e| SandboxError::git("read merge conflicts", e))?;

    for conflict in conflicts {
        let conflict = conflict.map_err(|e| SandboxError::git("read merge conflicts", e))?;
        let path = conflict
            .our
            .as_ref()
            .and_then(index_entry_path)
            .or_else(|| conflict.their.as_ref().and_then(index_entry_path))
            .or_else(|| conflict.ancestor.as_ref().and_then(index_entry_path));

        if let Some(path) = path {
            seen.insert(path);
            if seen.len() == CONFLICT_SAMPLE_LIMIT {
                break;
            }
        }
    }

    Ok(seen.into_iter().collect())
}

fn index_entry_path(entry: &git2::IndexEntry) -> Option<String> {
    std::str::from_utf8(entry.path.as_ref())
        .ok()
        .map(|s| s.trim_end_matches(char::from(0)).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Signature};
    use tempfile::TempDir;

    fn commit_tree(repo: &Repository, files: &[(&str, &str)], parents: &[Oid]) -> Oid {
        let mut builder = repo.treebuilder(None).unwrap();
        for (name, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(name, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit> = parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        repo.commit(None, &sig, &sig, "c", &tree, &parent_refs).unwrap()
    }

    fn repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path()).unwrap();
        (temp, repo)
    }

    #[test]
    fn classifies_ancestry() {
        let (_temp, repo) = repo();
        let base = commit_tree(&repo, &[("f", "1\n")], &[]);
        let next = commit_tree(&repo, &[("f", "2\n")], &[base]);

        assert_eq!(plan_merge(&repo, base, base).unwrap(), MergePlan::UpToDate);
        assert_eq!(plan_merge(&repo, next, base).unwrap(), MergePlan::UpToDate);
        assert_eq!(
            plan_merge(&repo, base, next).unwrap(),
            MergePlan::FastForward(next)
        );
    }

    #[test]
    fn clean_divergence_produces_merged_tree() {
        let (_temp, repo) = repo();
        let base = commit_tree(&repo, &[("a", "a\n"), ("b", "b\n")], &[]);
        let ours = commit_tree(&repo, &[("a", "A\n"), ("b", "b\n")], &[base]);
        let theirs = commit_tree(&repo, &[("a", "a\n"), ("b", "B\n")], &[base]);

        let MergePlan::Merge { tree } = plan_merge(&repo, ours, theirs).unwrap() else {
            panic!("expected a merge");
        };
        let tree = repo.find_tree(tree).unwrap();
        let content = |name: &str| {
            let blob = repo
                .find_blob(tree.get_name(name).unwrap().id())
                .unwrap();
            String::from_utf8(blob.content().to_vec()).unwrap()
        };
        assert_eq!(content("a"), "A\n");
        assert_eq!(content("b"), "B\n");
    }

    #[test]
    fn conflicting_edits_are_reported() {
        let (_temp, repo) = repo();
        let base = commit_tree(&repo, &[("f", "base\n")], &[]);
        let ours = commit_tree(&repo, &[("f", "ours\n")], &[base]);
        let theirs = commit_tree(&repo, &[("f", "theirs\n")], &[base]);

        match plan_merge(&repo, ours, theirs).unwrap_err() {
            SandboxError::MergeConflict { files, .. } => assert_eq!(files, vec!["f"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unrelated_histories_are_refused() {
        let (_temp, repo) = repo();
        let left = commit_tree(&repo, &[("l", "l\n")], &[]);
        let right = commit_tree(&repo, &[("r", "r\n")], &[]);
        let err = plan_merge(&repo, left, right).unwrap_err();
        assert!(err.to_string().contains("unrelated histories"));
    }
}

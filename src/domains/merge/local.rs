use git2::{Oid, Repository, Signature};
use log::debug;

use super::strategy::{MergePlan, plan_merge};
use crate::domains::git::branches::{checkout_commit, checkout_object};
use crate::domains::git::repository::{advance_head, head_oid, short_hash};
use crate::errors::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMergeOutcome {
    UpToDate,
    FastForward { from: Option<Oid>, to: Oid },
    Merged { commit: Oid },
}

impl LocalMergeOutcome {
    pub fn head(&self) -> Option<Oid> {
        match self {
            Self::UpToDate => None,
            Self::FastForward { to, .. } => Some(*to),
            Self::Merged { commit } => Some(*commit),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::UpToDate => "Already up to date.".to_string(),
            Self::FastForward { from: Some(from), to } => {
                format!("Updating {}..{}\nFast-forward", short_hash(*from), short_hash(*to))
            }
            Self::FastForward { from: None, to } => format!("Fast-forward to {}", short_hash(*to)),
            Self::Merged { .. } => "Merge made by the 'ort' strategy.".to_string(),
        }
    }
}

/// Merges `theirs` into the checked-out branch of a worktree repository.
///
/// The worktree is updated with a safe checkout before any ref moves, so
/// local modifications that would be overwritten abort the merge with the
/// repository untouched.
pub fn merge_into_head(
    repo: &Repository,
    theirs: Oid,
    message: &str,
    signature: &Signature<'_>,
) -> Result<LocalMergeOutcome, SandboxError> {
    let theirs_commit = repo
        .find_commit(theirs)
        .map_err(|e| SandboxError::git("merge", e))?;

    let Some(ours) = head_oid(repo)? else {
        checkout_commit(repo, &theirs_commit)?;
        advance_head(repo, theirs, message)?;
        return Ok(LocalMergeOutcome::FastForward {
            from: None,
            to: theirs,
        });
    };

    match plan_merge(repo, ours, theirs)? {
        MergePlan::UpToDate => Ok(LocalMergeOutcome::UpToDate),
        MergePlan::FastForward(target) => {
            checkout_commit(repo, &theirs_commit)?;
            advance_head(repo, target, message)?;
            debug!("Fast-forwarded HEAD from {ours} to {target}");
            Ok(LocalMergeOutcome::FastForward {
                from: Some(ours),
                to: target,
            })
        }
        MergePlan::Merge { tree } => {
            let tree = repo
                .find_tree(tree)
                .map_err(|e| SandboxError::git("merge", e))?;
            checkout_object(repo, tree.as_object())?;

            let ours_commit = repo
                .find_commit(ours)
                .map_err(|e| SandboxError::git("merge", e))?;
            let commit = repo
                .commit(
                    None,
                    signature,
                    signature,
                    message,
                    &tree,
                    &[&ours_commit, &theirs_commit],
                )
                .map_err(|e| SandboxError::git("create merge commit", e))?;
            advance_head(repo, commit, message)?;
            debug!("Created merge commit {commit} on top of {ours}");
            Ok(LocalMergeOutcome::Merged { commit })
        }
    }
}

use git2::{Commit, Oid, Repository, Signature};
use log::debug;

use super::repository::{advance_head, head_commit};
use crate::errors::SandboxError;

#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    pub message: Option<String>,
    pub amend: bool,
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Initial,
    Normal,
    Amend,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub oid: Oid,
    pub kind: CommitKind,
    pub summary: String,
}

impl CommitOutcome {
    pub fn reflog_message(&self) -> String {
        match self.kind {
            CommitKind::Initial => format!("commit (initial): {}", self.summary),
            CommitKind::Normal => format!("commit: {}", self.summary),
            CommitKind::Amend => format!("commit (amend): {}", self.summary),
        }
    }
}

fn summary_of(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}

/// Records the index as a new commit on HEAD.
///
/// Fails before touching any ref when there is nothing to commit, when the
/// index has unresolved conflicts, or when amending without a HEAD commit.
pub fn create_commit(
    repo: &Repository,
    signature: &Signature<'_>,
    request: &CommitRequest,
) -> Result<CommitOutcome, SandboxError> {
    let mut index = repo
        .index()
        .map_err(|e| SandboxError::git("read index", e))?;
    if index.has_conflicts() {
        return Err(SandboxError::conflict(
            "error: Committing is not possible because you have unmerged files.",
        ));
    }

    let head = head_commit(repo)?;
    let tree_id = index
        .write_tree()
        .map_err(|e| SandboxError::git("write tree", e))?;

    let (kind, parents, message): (CommitKind, Vec<Commit<'_>>, String) = if request.amend {
        let Some(head) = head.as_ref() else {
            return Err(SandboxError::conflict("fatal: You have nothing to amend."));
        };
        let message = match &request.message {
            Some(message) => message.clone(),
            None => head.message().unwrap_or_default().to_string(),
        };
        (CommitKind::Amend, head.parents().collect(), message)
    } else {
        let message = request
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                SandboxError::invalid_input("", "Aborting commit due to empty commit message.")
            })?;

        let unchanged = match head.as_ref() {
            Some(head) => head.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged && !request.allow_empty {
            return Err(SandboxError::conflict(
                "nothing to commit, working tree clean\n(use 'git commit --allow-empty -m <message>' to record an empty commit)",
            ));
        }

        match head {
            Some(head) => (CommitKind::Normal, vec![head], message),
            None => (CommitKind::Initial, Vec::new(), message),
        }
    };

    let tree = repo
        .find_tree(tree_id)
        .map_err(|e| SandboxError::git("load tree", e))?;
    let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
    let oid = repo
        .commit(None, signature, signature, &message, &tree, &parent_refs)
        .map_err(|e| SandboxError::git("commit", e))?;

    let outcome = CommitOutcome {
        oid,
        kind,
        summary: summary_of(&message),
    };
    advance_head(repo, oid, &outcome.reflog_message())?;
    debug!("Created {:?} commit {oid}", outcome.kind);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::repository::{RepoHandle, head_oid};
    use crate::domains::git::staging::{StageRequest, stage};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository, Signature<'static>) {
        let temp = TempDir::new().unwrap();
        let repo = RepoHandle::init("/", temp.path(), "main")
            .unwrap()
            .open()
            .unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        (temp, repo, sig)
    }

    fn request(message: &str) -> CommitRequest {
        CommitRequest {
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn initial_then_normal_commit() {
        let (temp, repo, sig) = fixture();
        std::fs::write(temp.path().join("f"), "one\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        let first = create_commit(&repo, &sig, &request("first\n\nbody")).unwrap();
        assert_eq!(first.kind, CommitKind::Initial);
        assert_eq!(first.reflog_message(), "commit (initial): first");

        std::fs::write(temp.path().join("f"), "two\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        let second = create_commit(&repo, &sig, &request("second")).unwrap();
        assert_eq!(second.kind, CommitKind::Normal);

        let commit = repo.find_commit(second.oid).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), first.oid);
    }

    #[test]
    fn clean_tree_commit_fails_without_side_effects() {
        let (temp, repo, sig) = fixture();
        std::fs::write(temp.path().join("f"), "one\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        let first = create_commit(&repo, &sig, &request("first")).unwrap();

        let err = create_commit(&repo, &sig, &request("again")).unwrap_err();
        assert!(err.to_string().contains("--allow-empty"));
        assert_eq!(head_oid(&repo).unwrap(), Some(first.oid));

        let allowed = create_commit(
            &repo,
            &sig,
            &CommitRequest {
                allow_empty: true,
                ..request("empty")
            },
        )
        .unwrap();
        assert_ne!(allowed.oid, first.oid);
    }

    #[test]
    fn unborn_branch_with_empty_index_has_nothing_to_commit() {
        let (_temp, repo, sig) = fixture();
        let err = create_commit(&repo, &sig, &request("nothing")).unwrap_err();
        assert!(err.to_string().starts_with("nothing to commit"));
        assert!(head_oid(&repo).unwrap().is_none());
    }

    #[test]
    fn amend_reuses_parents_and_message() {
        let (temp, repo, sig) = fixture();
        std::fs::write(temp.path().join("f"), "one\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        let base = create_commit(&repo, &sig, &request("base")).unwrap();
        std::fs::write(temp.path().join("f"), "two\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        let tip = create_commit(&repo, &sig, &request("tip")).unwrap();

        let amended = create_commit(
            &repo,
            &sig,
            &CommitRequest {
                amend: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(amended.kind, CommitKind::Amend);
        assert_ne!(amended.oid, tip.oid);
        let commit = repo.find_commit(amended.oid).unwrap();
        assert_eq!(commit.message(), Some("tip"));
        assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![base.oid]);
        assert_eq!(head_oid(&repo).unwrap(), Some(amended.oid));
    }

    #[test]
    fn amend_without_history_is_rejected() {
        let (_temp, repo, sig) = fixture();
        let err = create_commit(
            &repo,
            &sig,
            &CommitRequest {
                amend: true,
                message: Some("x".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("nothing to amend"));
    }
}

use chrono::{DateTime, FixedOffset};
use git2::{Oid, Repository, Sort};

use super::repository::{current_branch, head_oid, resolve_commit};
use crate::errors::SandboxError;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub oid: Oid,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<FixedOffset>,
    pub message: String,
}

impl LogEntry {
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

fn commit_time(time: git2::Time) -> DateTime<FixedOffset> {
    let utc = DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default();
    match FixedOffset::east_opt(time.offset_minutes() * 60) {
        Some(offset) => utc.with_timezone(&offset),
        None => utc.fixed_offset(),
    }
}

/// Commits reachable from `start` (HEAD when `None`), newest first.
pub fn walk_history(
    repo: &Repository,
    start: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>, SandboxError> {
    let start_oid = match start {
        Some(spec) => resolve_commit(repo, spec)?.id(),
        None => match head_oid(repo)? {
            Some(oid) => oid,
            None => {
                let branch = current_branch(repo)?.unwrap_or_else(|| "HEAD".to_string());
                return Err(SandboxError::conflict(format!(
                    "fatal: your current branch '{branch}' does not have any commits yet"
                )));
            }
        },
    };

    let mut walk = repo
        .revwalk()
        .map_err(|e| SandboxError::git("log", e))?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(|e| SandboxError::git("log", e))?;
    walk.push(start_oid)
        .map_err(|e| SandboxError::git("log", e))?;

    let mut entries = Vec::new();
    for oid in walk {
        if limit.is_some_and(|max| entries.len() >= max) {
            break;
        }
        let oid = oid.map_err(|e| SandboxError::git("log", e))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| SandboxError::git("log", e))?;
        let author = commit.author();
        entries.push(LogEntry {
            oid,
            author_name: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            time: commit_time(commit.time()),
            message: commit.message().unwrap_or_default().to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::commits::{CommitRequest, create_commit};
    use crate::domains::git::repository::RepoHandle;
    use git2::Signature;
    use tempfile::TempDir;

    #[test]
    fn walks_newest_first_and_honours_limit() {
        let temp = TempDir::new().unwrap();
        let repo = RepoHandle::init("/", temp.path(), "main")
            .unwrap()
            .open()
            .unwrap();
        let sig = Signature::now("Ada", "ada@example.com").unwrap();
        for message in ["one", "two", "three"] {
            create_commit(
                &repo,
                &sig,
                &CommitRequest {
                    message: Some(message.to_string()),
                    allow_empty: true,
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let all = walk_history(&repo, None, None).unwrap();
        let summaries: Vec<&str> = all.iter().map(LogEntry::summary).collect();
        assert_eq!(summaries, vec!["three", "two", "one"]);
        assert_eq!(all[0].author_name, "Ada");

        let limited = walk_history(&repo, None, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);

        let from_parent = walk_history(&repo, Some("HEAD~1"), None).unwrap();
        assert_eq!(from_parent[0].summary(), "two");
    }

    #[test]
    fn unborn_branch_reports_no_commits() {
        let temp = TempDir::new().unwrap();
        let repo = RepoHandle::init("/", temp.path(), "main")
            .unwrap()
            .open()
            .unwrap();
        let err = walk_history(&repo, None, None).unwrap_err();
        assert!(err.to_string().contains("'main' does not have any commits yet"));
    }
}

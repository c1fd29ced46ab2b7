use git2::{Index, IndexAddOption, IndexMatchedPath, Repository};
use std::path::Path;

use crate::errors::SandboxError;

/// What `git add` was asked to stage, with paths already made
/// repository-relative ("" is the repository root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    All,
    Paths(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub cached: bool,
    pub recursive: bool,
}

enum StagePlan {
    File(String),
    Directory(String),
    Deletion(String),
}

fn pathspec_error(path: &str) -> SandboxError {
    SandboxError::invalid_input(
        "",
        format!("fatal: pathspec '{path}' did not match any files"),
    )
}

fn workdir(repo: &Repository) -> Result<&Path, SandboxError> {
    repo.workdir()
        .ok_or_else(|| SandboxError::conflict("fatal: this operation must be run in a work tree"))
}

fn open_index(repo: &Repository) -> Result<Index, SandboxError> {
    repo.index().map_err(|e| SandboxError::git("read index", e))
}

fn tracked_under(index: &Index, prefix: &str) -> Vec<String> {
    index
        .iter()
        .filter_map(|entry| String::from_utf8(entry.path).ok())
        .filter(|path| {
            prefix.is_empty()
                || path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
        .collect()
}

fn is_nested_repo(workdir: &Path, relative: &Path) -> bool {
    let candidate = workdir.join(relative);
    candidate.is_dir() && candidate.join(".git").exists()
}

fn embedded_repo_error(path: &str) -> SandboxError {
    SandboxError::invalid_input(
        "",
        format!(
            "error: '{path}' is an embedded git repository and cannot be added\nhint: clone it separately or remove its .git directory"
        ),
    )
}

fn directory_specs(relative: &str) -> Vec<String> {
    if relative.is_empty() {
        vec!["*".to_string()]
    } else {
        vec![relative.to_string(), format!("{relative}/*")]
    }
}

/// Stages the request into the index. Every pathspec is validated before the
/// index is touched, so a bad path leaves the index exactly as it was.
pub fn stage(repo: &Repository, request: &StageRequest) -> Result<(), SandboxError> {
    let workdir = workdir(repo)?.to_path_buf();
    let mut index = open_index(repo)?;

    let plan: Vec<StagePlan> = match request {
        StageRequest::All => vec![StagePlan::Directory(String::new())],
        StageRequest::Paths(paths) => {
            if paths.is_empty() {
                return Err(SandboxError::invalid_input(
                    "",
                    "Nothing specified, nothing added.\nMaybe you wanted to say 'git add .'?",
                ));
            }
            let mut plan = Vec::with_capacity(paths.len());
            for path in paths {
                let host = workdir.join(path);
                if !path.is_empty() && is_nested_repo(&workdir, Path::new(path)) {
                    return Err(embedded_repo_error(path));
                }
                if path.is_empty() || host.is_dir() {
                    plan.push(StagePlan::Directory(path.clone()));
                } else if host.is_file() {
                    plan.push(StagePlan::File(path.clone()));
                } else if !tracked_under(&index, path).is_empty() {
                    plan.push(StagePlan::Deletion(path.clone()));
                } else {
                    return Err(pathspec_error(path));
                }
            }
            plan
        }
    };

    for step in plan {
        match step {
            StagePlan::File(path) => index
                .add_path(Path::new(&path))
                .map_err(|e| SandboxError::git("add", e))?,
            StagePlan::Directory(path) => {
                let specs = directory_specs(&path);
                let mut skip_nested = |matched: &Path, _spec: &[u8]| -> i32 {
                    i32::from(is_nested_repo(&workdir, matched))
                };
                index
                    .add_all(
                        specs.iter().map(String::as_str),
                        IndexAddOption::DEFAULT,
                        Some(&mut skip_nested as &mut IndexMatchedPath<'_>),
                    )
                    .map_err(|e| SandboxError::git("add", e))?;
                index
                    .update_all(specs.iter().map(String::as_str), None)
                    .map_err(|e| SandboxError::git("add", e))?;
            }
            StagePlan::Deletion(path) => {
                for tracked in tracked_under(&index, &path) {
                    index
                        .remove_path(Path::new(&tracked))
                        .map_err(|e| SandboxError::git("add", e))?;
                }
            }
        }
    }

    index.write().map_err(|e| SandboxError::git("write index", e))
}

/// `git rm`. Returns the index paths that were removed.
///
/// With `cached` the working-tree files are left untouched.
pub fn remove(
    repo: &Repository,
    paths: &[String],
    options: RemoveOptions,
) -> Result<Vec<String>, SandboxError> {
    let workdir = workdir(repo)?.to_path_buf();
    let mut index = open_index(repo)?;

    if paths.is_empty() {
        return Err(SandboxError::invalid_input(
            "",
            "usage: git rm [--cached] [-r] <pathspec>...",
        ));
    }

    let mut targets = Vec::new();
    for path in paths {
        let matched = tracked_under(&index, path);
        if matched.is_empty() {
            return Err(pathspec_error(path));
        }
        let is_directory = !(matched.len() == 1 && &matched[0] == path);
        if is_directory && !options.recursive {
            return Err(SandboxError::invalid_input(
                "",
                format!("fatal: not removing '{path}' recursively without -r"),
            ));
        }
        targets.extend(matched);
    }
    targets.sort();
    targets.dedup();

    if !options.cached {
        for target in &targets {
            let host = workdir.join(target);
            if host.is_file() {
                std::fs::remove_file(&host)
                    .map_err(|e| SandboxError::io("remove file", target, e))?;
            }
            prune_empty_parents(&workdir, &host);
        }
    }

    for target in &targets {
        index
            .remove_path(Path::new(target))
            .map_err(|e| SandboxError::git("rm", e))?;
    }
    index
        .write()
        .map_err(|e| SandboxError::git("write index", e))?;

    Ok(targets)
}

fn prune_empty_parents(workdir: &Path, removed: &Path) {
    let mut current = removed.parent();
    while let Some(dir) = current {
        if dir == workdir || !dir.starts_with(workdir) {
            break;
        }
        // remove_dir only succeeds on empty directories
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::repository::RepoHandle;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let handle = RepoHandle::init("/", temp.path(), "main").unwrap();
        let repo = handle.open().unwrap();
        (temp, repo)
    }

    fn index_paths(repo: &Repository) -> Vec<String> {
        let index = repo.index().unwrap();
        tracked_under(&index, "")
    }

    #[test]
    fn stage_all_adds_nested_files_and_skips_inner_repositories() {
        let (temp, repo) = fixture();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "fn main() {}\n").unwrap();
        std::fs::write(temp.path().join("README"), "hi\n").unwrap();
        RepoHandle::init("/inner", &temp.path().join("inner"), "main").unwrap();
        std::fs::write(temp.path().join("inner/x"), "x\n").unwrap();

        stage(&repo, &StageRequest::All).unwrap();

        assert_eq!(index_paths(&repo), vec!["README", "src/lib.rs"]);
    }

    #[test]
    fn explicitly_adding_an_inner_repository_is_refused() {
        let (temp, repo) = fixture();
        std::fs::write(temp.path().join("top"), "t\n").unwrap();
        RepoHandle::init("/inner", &temp.path().join("inner"), "main").unwrap();
        std::fs::write(temp.path().join("inner/x"), "x\n").unwrap();

        let err = stage(
            &repo,
            &StageRequest::Paths(vec!["top".to_string(), "inner".to_string()]),
        )
        .unwrap_err();

        assert!(err.to_string().contains("'inner' is an embedded git repository"));
        assert!(index_paths(&repo).is_empty());
    }

    #[test]
    fn unmatched_pathspec_aborts_without_staging_anything() {
        let (temp, repo) = fixture();
        std::fs::write(temp.path().join("a"), "a\n").unwrap();

        let err = stage(
            &repo,
            &StageRequest::Paths(vec!["a".to_string(), "missing".to_string()]),
        )
        .unwrap_err();

        assert!(err.to_string().contains("pathspec 'missing'"));
        assert!(index_paths(&repo).is_empty());
    }

    #[test]
    fn empty_pathspec_list_suggests_add_dot() {
        let (_temp, repo) = fixture();
        let err = stage(&repo, &StageRequest::Paths(Vec::new())).unwrap_err();
        assert!(err.to_string().starts_with("Nothing specified, nothing added."));
    }

    #[test]
    fn staging_a_deleted_path_removes_it_from_the_index() {
        let (temp, repo) = fixture();
        std::fs::write(temp.path().join("a"), "a\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();
        std::fs::remove_file(temp.path().join("a")).unwrap();

        stage(&repo, &StageRequest::Paths(vec!["a".to_string()])).unwrap();
        assert!(index_paths(&repo).is_empty());
    }

    #[test]
    fn cached_removal_keeps_worktree_file() {
        let (temp, repo) = fixture();
        std::fs::write(temp.path().join("keep"), "k\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();

        let removed = remove(
            &repo,
            &["keep".to_string()],
            RemoveOptions {
                cached: true,
                recursive: false,
            },
        )
        .unwrap();

        assert_eq!(removed, vec!["keep"]);
        assert!(temp.path().join("keep").exists());
        assert!(index_paths(&repo).is_empty());
    }

    #[test]
    fn directory_removal_requires_recursive_flag() {
        let (temp, repo) = fixture();
        std::fs::create_dir_all(temp.path().join("dir")).unwrap();
        std::fs::write(temp.path().join("dir/a"), "a\n").unwrap();
        stage(&repo, &StageRequest::All).unwrap();

        let err = remove(&repo, &["dir".to_string()], RemoveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("recursively without -r"));

        remove(
            &repo,
            &["dir".to_string()],
            RemoveOptions {
                cached: false,
                recursive: true,
            },
        )
        .unwrap();
        assert!(!temp.path().join("dir").exists());
        assert!(index_paths(&repo).is_empty());
    }
}

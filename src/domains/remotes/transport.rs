use git2::build::RepoBuilder;
use git2::{BranchType, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository};
use log::{debug, info};
use std::path::Path;

use super::registry::SharedRemote;
use crate::domains::git::repository::{head_oid, short_hash};
use crate::errors::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub reference: String,
    pub old: Option<Oid>,
    pub new: Oid,
}

impl RefUpdate {
    pub fn describe(&self, local_name: &str, remote_name: &str) -> String {
        match self.old {
            None => format!(" * [new branch]      {local_name} -> {remote_name}"),
            Some(old) if old == self.new => {
                format!(" = [up to date]      {local_name} -> {remote_name}")
            }
            Some(old) => format!(
                "   {}..{}  {local_name} -> {remote_name}",
                short_hash(old),
                short_hash(self.new)
            ),
        }
    }
}

/// Clones `remote` into `dest` (a host directory that must not exist yet or
/// be empty). An empty remote yields a repository whose unborn HEAD points at
/// `default_branch`.
pub fn clone_remote(
    remote: &SharedRemote,
    dest: &Path,
    default_branch: &str,
) -> Result<Repository, SandboxError> {
    let _guard = remote.lock();
    let repo = RepoBuilder::new()
        .clone(&remote.url(), dest)
        .map_err(|e| SandboxError::git("clone", e))?;

    if head_oid(&repo)?.is_none() {
        repo.set_head(&format!("refs/heads/{default_branch}"))
            .map_err(|e| SandboxError::git("clone", e))?;
    }
    info!("Cloned shared remote '{}' into {}", remote.name(), dest.display());
    Ok(repo)
}

/// Pushes `branch` to the same-named branch on `shared` through the local
/// remote called `remote_name`. Non fast-forward updates are rejected unless
/// `force` is set.
pub fn push_branch(
    repo: &Repository,
    shared: &SharedRemote,
    remote_name: &str,
    branch: &str,
    force: bool,
) -> Result<RefUpdate, SandboxError> {
    let reference = format!("refs/heads/{branch}");
    let local = repo
        .find_reference(&reference)
        .ok()
        .and_then(|r| r.target())
        .ok_or_else(|| {
            SandboxError::invalid_input(
                "",
                format!("error: src refspec {branch} does not match any"),
            )
        })?;

    let _guard = shared.lock();
    let current = shared
        .open()?
        .find_reference(&reference)
        .ok()
        .and_then(|r| r.target());

    let update = RefUpdate {
        reference: reference.clone(),
        old: current,
        new: local,
    };
    if current == Some(local) {
        return Ok(update);
    }

    if let Some(old) = current
        && !force
    {
        let known = repo.find_commit(old).is_ok();
        let fast_forward = known
            && repo
                .graph_descendant_of(local, old)
                .map_err(|e| SandboxError::git("push", e))?;
        if !fast_forward {
            let hint = if known { "non-fast-forward" } else { "fetch first" };
            return Err(SandboxError::conflict(format!(
                " ! [rejected]        {branch} -> {branch} ({hint})\nerror: failed to push some refs to '{}'",
                shared.name()
            )));
        }
    }

    let mut remote = repo
        .find_remote(remote_name)
        .map_err(|e| SandboxError::git("push", e))?;
    let mut rejection: Option<String> = None;
    {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                rejection = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        let refspec = format!("+{reference}:{reference}");
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(|e| SandboxError::git("push", e))?;
    }
    if let Some(message) = rejection {
        return Err(SandboxError::git("push", message));
    }

    repo.reference(
        &format!("refs/remotes/{remote_name}/{branch}"),
        local,
        true,
        "update by push",
    )
    .map_err(|e| SandboxError::git("push", e))?;
    debug!("Pushed {branch} to shared remote '{}'", shared.name());
    Ok(update)
}

/// Fetches every branch of `shared` into `refs/remotes/<remote_name>/*`.
pub fn fetch_remote(
    repo: &Repository,
    shared: &SharedRemote,
    remote_name: &str,
) -> Result<Vec<RefUpdate>, SandboxError> {
    let mut remote = repo
        .find_remote(remote_name)
        .map_err(|e| SandboxError::git("fetch", e))?;

    let _guard = shared.lock();
    let mut updates = Vec::new();
    {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.update_tips(|refname, old, new| {
            updates.push(RefUpdate {
                reference: refname.to_string(),
                old: (!old.is_zero()).then_some(old),
                new,
            });
            true
        });
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(|e| SandboxError::git("fetch", e))?;
    }
    Ok(updates)
}

/// Marks `branch` as tracking `<remote_name>/<branch>`.
pub fn set_upstream(
    repo: &Repository,
    remote_name: &str,
    branch: &str,
) -> Result<(), SandboxError> {
    let mut local = repo
        .find_branch(branch, BranchType::Local)
        .map_err(|e| SandboxError::git("set upstream", e))?;
    local
        .set_upstream(Some(&format!("{remote_name}/{branch}")))
        .map_err(|e| SandboxError::git("set upstream", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::commits::{CommitRequest, create_commit};
    use crate::domains::git::repository::RepoHandle;
    use crate::domains::git::staging::{StageRequest, stage};
    use crate::domains::remotes::registry::RemoteRegistry;
    use git2::Signature;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        registry: RemoteRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let registry = RemoteRegistry::new(temp.path().join("remotes"), "main");
            Self { temp, registry }
        }

        fn workspace(&self, name: &str) -> Repository {
            RepoHandle::init("/", &self.temp.path().join(name), "main")
                .unwrap()
                .open()
                .unwrap()
        }
    }

    fn commit(repo: &Repository, file: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(file), content).unwrap();
        stage(repo, &StageRequest::All).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        create_commit(
            repo,
            &sig,
            &CommitRequest {
                message: Some(format!("edit {file}")),
                ..Default::default()
            },
        )
        .unwrap()
        .oid
    }

    #[test]
    fn push_then_clone_round_trips_history() {
        let fx = Fixture::new();
        let shared = fx.registry.create("team", None).unwrap();
        let alice = fx.workspace("alice");
        alice.remote("origin", &shared.url()).unwrap();
        let tip = commit(&alice, "a.txt", "hello\n");

        let update = push_branch(&alice, &shared, "origin", "main", false).unwrap();
        assert_eq!(update.old, None);
        assert_eq!(shared.branches().unwrap(), vec!["main"]);
        assert_eq!(
            alice.find_reference("refs/remotes/origin/main").unwrap().target(),
            Some(tip)
        );

        let bob = clone_remote(&shared, &fx.temp.path().join("bob"), "main").unwrap();
        assert_eq!(head_oid(&bob).unwrap(), Some(tip));
        assert_eq!(
            std::fs::read_to_string(fx.temp.path().join("bob/a.txt")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn clone_of_empty_remote_keeps_default_branch() {
        let fx = Fixture::new();
        let shared = fx.registry.create("empty", None).unwrap();
        let repo = clone_remote(&shared, &fx.temp.path().join("c"), "main").unwrap();
        let head = repo.find_reference("HEAD").unwrap();
        assert_eq!(head.symbolic_target(), Some("refs/heads/main"));
    }

    #[test]
    fn diverged_push_is_rejected_unless_forced() {
        let fx = Fixture::new();
        let shared = fx.registry.create("team", None).unwrap();
        let alice = fx.workspace("alice");
        alice.remote("origin", &shared.url()).unwrap();
        commit(&alice, "a.txt", "base\n");
        push_branch(&alice, &shared, "origin", "main", false).unwrap();

        let bob = clone_remote(&shared, &fx.temp.path().join("bob"), "main").unwrap();
        commit(&bob, "b.txt", "bob\n");
        push_branch(&bob, &shared, "origin", "main", false).unwrap();

        commit(&alice, "a.txt", "alice\n");
        let err = push_branch(&alice, &shared, "origin", "main", false).unwrap_err();
        assert!(err.to_string().contains("[rejected]"));

        let forced = push_branch(&alice, &shared, "origin", "main", true).unwrap();
        assert_eq!(
            shared.open().unwrap().find_reference("refs/heads/main").unwrap().target(),
            Some(forced.new)
        );
    }

    #[test]
    fn fetch_reports_new_remote_branches() {
        let fx = Fixture::new();
        let shared = fx.registry.create("team", None).unwrap();
        let alice = fx.workspace("alice");
        alice.remote("origin", &shared.url()).unwrap();
        let tip = commit(&alice, "a.txt", "a\n");
        push_branch(&alice, &shared, "origin", "main", false).unwrap();

        let carol = fx.workspace("carol");
        carol.remote("origin", &shared.url()).unwrap();
        let updates = fetch_remote(&carol, &shared, "origin").unwrap();

        let main = updates
            .iter()
            .find(|u| u.reference == "refs/remotes/origin/main")
            .unwrap();
        assert_eq!(main.old, None);
        assert_eq!(main.new, tip);
    }

    #[test]
    fn pushing_unknown_branch_fails() {
        let fx = Fixture::new();
        let shared = fx.registry.create("team", None).unwrap();
        let alice = fx.workspace("alice");
        alice.remote("origin", &shared.url()).unwrap();
        let err = push_branch(&alice, &shared, "origin", "nope", false).unwrap_err();
        assert!(err.to_string().contains("src refspec nope"));
    }
}

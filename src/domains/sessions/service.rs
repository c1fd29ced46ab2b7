use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::entity::{Session, SessionProfile, SessionState, SessionSummary};
use super::filesystem::SessionFs;
use super::workspace::{WorkspaceNode, workspace_tree};
use crate::commands::{CommandDispatcher, CommandRegistry};
use crate::domains::merge::{NewPullRequest, PrMergeOutcome, PullRequest, PullRequestEngine};
use crate::domains::remotes::{RemoteInfo, RemoteRegistry};
use crate::domains::settings::Settings;
use crate::errors::SandboxError;
use crate::shared::blocking::run_blocking;

/// Owns the session table, the shared remotes and the pull requests.
///
/// The session map lock is only held for lookups and inserts/removals.
/// Command execution, remote I/O and pull request merges all run after the
/// map lock has been released, so one busy session never stalls another.
pub struct SessionManager {
    settings: Settings,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    remotes: Arc<RemoteRegistry>,
    pull_requests: Arc<PullRequestEngine>,
    dispatcher: CommandDispatcher,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(settings: Settings, registry: Arc<CommandRegistry>) -> Self {
        let remotes = Arc::new(RemoteRegistry::new(
            settings.storage.remotes_dir(),
            &settings.git.default_branch,
        ));
        let pull_requests = Arc::new(PullRequestEngine::new(
            Arc::clone(&remotes),
            settings.git.clone(),
        ));
        let dispatcher = CommandDispatcher::new(registry, Arc::clone(&remotes));
        Self {
            settings,
            sessions: RwLock::new(HashMap::new()),
            remotes,
            pull_requests,
            dispatcher,
            shutdown: CancellationToken::new(),
        }
    }

    /// Manager wired with the built-in command table.
    pub fn from_settings(settings: Settings) -> Result<Self, SandboxError> {
        let registry = Arc::new(CommandRegistry::standard()?);
        Ok(Self::new(settings, registry))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn remotes(&self) -> &Arc<RemoteRegistry> {
        &self.remotes
    }

    /// Registers bare repositories left in the data root by a previous run.
    pub async fn adopt_existing_remotes(&self) -> Result<usize, SandboxError> {
        let remotes = Arc::clone(&self.remotes);
        run_blocking("adopt remotes", move || remotes.load_existing()).await
    }

    pub async fn create_session(&self, session_id: &str) -> Result<SessionSummary, SandboxError> {
        if session_id.trim().is_empty() {
            return Err(SandboxError::invalid_input(
                "sessionId",
                "session id must not be empty",
            ));
        }
        if self.sessions.read().await.contains_key(session_id) {
            return Err(SandboxError::SessionAlreadyExists {
                session_id: session_id.to_string(),
            });
        }

        let scratch_root = self.settings.storage.scratch_root.clone();
        let fs = run_blocking("create session filesystem", move || {
            SessionFs::new(scratch_root.as_deref())
        })
        .await?;
        let profile = SessionProfile {
            git: self.settings.git.clone(),
            reflog_limit: self.settings.sessions.reflog_limit,
        };
        let session = Arc::new(Session::new(session_id, SessionState::new(fs, profile)));

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(session_id) {
                return Err(SandboxError::SessionAlreadyExists {
                    session_id: session_id.to_string(),
                });
            }
            sessions.insert(session_id.to_string(), Arc::clone(&session));
        }
        info!("Created session {session_id}");
        Ok(session.summary())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Arc<Session>, SandboxError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SandboxError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Drops the session from the table. Commands already running against it
    /// finish first; its filesystem goes away with the last reference.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SandboxError> {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(_) => {
                info!("Deleted session {session_id}");
                Ok(())
            }
            None => Err(SandboxError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
        }
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|session| session.summary())
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Removes sessions that have not run a command for longer than `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let evicted: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for() > max_idle)
                .map(|(id, _)| id.clone())
                .collect();
            stale.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        let mut ids: Vec<String> = evicted.iter().map(|s| s.id().to_string()).collect();
        ids.sort();
        for id in &ids {
            info!("Evicted idle session {id}");
        }
        ids
    }

    pub async fn execute(&self, session_id: &str, line: &str) -> Result<String, SandboxError> {
        self.execute_with_cancel(session_id, line, self.shutdown.child_token())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        session_id: &str,
        line: &str,
        cancel: CancellationToken,
    ) -> Result<String, SandboxError> {
        let session = self.get_session(session_id).await?;
        self.dispatcher.dispatch(&session, line, cancel).await
    }

    /// Creates a shared bare repository. The requesting session's own
    /// repositories are left alone; adopting the remote is a separate
    /// `git clone` or `git remote add`.
    pub async fn create_bare_repository(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<RemoteInfo, SandboxError> {
        self.get_session(session_id).await?;
        let remotes = Arc::clone(&self.remotes);
        let (creator, name) = (session_id.to_string(), name.to_string());
        run_blocking("create shared remote", move || {
            remotes.create(&name, Some(&creator))?.info()
        })
        .await
    }

    /// Deletes a shared remote with its storage and every pull request
    /// opened against it.
    pub async fn remove_remote(&self, name: &str) -> Result<usize, SandboxError> {
        let remotes = Arc::clone(&self.remotes);
        let owned = name.to_string();
        run_blocking("remove shared remote", move || remotes.remove(&owned)).await?;
        let dropped = self.pull_requests.forget_remote(name);
        info!("Removed shared remote '{name}' and {dropped} pull request(s)");
        Ok(dropped)
    }

    pub async fn list_remotes(&self) -> Result<Vec<RemoteInfo>, SandboxError> {
        let remotes = Arc::clone(&self.remotes);
        run_blocking("list shared remotes", move || {
            remotes.list().iter().map(|remote| remote.info()).collect()
        })
        .await
    }

    pub async fn create_pull_request(
        &self,
        request: NewPullRequest,
    ) -> Result<PullRequest, SandboxError> {
        let engine = Arc::clone(&self.pull_requests);
        run_blocking("create pull request", move || engine.create(request)).await
    }

    pub async fn merge_pull_request(
        &self,
        id: u64,
        remote_name: &str,
    ) -> Result<PrMergeOutcome, SandboxError> {
        let engine = Arc::clone(&self.pull_requests);
        let remote_name = remote_name.to_string();
        run_blocking("merge pull request", move || engine.merge(id, &remote_name)).await
    }

    pub async fn close_pull_request(&self, id: u64) -> Result<PullRequest, SandboxError> {
        let engine = Arc::clone(&self.pull_requests);
        run_blocking("close pull request", move || engine.close(id)).await
    }

    pub fn get_pull_request(&self, id: u64) -> Result<PullRequest, SandboxError> {
        self.pull_requests.get(id)
    }

    pub fn list_pull_requests(&self, remote: Option<&str>) -> Vec<PullRequest> {
        self.pull_requests.list(remote)
    }

    pub async fn workspace_tree(&self, session_id: &str) -> Result<WorkspaceNode, SandboxError> {
        let session = self.get_session(session_id).await?;
        let guard = session.read_owned().await;
        run_blocking("workspace tree", move || workspace_tree(&guard)).await
    }

    pub async fn read_file(&self, session_id: &str, path: &str) -> Result<String, SandboxError> {
        let session = self.get_session(session_id).await?;
        let guard = session.read_owned().await;
        let path = path.to_string();
        run_blocking("read workspace file", move || {
            let absolute = guard.absolute(&path)?;
            guard.fs().read(&absolute)
        })
        .await
    }

    pub async fn write_file(
        &self,
        session_id: &str,
        path: &str,
        content: String,
    ) -> Result<(), SandboxError> {
        let session = self.get_session(session_id).await?;
        session.touch();
        let guard = session.write_owned().await;
        let path = path.to_string();
        run_blocking("write workspace file", move || {
            let absolute = guard.absolute(&path)?;
            guard.fs().write(&absolute, content.as_bytes())
        })
        .await
    }

    /// Token cancelled by [`SessionManager::shutdown`]; in-flight commands
    /// observe it through their child tokens.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

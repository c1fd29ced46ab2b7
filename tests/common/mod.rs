#![allow(dead_code)]

use gitgym::SessionManager;
use gitgym::domains::settings::Settings;
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub temp: TempDir,
    pub manager: Arc<SessionManager>,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.storage.data_root = temp.path().join("data");
        settings.storage.scratch_root = Some(temp.path().join("scratch"));
        settings.git.author_name = "Test User".to_string();
        settings.git.author_email = "test@example.com".to_string();
        let manager = Arc::new(SessionManager::from_settings(settings).unwrap());
        Self { temp, manager }
    }

    pub async fn session(&self, id: &str) -> &Self {
        self.manager.create_session(id).await.unwrap();
        self
    }

    /// Runs each line in order and returns the output of the last one.
    pub async fn run(&self, id: &str, lines: &[&str]) -> String {
        let mut last = String::new();
        for line in lines {
            last = self
                .manager
                .execute(id, line)
                .await
                .unwrap_or_else(|e| panic!("`{line}` failed in {id}: {e}"));
        }
        last
    }
}

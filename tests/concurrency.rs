mod common;

use common::Harness;
use futures::future::join_all;
use gitgym::domains::merge::{NewPullRequest, PrState};
use gitgym::{ErrorKind, SandboxError};
use std::sync::Arc;
use std::time::Duration;

const WRITERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_are_serialized() {
    let h = Arc::new(Harness::new());
    h.session("s").await;

    let tasks: Vec<_> = (0..WRITERS)
        .map(|i| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.manager
                    .execute("s", &format!("echo line-{i} >> log.txt"))
                    .await
            })
        })
        .collect();
    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "");
    }

    let content = h.run("s", &["cat log.txt"]).await;
    let mut lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), WRITERS);
    lines.sort();
    lines.dedup();
    assert_eq!(lines.len(), WRITERS);
    assert!(lines.iter().all(|line| line.starts_with("line-")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_reads_agree() {
    let h = Harness::new();
    h.session("s").await;
    h.run(
        "s",
        &["git init", "echo a > a", "git add a", "git commit -m a"],
    )
    .await;

    let reads = (0..8).map(|_| h.manager.execute("s", "git log --oneline"));
    let outputs: Vec<_> = join_all(reads)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_wait_for_readers_but_readers_share() {
    let h = Harness::new();
    h.session("s").await;
    h.run("s", &["touch seen"]).await;

    let session = h.manager.get_session("s").await.unwrap();
    let held = session.read().await;

    let listed = tokio::time::timeout(Duration::from_secs(5), h.manager.execute("s", "ls"))
        .await
        .expect("read command should not wait for another reader")
        .unwrap();
    assert_eq!(listed, "seen");

    let blocked =
        tokio::time::timeout(Duration::from_millis(200), h.manager.execute("s", "touch late")).await;
    assert!(blocked.is_err(), "write command ran while a reader held the session");

    drop(held);
    h.run("s", &["touch late"]).await;
    assert_eq!(h.run("s", &["ls"]).await, "late\nseen");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_do_not_block_each_other() {
    let h = Harness::new();
    h.session("a").await;
    h.session("b").await;

    let session = h.manager.get_session("a").await.unwrap();
    let held = session.write().await;

    let other = tokio::time::timeout(
        Duration::from_secs(5),
        h.manager.execute("b", "echo independent > f"),
    )
    .await
    .expect("another session's lock must not block this one");
    assert_eq!(other.unwrap(), "");
    drop(held);
}

/// Both sessions hold a clone of `shared` at the same base commit.
async fn two_clones(h: &Harness) {
    h.session("alice").await;
    h.session("bob").await;
    h.manager
        .create_bare_repository("alice", "shared")
        .await
        .unwrap();
    h.run(
        "alice",
        &[
            "git clone shared",
            "cd shared",
            "echo base > README.md",
            "git add README.md",
            "git commit -m base",
            "git push -u origin main",
        ],
    )
    .await;
    h.run("bob", &["git clone shared", "cd shared"]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_merges_of_one_pull_request_succeed_once() {
    let h = Arc::new(Harness::new());
    two_clones(&h).await;
    h.run(
        "bob",
        &[
            "git switch -c feature",
            "echo feature > feature.txt",
            "git add feature.txt",
            "git commit -m feature",
            "git push origin feature",
        ],
    )
    .await;
    let pr = h
        .manager
        .create_pull_request(NewPullRequest {
            title: "Add feature".to_string(),
            description: String::new(),
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            creator: "bob".to_string(),
            remote_name: "shared".to_string(),
        })
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.manager.merge_pull_request(pr.id, "shared").await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, SandboxError::PullRequestNotOpen { .. }))
    );
    assert_eq!(h.manager.get_pull_request(pr.id).unwrap().state, PrState::Merged);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_pushes_to_one_branch_have_a_single_winner() {
    let h = Arc::new(Harness::new());
    two_clones(&h).await;
    h.run(
        "alice",
        &["echo alice > alice.txt", "git add alice.txt", "git commit -m alice"],
    )
    .await;
    h.run(
        "bob",
        &["echo bob > bob.txt", "git add bob.txt", "git commit -m bob"],
    )
    .await;

    let tasks: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|id| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.manager.execute(id, "git push origin main").await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one push must be rejected");
    assert_eq!(rejected.kind(), ErrorKind::StateConflict);
    assert!(rejected.to_string().contains("[rejected]"));

    let remotes = h.manager.list_remotes().await.unwrap();
    assert_eq!(remotes[0].branches, vec!["main".to_string()]);
}

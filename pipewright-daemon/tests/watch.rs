//! File-watch trigger against a real notify watcher.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use pipewright_core::config::WatchSection;
use pipewright_core::WatchEvent;
use pipewright_daemon::{DaemonError, ReactionHandler, Route, WatchTrigger};
use tokio::sync::{broadcast, Mutex};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(Route, PathBuf)>>,
}

#[async_trait]
impl ReactionHandler for Recorder {
    async fn react(&self, route: Route, event: WatchEvent) {
        // Reactions take a little while, like a real gate run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.seen.lock().await.push((route, event.path));
    }
}

async fn wait_until_seen(recorder: &Recorder, name: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if recorder
                .seen
                .lock()
                .await
                .iter()
                .any(|(_, path)| path.ends_with(name))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no reaction for {name}"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn contract_changes_route_to_security() {
    let root = TempDir::new().unwrap();
    root.child("contracts").create_dir_all().unwrap();
    root.child("reports").create_dir_all().unwrap();
    let recorder = Arc::new(Recorder::default());
    let handle = WatchTrigger::start(
        root.path(),
        &WatchSection::default(),
        Arc::clone(&recorder) as Arc<dyn ReactionHandler>,
    )
    .unwrap();

    // Give the backend a moment to register before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    root.child("reports/Shadow.sol").write_str("contract Shadow {}").unwrap();
    root.child("contracts/Token.sol").write_str("contract Token {}").unwrap();

    wait_until_seen(&recorder, "Token.sol").await;
    handle.stop().await.unwrap();

    let seen = recorder.seen.lock().await;
    assert!(seen.iter().all(|(route, _)| *route == Route::ValidateSecurity));
    assert!(
        !seen.iter().any(|(_, path)| path.ends_with("Shadow.sol")),
        "ignored directories must not trigger reactions: {seen:?}"
    );
    // Several notify events for one write collapse inside the debounce window.
    assert_eq!(seen.iter().filter(|(_, p)| p.ends_with("Token.sol")).count(), 1);
}

/// Counts reactions started and finished; each one sleeps for `hold`.
struct Counter {
    started: AtomicUsize,
    finished: AtomicUsize,
    hold: Duration,
}

impl Counter {
    fn new(hold: Duration) -> Self {
        Self {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            hold,
        }
    }
}

#[async_trait]
impl ReactionHandler for Counter {
    async fn react(&self, _route: Route, _event: WatchEvent) {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_for_start(counter: &Counter) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while counter.started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no reaction started");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_the_running_reaction_and_unsubscribes() {
    let root = TempDir::new().unwrap();
    root.child("contracts").create_dir_all().unwrap();
    let counter = Arc::new(Counter::new(Duration::from_millis(800)));
    let handle = WatchTrigger::start(
        root.path(),
        &WatchSection::default(),
        Arc::clone(&counter) as Arc<dyn ReactionHandler>,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    root.child("contracts/Vault.sol").write_str("contract Vault {}").unwrap();
    wait_for_start(&counter).await;
    assert_eq!(counter.finished.load(Ordering::SeqCst), 0);

    handle.stop().await.unwrap();
    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.finished.load(Ordering::SeqCst), 1);

    root.child("contracts/Later.sol").write_str("contract Later {}").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        counter.started.load(Ordering::SeqCst),
        1,
        "a write after stop must not start a reaction"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_until_returns_on_shutdown_after_draining() {
    let root = TempDir::new().unwrap();
    root.child("contracts").create_dir_all().unwrap();
    let counter = Arc::new(Counter::new(Duration::from_millis(300)));
    let handle = WatchTrigger::start(
        root.path(),
        &WatchSection::default(),
        Arc::clone(&counter) as Arc<dyn ReactionHandler>,
    )
    .unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let running = tokio::spawn(handle.run_until(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    root.child("contracts/Pool.sol").write_str("contract Pool {}").unwrap();
    wait_for_start(&counter).await;
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run_until ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(counter.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_root_is_a_setup_error() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("does-not-exist");
    let result = WatchTrigger::start(
        &missing,
        &WatchSection::default(),
        Arc::new(Recorder::default()) as Arc<dyn ReactionHandler>,
    );
    assert!(matches!(result, Err(DaemonError::WatchSetup { .. })));
}

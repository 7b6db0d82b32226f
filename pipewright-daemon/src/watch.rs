//! File-watch trigger: notify events → ignore filter → per-path debounce →
//! route → reaction task.
//!
//! The watch loop never awaits a reaction. Each one runs on a `JoinSet`, and
//! [`WatchHandle::stop`] drops the notify watcher before draining that set, so
//! no new events arrive while in-flight reactions finish.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pipewright_core::config::WatchSection;
use pipewright_core::{WatchEvent, WatchEventKind};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::error::DaemonError;

/// Debounce entries older than this are forgotten.
const DEBOUNCE_RETENTION: Duration = Duration::from_secs(30);

const TEST_SOURCE_EXTENSIONS: &[&str] = &["js", "ts", "mjs"];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A contract source changed: run the Security gate.
    ValidateSecurity,
    /// A test file changed: log an advisory, run nothing.
    SuggestRevalidation,
    Ignore,
}

/// Route by extension. `path` should be relative to the watched root.
pub fn route(path: &Path) -> Route {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("sol") => Route::ValidateSecurity,
        Some(ext)
            if TEST_SOURCE_EXTENSIONS.contains(&ext)
                && path.to_string_lossy().contains("test") =>
        {
            Route::SuggestRevalidation
        }
        _ => Route::Ignore,
    }
}

#[async_trait]
pub trait ReactionHandler: Send + Sync + 'static {
    async fn react(&self, route: Route, event: WatchEvent);
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

/// Per-path debounce: an event is accepted only if the last accepted event
/// for the same path is at least `window` old.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        let retention = DEBOUNCE_RETENTION.max(self.window);
        self.seen
            .retain(|_, seen_at| now.duration_since(*seen_at) <= retention);
        match self.seen.get(path) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.seen.insert(path.to_path_buf(), now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filter: ignore → debounce → route
// ---------------------------------------------------------------------------

/// Decides, per raw event, whether and how to react.
#[derive(Debug)]
pub struct EventFilter {
    root: PathBuf,
    ignore: Vec<String>,
    debouncer: Debouncer,
}

impl EventFilter {
    pub fn new(root: impl Into<PathBuf>, settings: &WatchSection) -> Self {
        Self {
            root: root.into(),
            ignore: settings.ignore.clone(),
            debouncer: Debouncer::new(Duration::from_millis(settings.debounce_ms)),
        }
    }

    /// The route for `event`, or `None` when it is ignored, debounced,
    /// a deletion, or of no interest.
    pub fn admit(&mut self, event: &WatchEvent, now: Instant) -> Option<Route> {
        let relative = event.path.strip_prefix(&self.root).unwrap_or(&event.path);
        if self.is_ignored(relative) {
            return None;
        }
        if event.kind == WatchEventKind::Deleted {
            tracing::debug!(path = %relative.display(), "file deleted");
            return None;
        }
        let route = route(relative);
        if route == Route::Ignore {
            return None;
        }
        if !self.debouncer.accept(&event.path, now) {
            tracing::debug!(path = %relative.display(), "event debounced");
            return None;
        }
        Some(route)
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        match relative.components().next() {
            Some(Component::Normal(first)) => {
                let first = first.to_string_lossy();
                self.ignore.iter().any(|dir| *dir == first)
            }
            _ => false,
        }
    }
}

fn event_kind(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Remove(_) => Some(WatchEventKind::Deleted),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

pub struct WatchTrigger;

/// A running watch loop.
pub struct WatchHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<(), DaemonError>>,
}

impl WatchTrigger {
    /// Subscribe to changes under `root`, recursively, and start the loop.
    pub fn start(
        root: &Path,
        settings: &WatchSection,
        handler: Arc<dyn ReactionHandler>,
    ) -> Result<WatchHandle, DaemonError> {
        // Canonical, so event paths (which arrive resolved) share the prefix.
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })
        .map_err(|source| DaemonError::WatchSetup {
            path: root.clone(),
            source,
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| DaemonError::WatchSetup {
                path: root.clone(),
                source,
            })?;
        tracing::info!(root = %root.display(), "watching for file changes");

        let filter = EventFilter::new(&root, settings);
        let (shutdown, shutdown_rx) = broadcast::channel::<()>(1);
        let task = tokio::spawn(watch_loop(watcher, filter, event_rx, handler, shutdown_rx));
        Ok(WatchHandle { shutdown, task })
    }
}

impl WatchHandle {
    /// Unsubscribe, then wait for in-flight reactions to finish.
    pub async fn stop(self) -> Result<(), DaemonError> {
        let _ = self.shutdown.send(());
        joined(self.task.await)
    }

    /// Run until `shutdown` fires (then [`stop`](Self::stop)) or the loop
    /// ends on its own, whichever comes first.
    pub async fn run_until(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        let ended = tokio::select! {
            _ = shutdown.recv() => None,
            result = &mut self.task => Some(result),
        };
        match ended {
            None => self.stop().await,
            Some(result) => joined(result),
        }
    }
}

fn joined(
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    result.map_err(|err| DaemonError::Runtime(format!("watch task join failure: {err}")))?
}

async fn watch_loop(
    watcher: RecommendedWatcher,
    mut filter: EventFilter,
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    handler: Arc<dyn ReactionHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut reactions = JoinSet::new();

    let outcome = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            Some(joined) = reactions.join_next(), if !reactions.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "watch reaction failed");
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break Err(DaemonError::ChannelClosed("watch events"));
                };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                let Some(kind) = event_kind(&event.kind) else { continue };

                for path in event.paths {
                    let change = WatchEvent { path, kind, timestamp: Utc::now() };
                    let Some(route) = filter.admit(&change, Instant::now()) else { continue };
                    tracing::info!(path = %change.path.display(), kind = ?kind, route = ?route, "file change");
                    let handler = Arc::clone(&handler);
                    reactions.spawn(async move { handler.react(route, change).await });
                }
            }
        }
    };

    drop(watcher);
    tracing::info!(pending = reactions.len(), "watcher stopped; draining reactions");
    while let Some(joined) = reactions.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "watch reaction failed");
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

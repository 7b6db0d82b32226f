use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::dashboard;
use crate::error::DaemonError;
use crate::orchestrator::Orchestrator;
use crate::watch::{ReactionHandler, WatchTrigger};

/// Watch mode: file-watch trigger, optional status loop, and ctrl-c, sharing
/// one shutdown channel. Returns once any of them ends.
pub async fn run_watch(orchestrator: Orchestrator) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    // Subscribing happens here so a setup failure aborts before anything runs.
    let handler: Arc<dyn ReactionHandler> = Arc::new(orchestrator.clone());
    let watch = WatchTrigger::start(orchestrator.root(), &orchestrator.config().watch, handler)?;

    let watch_handle = supervise("watch", shutdown_tx.clone(), {
        let shutdown_rx = shutdown_tx.subscribe();
        async move { watch.run_until(shutdown_rx).await }
    });

    let monitoring = &orchestrator.config().monitoring;
    let status_handle = if monitoring.enabled && monitoring.metrics_interval > 0 {
        let every = Duration::from_secs(monitoring.metrics_interval);
        let status = dashboard::status_loop(orchestrator.clone(), every, shutdown_tx.subscribe());
        supervise("status_loop", shutdown_tx.clone(), status)
    } else {
        tokio::spawn(async { Ok(()) })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => {
                            let _ = shutdown.send(());
                            Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}")))
                        }
                    }
                }
            }
        })
    };

    tracing::info!(root = %orchestrator.root().display(), "watch mode started");
    let (watch_result, status_result, signal_result) =
        tokio::join!(watch_handle, status_handle, signal_handle);

    handle_join("watch", watch_result)?;
    handle_join("status_loop", status_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("watch mode stopped");
    Ok(())
}

/// Spawn `task`; whenever it ends, for any reason, broadcast shutdown so its
/// siblings end too.
fn supervise<F>(
    name: &'static str,
    shutdown: broadcast::Sender<()>,
    task: F,
) -> JoinHandle<Result<(), DaemonError>>
where
    F: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = task.await;
        if let Err(err) = &result {
            tracing::error!(task = name, error = %err, "task failed; shutting down");
        }
        let _ = shutdown.send(());
        result
    })
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!("{task} task join failure: {err}"))),
    }
}

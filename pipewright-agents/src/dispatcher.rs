//! Dispatcher: runs agent tasks under a global concurrency limit.
//!
//! ## `dispatch` protocol
//!
//! 1. Reject unknown (`AgentNotFound`), disabled (`AgentDisabled`) and already
//!    running (`AgentBusy`) agents before queueing. Nothing is changed or stored.
//! 2. Wait for a pool permit. The semaphore is FIFO, so waiters are served in
//!    request order.
//! 3. Under the write lock, re-check and move the agent to `Running`.
//! 4. Run the capability on its own task. Errors and panics become a failed
//!    [`AgentResult`].
//! 5. Under the write lock, move to `Success`/`Failed` and stamp `last_run`.
//! 6. Persist the result, then return it.
//!
//! Steps 2 to 6 run on a spawned task. Dropping the `dispatch` future does not
//! cancel them, so an agent that reached `Running` always ends in `Success`
//! or `Failed`.
//!
//! All status changes go through [`AgentEntry::transition`] while the write
//! lock is held, so readers never see a half-applied update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use pipewright_core::{AgentName, AgentResult, AgentStatus};
use pipewright_store::{PersistenceError, ReportKind, ReportStore};
use serde_json::{json, Value};
use tokio::sync::{RwLock, Semaphore};

use crate::capability::{CapabilityRef, TaskContext};
use crate::error::{AgentExecutionError, DispatchError};
use crate::registry::{AgentEntry, AgentRegistry, AgentSnapshot};

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    agents: RwLock<AgentRegistry>,
    pool: Semaphore,
    store: ReportStore,
    project_root: PathBuf,
}

impl Dispatcher {
    pub fn new(
        registry: AgentRegistry,
        max_concurrent: usize,
        store: ReportStore,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                agents: RwLock::new(registry),
                pool: Semaphore::new(max_concurrent.max(1)),
                store,
                project_root: project_root.into(),
            }),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    /// Run `task` on `agent` and return the persisted result.
    pub async fn dispatch(
        &self,
        agent: &str,
        task: &str,
        args: Value,
    ) -> Result<AgentResult, DispatchError> {
        let name = AgentName::from(agent);
        {
            let agents = self.inner.agents.read().await;
            admit(&name, agents.get(&name))?;
        }

        let this = self.clone();
        let task = task.to_string();
        let handle = tokio::spawn(async move { this.run_admitted(name, &task, args).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(_) => Err(DispatchError::PoolClosed),
        }
    }

    async fn run_admitted(
        &self,
        name: AgentName,
        task: &str,
        args: Value,
    ) -> Result<AgentResult, DispatchError> {
        let _permit = self
            .inner
            .pool
            .acquire()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;

        let (capability, ctx) = self.begin(&name).await?;
        tracing::info!(agent = %name, task, "agent dispatched");

        let result = self.invoke(&name, capability, task, args, ctx).await;
        self.complete(&name, result.success).await;

        if result.success {
            tracing::info!(agent = %name, task, "agent succeeded");
        } else {
            tracing::warn!(
                agent = %name,
                task,
                error = result.error.as_deref().unwrap_or(""),
                "agent failed"
            );
        }

        self.persist(result).await
    }

    pub async fn status_of(&self, agent: &str) -> Option<AgentStatus> {
        let agents = self.inner.agents.read().await;
        agents.get(&AgentName::from(agent)).map(|entry| entry.status)
    }

    pub async fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.inner.agents.read().await.snapshot()
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn begin(&self, name: &AgentName) -> Result<(CapabilityRef, TaskContext), DispatchError> {
        let mut agents = self.inner.agents.write().await;
        let entry = agents
            .get_mut(name)
            .ok_or_else(|| DispatchError::AgentNotFound(name.clone()))?;
        admit(name, Some(&*entry))?;
        entry
            .transition(AgentStatus::Running)
            .map_err(|_| DispatchError::AgentBusy(name.clone()))?;

        let ctx = TaskContext {
            project_root: self.inner.project_root.clone(),
            settings: entry.settings.clone(),
        };
        Ok((entry.capability.clone(), ctx))
    }

    async fn invoke(
        &self,
        name: &AgentName,
        capability: CapabilityRef,
        task: &str,
        args: Value,
        ctx: TaskContext,
    ) -> AgentResult {
        let capability = match capability {
            CapabilityRef::Installed(capability) => capability,
            CapabilityRef::Unimplemented => {
                return AgentResult {
                    payload: json!({
                        "suggestion": format!(
                            "install a capability for '{name}' or disable it under agents.{name}.enabled"
                        ),
                    }),
                    ..AgentResult::failure(
                        name.clone(),
                        task,
                        format!("capability '{name}' is not implemented"),
                    )
                };
            }
        };

        let owned_task = task.to_string();
        let handle =
            tokio::spawn(async move { capability.run(&owned_task, &args, &ctx).await });

        let message = match handle.await {
            Ok(Ok(output)) => {
                return AgentResult {
                    agent: name.clone(),
                    task: task.to_string(),
                    success: output.success,
                    payload: output.payload,
                    error: output.error,
                    timestamp: Utc::now(),
                };
            }
            Ok(Err(err)) => err.to_string(),
            Err(join) if join.is_panic() => "capability panicked".to_string(),
            Err(join) => join.to_string(),
        };
        let err = AgentExecutionError {
            agent: name.clone(),
            message,
        };
        AgentResult::failure(name.clone(), task, err.to_string())
    }

    async fn complete(&self, name: &AgentName, success: bool) {
        let next = if success {
            AgentStatus::Success
        } else {
            AgentStatus::Failed
        };
        let mut agents = self.inner.agents.write().await;
        if let Some(entry) = agents.get_mut(name) {
            match entry.transition(next) {
                Ok(()) => entry.last_run = Some(Utc::now()),
                Err(err) => tracing::error!(
                    agent = %name,
                    from = %err.from,
                    to = %err.to,
                    "illegal agent status transition"
                ),
            }
        }
    }

    async fn persist(&self, result: AgentResult) -> Result<AgentResult, DispatchError> {
        let store = self.inner.store.clone();
        let stored = result.clone();
        let recorded = tokio::task::spawn_blocking(move || {
            store.record(ReportKind::Agent, stored.agent.as_str(), &stored)
        })
        .await
        .unwrap_or_else(|join| {
            Err(PersistenceError::Io {
                path: self.inner.store.root().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, join.to_string()),
            })
        });

        match recorded {
            Ok(handle) => {
                tracing::debug!(agent = %result.agent, path = %handle.path.display(), "agent result stored");
                Ok(result)
            }
            Err(source) => {
                tracing::error!(agent = %result.agent, error = %source, "failed to persist agent result");
                Err(DispatchError::Persistence {
                    result: Box::new(result),
                    source,
                })
            }
        }
    }
}

fn admit(name: &AgentName, entry: Option<&AgentEntry>) -> Result<(), DispatchError> {
    match entry {
        None => Err(DispatchError::AgentNotFound(name.clone())),
        Some(entry) if entry.status == AgentStatus::Disabled => {
            Err(DispatchError::AgentDisabled(name.clone()))
        }
        Some(entry) if entry.status == AgentStatus::Running => {
            Err(DispatchError::AgentBusy(name.clone()))
        }
        Some(_) => Ok(()),
    }
}

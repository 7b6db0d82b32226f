//! Agent registry: name → capability + run state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pipewright_core::{AgentName, AgentSettings, AgentStatus, PipelineConfig};
use serde::Serialize;

use crate::capability::{self, Capability, CapabilityRef, TaskContext};

/// One registered agent.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub name: AgentName,
    pub capability: CapabilityRef,
    pub status: AgentStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub settings: AgentSettings,
}

/// Outcome of an illegal [`AgentEntry::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: AgentStatus,
    pub to: AgentStatus,
}

impl AgentEntry {
    pub fn new(name: AgentName, capability: CapabilityRef, settings: AgentSettings) -> Self {
        let status = if settings.enabled {
            AgentStatus::Idle
        } else {
            AgentStatus::Disabled
        };
        Self {
            name,
            capability,
            status,
            last_run: None,
            settings,
        }
    }

    /// Move to `next` if the transition table allows it.
    pub fn transition(&mut self, next: AgentStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            name: self.name.clone(),
            display_name: display_name(self.name.as_str()),
            status: self.status,
            enabled: self.settings.enabled,
            implemented: self.capability.is_installed(),
            last_run: self.last_run,
        }
    }
}

/// Read-only view of an agent for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub name: AgentName,
    pub display_name: String,
    pub status: AgentStatus,
    pub enabled: bool,
    pub implemented: bool,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    entries: BTreeMap<AgentName, AgentEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per configured agent, disabled ones included.
    pub fn from_config(config: &PipelineConfig, project_root: &Path) -> Self {
        let mut registry = Self::new();
        for (name, settings) in &config.agents {
            let ctx = TaskContext {
                project_root: project_root.to_path_buf(),
                settings: settings.clone(),
            };
            let capability = match capability::builtin(name, &ctx) {
                Ok(capability) => capability,
                Err(err) => {
                    tracing::warn!(agent = %name, error = %err, "capability unavailable");
                    CapabilityRef::Unimplemented
                }
            };
            if !capability.is_installed() {
                tracing::debug!(agent = %name, "no built-in capability; registered as unimplemented");
            }
            registry.insert(AgentEntry::new(
                AgentName::from(name.as_str()),
                capability,
                settings.clone(),
            ));
        }
        registry
    }

    pub fn insert(&mut self, entry: AgentEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Register (or replace) an enabled agent backed by `capability`.
    pub fn install(&mut self, name: impl Into<AgentName>, capability: Arc<dyn Capability>) {
        let name = name.into();
        let settings = match self.entries.remove(&name) {
            Some(existing) => existing.settings,
            None => AgentSettings::enabled_with(serde_json::Value::Null),
        };
        self.insert(AgentEntry::new(name, CapabilityRef::Installed(capability), settings));
    }

    pub fn get(&self, name: &AgentName) -> Option<&AgentEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &AgentName) -> Option<&mut AgentEntry> {
        self.entries.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.entries.values().map(AgentEntry::snapshot).collect()
    }
}

/// `security_auditor` → `Security Auditor`.
fn display_name(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_registers_all_agents() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::from_config(&PipelineConfig::default(), tmp.path());
        assert_eq!(registry.len(), 4);

        let generator = registry.get(&AgentName::from("contract_generator")).unwrap();
        assert!(generator.capability.is_installed());
        assert_eq!(generator.status, AgentStatus::Idle);

        let auditor = registry.get(&AgentName::from("security_auditor")).unwrap();
        assert!(!auditor.capability.is_installed());
    }

    #[test]
    fn disabled_agents_start_disabled() {
        let tmp = TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.agents.get_mut("test_generator").unwrap().enabled = false;

        let registry = AgentRegistry::from_config(&config, tmp.path());
        let entry = registry.get(&AgentName::from("test_generator")).unwrap();
        assert_eq!(entry.status, AgentStatus::Disabled);
        assert!(!entry.snapshot().enabled);
    }

    #[test]
    fn transitions_follow_the_table() {
        let mut entry = AgentEntry::new(
            AgentName::from("a"),
            CapabilityRef::Unimplemented,
            AgentSettings::enabled_with(serde_json::Value::Null),
        );
        entry.transition(AgentStatus::Running).unwrap();
        let err = entry.transition(AgentStatus::Running).unwrap_err();
        assert_eq!(err.from, AgentStatus::Running);
        entry.transition(AgentStatus::Success).unwrap();
        assert_eq!(entry.status, AgentStatus::Success);
    }

    #[test]
    fn display_names_are_title_cased() {
        assert_eq!(display_name("deployment_manager"), "Deployment Manager");
    }
}

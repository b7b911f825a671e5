//! Scenario registry — declarative mapping from task content to executor.
//!
//! Selection is deterministic and position-sensitive: rules are tried in
//! declared order and the first match wins.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::task::Task;

/// Name of the scenario used when the registry cannot be loaded.
pub const FALLBACK_SCENARIO: &str = "claude-code";

/// One registered scenario: an external CLI plus descriptive tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Program name on PATH.
    pub command: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub best_for: Vec<String>,
}

/// An ordered selection rule: first rule with a matching keyword wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRule {
    pub if_contains: Vec<String>,
    #[serde(rename = "use")]
    pub use_scenario: String,
}

/// The registry, loaded from `<base>/config/scenario-registry.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRegistry {
    #[serde(default)]
    pub scenarios: HashMap<String, Scenario>,
    pub default_scenario: String,
    #[serde(default)]
    pub selection_rules: Vec<SelectionRule>,
}

/// A resolved selection: scenario name plus the command to invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub name: String,
    pub command: String,
}

impl ScenarioRegistry {
    /// Load the registry from a YAML file. Any failure falls back to the
    /// single `claude-code` scenario.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(registry) => registry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed scenario registry, using fallback");
                    Self::fallback()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Scenario registry unreadable, using fallback");
                Self::fallback()
            }
        }
    }

    /// The registry used when no file can be loaded.
    pub fn fallback() -> Self {
        let mut scenarios = HashMap::new();
        scenarios.insert(
            FALLBACK_SCENARIO.to_string(),
            Scenario {
                command: FALLBACK_SCENARIO.to_string(),
                capabilities: vec!["code".to_string()],
                best_for: vec!["general".to_string()],
            },
        );
        Self {
            scenarios,
            default_scenario: FALLBACK_SCENARIO.to_string(),
            selection_rules: Vec::new(),
        }
    }

    /// Select the scenario for a task.
    ///
    /// The haystack is the lowercased concatenation of title, description,
    /// and type tag; the first rule whose keyword appears as a substring
    /// wins, otherwise the default scenario is used.
    pub fn select(&self, task: &Task) -> Selected {
        let haystack = format!("{} {} {}", task.title, task.description, task.task_type)
            .to_lowercase();

        let name = self
            .selection_rules
            .iter()
            .find(|rule| {
                rule.if_contains
                    .iter()
                    .any(|kw| haystack.contains(&kw.to_lowercase()))
            })
            .map(|rule| rule.use_scenario.as_str())
            .unwrap_or(&self.default_scenario);

        self.resolve(name)
    }

    /// The default scenario's resolution (used by the analyzer, which
    /// has no task content to match rules against yet).
    pub fn default_selection(&self) -> Selected {
        self.resolve(&self.default_scenario)
    }

    /// Resolve a scenario name to its command, falling back to the
    /// default (and ultimately `claude-code`) for unknown names.
    fn resolve(&self, name: &str) -> Selected {
        if let Some(scenario) = self.scenarios.get(name) {
            return Selected {
                name: name.to_string(),
                command: scenario.command.clone(),
            };
        }
        if let Some(default) = self.scenarios.get(&self.default_scenario) {
            return Selected {
                name: self.default_scenario.clone(),
                command: default.command.clone(),
            };
        }
        Selected {
            name: FALLBACK_SCENARIO.to_string(),
            command: FALLBACK_SCENARIO.to_string(),
        }
    }
}

/// Write a starter registry file if none exists yet.
pub async fn seed_registry_file(path: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let yaml = serde_yaml::to_string(&ScenarioRegistry::fallback())
        .map_err(std::io::Error::other)?;
    tokio::fs::write(path, yaml).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::task::Task;

    fn registry() -> ScenarioRegistry {
        serde_yaml::from_str(
            r#"
default_scenario: claude-code
scenarios:
  claude-code:
    command: claude-code
  test-genie:
    command: test-genie
    best_for: [tests]
  doc-writer:
    command: doc-writer
selection_rules:
  - if_contains: [test, flaky]
    use: test-genie
  - if_contains: [docs, readme, test]
    use: doc-writer
"#,
        )
        .unwrap()
    }

    #[test]
    fn first_matching_rule_wins() {
        let reg = registry();
        // "test" matches both rules; the first declared must win.
        let task = Task::new("Fix the test suite", "api");
        let selected = reg.select(&task);
        assert_eq!(selected.name, "test-genie");
    }

    #[test]
    fn later_rule_matches_when_earlier_does_not() {
        let reg = registry();
        let task = Task::new("Update the readme", "api");
        assert_eq!(reg.select(&task).name, "doc-writer");
    }

    #[test]
    fn no_match_uses_default() {
        let reg = registry();
        let task = Task::new("Refactor the scheduler", "api");
        let selected = reg.select(&task);
        assert_eq!(selected.name, "claude-code");
        assert_eq!(selected.command, "claude-code");
    }

    #[test]
    fn matching_is_case_insensitive_across_fields() {
        let reg = registry();
        let task = Task::new("Cleanup", "api").with_type("FLAKY-hunt");
        assert_eq!(reg.select(&task).name, "test-genie");
    }

    #[test]
    fn unknown_rule_target_falls_back_to_default() {
        let mut reg = registry();
        reg.selection_rules.insert(
            0,
            SelectionRule {
                if_contains: vec!["anything".into()],
                use_scenario: "missing-scenario".into(),
            },
        );
        let task = Task::new("anything goes", "api");
        assert_eq!(reg.select(&task).name, "claude-code");
    }

    #[test]
    fn load_missing_file_is_fallback() {
        let reg = ScenarioRegistry::load(Path::new("/no/such/registry.yaml"));
        assert_eq!(reg.default_scenario, FALLBACK_SCENARIO);
        let task = Task::new("whatever", "api");
        assert_eq!(reg.select(&task).command, "claude-code");
    }
}

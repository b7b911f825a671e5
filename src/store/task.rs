//! Task data model — documents, priority estimates, and folder lifecycle.
//!
//! A task's status is never written into the document; it is the name of
//! the folder the document lives in. The serde shape here is the on-disk
//! YAML contract, so optional fields are skipped when absent to keep
//! serialize → deserialize → serialize byte-stable.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical folder a task document can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskFolder {
    Active,
    Staged,
    BacklogManual,
    BacklogGenerated,
    Completed,
    Failed,
}

/// Lookup order for `find`: an active task shadows anything stale.
pub const FIND_ORDER: [TaskFolder; 6] = [
    TaskFolder::Active,
    TaskFolder::Staged,
    TaskFolder::BacklogManual,
    TaskFolder::BacklogGenerated,
    TaskFolder::Completed,
    TaskFolder::Failed,
];

impl TaskFolder {
    /// Path of this folder relative to the tasks root.
    pub fn rel_path(&self) -> &'static str {
        match self {
            TaskFolder::Active => "active",
            TaskFolder::Staged => "staged",
            TaskFolder::BacklogManual => "backlog/manual",
            TaskFolder::BacklogGenerated => "backlog/generated",
            TaskFolder::Completed => "completed",
            TaskFolder::Failed => "failed",
        }
    }

    /// Status label reported to callers. Both backlog folders read as
    /// `backlog`.
    pub fn status_label(&self) -> &'static str {
        match self {
            TaskFolder::Active => "active",
            TaskFolder::Staged => "staged",
            TaskFolder::BacklogManual | TaskFolder::BacklogGenerated => "backlog",
            TaskFolder::Completed => "completed",
            TaskFolder::Failed => "failed",
        }
    }

    /// Folders matching a status filter string (`all` matches everything).
    pub fn matching_filter(filter: &str) -> Vec<TaskFolder> {
        match filter {
            "all" | "" => FIND_ORDER.to_vec(),
            other => FIND_ORDER
                .iter()
                .copied()
                .filter(|f| f.status_label() == other)
                .collect(),
        }
    }
}

/// Categorical urgency, or a raw numeric override.
///
/// Unknown strings anchor to `Medium` at parse time; bare numbers pass
/// through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
    Raw(f64),
}

impl Urgency {
    /// Numeric anchor used by the priority engine.
    pub fn as_factor(&self) -> f64 {
        match self {
            Urgency::Critical => 4.0,
            Urgency::High => 3.0,
            Urgency::Medium => 2.0,
            Urgency::Low => 1.0,
            Urgency::Raw(v) => *v,
        }
    }

    /// Parse a categorical name, case-insensitively. Unknown names anchor
    /// to `Medium`.
    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Urgency::Critical,
            "high" => Urgency::High,
            "medium" => Urgency::Medium,
            "low" => Urgency::Low,
            _ => Urgency::Medium,
        }
    }

    fn canonical_name(&self) -> Option<&'static str> {
        match self {
            Urgency::Critical => Some("critical"),
            Urgency::High => Some("high"),
            Urgency::Medium => Some("medium"),
            Urgency::Low => Some("low"),
            Urgency::Raw(_) => None,
        }
    }
}

impl Serialize for Urgency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.canonical_name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(self.as_factor()),
        }
    }
}

impl<'de> Deserialize<'de> for Urgency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UrgencyVisitor;

        impl Visitor<'_> for UrgencyVisitor {
            type Value = Urgency;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an urgency name or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Urgency, E> {
                Ok(Urgency::parse_str(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Urgency, E> {
                Ok(Urgency::Raw(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Urgency, E> {
                Ok(Urgency::Raw(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Urgency, E> {
                Ok(Urgency::Raw(v as f64))
            }
        }

        deserializer.deserialize_any(UrgencyVisitor)
    }
}

/// Categorical resource cost, or a raw numeric override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceCost {
    Minimal,
    Moderate,
    Heavy,
    Raw(f64),
}

impl ResourceCost {
    /// Numeric anchor used by the priority engine.
    pub fn as_factor(&self) -> f64 {
        match self {
            ResourceCost::Minimal => 1.0,
            ResourceCost::Moderate => 2.0,
            ResourceCost::Heavy => 3.0,
            ResourceCost::Raw(v) => *v,
        }
    }

    /// Parse a categorical name, case-insensitively. Unknown names anchor
    /// to `Moderate`.
    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "minimal" => ResourceCost::Minimal,
            "moderate" => ResourceCost::Moderate,
            "heavy" => ResourceCost::Heavy,
            _ => ResourceCost::Moderate,
        }
    }

    fn canonical_name(&self) -> Option<&'static str> {
        match self {
            ResourceCost::Minimal => Some("minimal"),
            ResourceCost::Moderate => Some("moderate"),
            ResourceCost::Heavy => Some("heavy"),
            ResourceCost::Raw(_) => None,
        }
    }
}

impl Serialize for ResourceCost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.canonical_name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(self.as_factor()),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceCost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CostVisitor;

        impl Visitor<'_> for CostVisitor {
            type Value = ResourceCost;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a resource cost name or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ResourceCost, E> {
                Ok(ResourceCost::parse_str(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ResourceCost, E> {
                Ok(ResourceCost::Raw(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ResourceCost, E> {
                Ok(ResourceCost::Raw(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ResourceCost, E> {
                Ok(ResourceCost::Raw(v as f64))
            }
        }

        deserializer.deserialize_any(CostVisitor)
    }
}

/// Priority estimates filled in by the analyzer (or a problem scan).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityEstimates {
    /// Impact on a 1–10 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    /// Probability of success, 0.0–1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_cost: Option<ResourceCost>,
    /// Hours to wait before the task is worth attempting again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_hours: Option<f64>,
}

/// One execution attempt, appended on each failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A task document. The unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID; also the document's file stem.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-form type tag (`problem-resolution`, `feature`, ...).
    #[serde(default)]
    pub task_type: String,
    /// What the work targets (a path, a service name, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Advisory dependency IDs; the scheduler does not enforce them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub priority: PriorityEstimates,
    /// Derived score; absent until the task has been analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
    /// Provenance: `api`, `ai`, `problem-scanner`, or free-form.
    #[serde(default)]
    pub created_by: String,
}

impl Task {
    /// Create a new task with a generated ID.
    pub fn new(title: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            task_type: String::new(),
            target: None,
            notes: None,
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            priority: PriorityEstimates::default(),
            priority_score: None,
            created_at: Utc::now(),
            analyzed_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            attempts: Vec::new(),
            created_by: created_by.into(),
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set the type tag.
    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Builder: set the target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Builder: set the estimates.
    pub fn with_estimates(mut self, estimates: PriorityEstimates) -> Self {
        self.priority = estimates;
        self
    }

    /// Record a failed attempt.
    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts.push(Attempt {
            timestamp: Utc::now(),
            error,
        });
    }

    /// Whether automated provenance should land in `backlog/generated`.
    pub fn is_automated_provenance(created_by: &str) -> bool {
        matches!(created_by, "ai" | "problem-scanner")
    }
}

/// A task annotated with the status derived from its containing folder.
#[derive(Debug, Clone, Serialize)]
pub struct TaskWithStatus {
    #[serde(flatten)]
    pub task: Task,
    pub status: &'static str,
}

/// Whitelisted update patch: only title, description, and notes are
/// caller-writable. Other fields are reserved for the swarm itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TaskPatch {
    /// Apply the patch to a task. Last writer wins.
    pub fn apply(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = description.clone();
        }
        if let Some(ref notes) = self.notes {
            task.notes = Some(notes.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_anchors() {
        assert_eq!(Urgency::Critical.as_factor(), 4.0);
        assert_eq!(Urgency::High.as_factor(), 3.0);
        assert_eq!(Urgency::Medium.as_factor(), 2.0);
        assert_eq!(Urgency::Low.as_factor(), 1.0);
    }

    #[test]
    fn urgency_unknown_string_anchors_to_medium() {
        assert_eq!(Urgency::parse_str("urgent"), Urgency::Medium);
        assert_eq!(Urgency::parse_str("CRITICAL"), Urgency::Critical);
    }

    #[test]
    fn urgency_numeric_passthrough() {
        let parsed: Urgency = serde_yaml::from_str("123").unwrap();
        assert_eq!(parsed.as_factor(), 123.0);
    }

    #[test]
    fn resource_cost_unknown_anchors_to_moderate() {
        assert_eq!(ResourceCost::parse_str("enormous"), ResourceCost::Moderate);
        assert_eq!(ResourceCost::parse_str("Heavy"), ResourceCost::Heavy);
    }

    #[test]
    fn folder_labels() {
        assert_eq!(TaskFolder::BacklogManual.status_label(), "backlog");
        assert_eq!(TaskFolder::BacklogGenerated.status_label(), "backlog");
        assert_eq!(TaskFolder::Active.status_label(), "active");
    }

    #[test]
    fn folder_filter_backlog_matches_both_subfolders() {
        let folders = TaskFolder::matching_filter("backlog");
        assert_eq!(
            folders,
            vec![TaskFolder::BacklogManual, TaskFolder::BacklogGenerated]
        );
        assert_eq!(TaskFolder::matching_filter("all").len(), 6);
        assert!(TaskFolder::matching_filter("bogus").is_empty());
    }

    #[test]
    fn task_yaml_roundtrip_is_byte_stable() {
        let mut task = Task::new("Fix the flaky test", "api")
            .with_description("Deflake CI")
            .with_type("maintenance");
        task.priority.impact = Some(7.0);
        task.priority.urgency = Some(Urgency::High);
        task.priority_score = Some(12.5);

        let first = serde_yaml::to_string(&task).unwrap();
        let parsed: Task = serde_yaml::from_str(&first).unwrap();
        let second = serde_yaml::to_string(&parsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn task_optional_fields_omitted() {
        let task = Task::new("T", "api");
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(!yaml.contains("analyzed_at"));
        assert!(!yaml.contains("priority_score"));
        assert!(!yaml.contains("attempts"));
        assert!(!yaml.contains("target"));
    }

    #[test]
    fn patch_only_touches_whitelisted_fields() {
        let mut task = Task::new("Old title", "api");
        let score_before = task.priority_score;
        let patch = TaskPatch {
            title: Some("New title".into()),
            description: None,
            notes: Some("checked".into()),
        };
        patch.apply(&mut task);
        assert_eq!(task.title, "New title");
        assert_eq!(task.notes.as_deref(), Some("checked"));
        assert_eq!(task.priority_score, score_before);
    }

    #[test]
    fn automated_provenance_detection() {
        assert!(Task::is_automated_provenance("ai"));
        assert!(Task::is_automated_provenance("problem-scanner"));
        assert!(!Task::is_automated_provenance("api"));
        assert!(!Task::is_automated_provenance("alice"));
    }
}

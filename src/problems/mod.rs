//! Problem tracking — classified system issues discovered by scanning.

pub mod scanner;

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::task::{PriorityEstimates, ResourceCost, Urgency};

pub use scanner::{ProblemScanner, ScanReport};

/// How bad the problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Impact estimate a task derived from this problem starts with.
    pub fn derived_impact(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 8.0,
            Severity::Medium => 5.0,
            Severity::Low => 2.0,
        }
    }
}

/// How often the problem shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Constant,
    Frequent,
    Occasional,
    Rare,
}

impl Frequency {
    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "constant" => Frequency::Constant,
            "frequent" => Frequency::Frequent,
            "rare" => Frequency::Rare,
            _ => Frequency::Occasional,
        }
    }

    /// Urgency estimate a task derived from this problem starts with.
    pub fn derived_urgency(&self) -> Urgency {
        match self {
            Frequency::Constant => Urgency::Critical,
            Frequency::Frequent => Urgency::High,
            Frequency::Occasional => Urgency::Medium,
            Frequency::Rare => Urgency::Low,
        }
    }
}

/// What the problem does to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemImpact {
    SystemDown,
    DegradedPerformance,
    UserImpact,
    Cosmetic,
}

impl ProblemImpact {
    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "system_down" => ProblemImpact::SystemDown,
            "user_impact" => ProblemImpact::UserImpact,
            "cosmetic" => ProblemImpact::Cosmetic,
            _ => ProblemImpact::DegradedPerformance,
        }
    }

    /// Resource cost estimate a task derived from this problem starts with.
    pub fn derived_cost(&self) -> ResourceCost {
        match self {
            ProblemImpact::SystemDown => ResourceCost::Heavy,
            ProblemImpact::DegradedPerformance | ProblemImpact::UserImpact => {
                ResourceCost::Moderate
            }
            ProblemImpact::Cosmetic => ResourceCost::Minimal,
        }
    }
}

/// Problem lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    Active,
    Investigating,
    Resolved,
    Ignored,
}

/// A classified system issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub frequency: Frequency,
    pub impact: ProblemImpact,
    pub status: ProblemStatus,
    pub discovered_at: DateTime<Utc>,
    pub discovered_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_occurrence: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Absolute path of the file carrying the problem marker.
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_components: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_issues: Vec<String>,
    /// IDs of tasks spawned from this problem. Resolving the problem does
    /// not cascade to them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks_created: Vec<String>,
}

impl Problem {
    /// Create an active problem discovered right now.
    pub fn discovered(
        title: impl Into<String>,
        severity: Severity,
        frequency: Frequency,
        impact: ProblemImpact,
        source_file: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let source_file = source_file.into();
        Self {
            id: problem_id(&source_file, &title),
            title,
            description: String::new(),
            severity,
            frequency,
            impact,
            status: ProblemStatus::Active,
            discovered_at: Utc::now(),
            discovered_by: "problem-scanner".to_string(),
            last_occurrence: None,
            resolved_at: None,
            resolved_by: None,
            resolution: None,
            source_file,
            affected_components: Vec::new(),
            symptoms: Vec::new(),
            evidence: BTreeMap::new(),
            related_issues: Vec::new(),
            tasks_created: Vec::new(),
        }
    }

    /// Priority estimates for a task derived from this problem.
    ///
    /// success_prob is a fixed 0.7: scanner-spawned work is assumed
    /// tractable but not certain.
    pub fn derived_estimates(&self) -> PriorityEstimates {
        PriorityEstimates {
            impact: Some(self.severity.derived_impact()),
            urgency: Some(self.frequency.derived_urgency()),
            success_prob: Some(0.7),
            resource_cost: Some(self.impact.derived_cost()),
            cooldown_hours: None,
        }
    }
}

/// Stable problem ID from source file and title, so re-scanning an
/// unchanged tree upserts instead of duplicating.
pub fn problem_id(source_file: &str, title: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source_file.hash(&mut hasher);
    title.hash(&mut hasher);
    format!("prob-{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_and_impact_map() {
        assert_eq!(Severity::parse_str("Critical"), Severity::Critical);
        assert_eq!(Severity::parse_str("nonsense"), Severity::Medium);
        assert_eq!(Severity::Critical.derived_impact(), 10.0);
        assert_eq!(Severity::High.derived_impact(), 8.0);
        assert_eq!(Severity::Low.derived_impact(), 2.0);
    }

    #[test]
    fn frequency_maps_to_urgency() {
        assert_eq!(Frequency::Constant.derived_urgency(), Urgency::Critical);
        assert_eq!(Frequency::Frequent.derived_urgency(), Urgency::High);
        assert_eq!(Frequency::Rare.derived_urgency(), Urgency::Low);
    }

    #[test]
    fn impact_maps_to_cost() {
        assert_eq!(
            ProblemImpact::SystemDown.derived_cost(),
            ResourceCost::Heavy
        );
        assert_eq!(
            ProblemImpact::DegradedPerformance.derived_cost(),
            ResourceCost::Moderate
        );
        assert_eq!(ProblemImpact::Cosmetic.derived_cost(), ResourceCost::Minimal);
    }

    #[test]
    fn problem_id_is_stable() {
        let a = problem_id("/src/db.rs", "Connection leak");
        let b = problem_id("/src/db.rs", "Connection leak");
        let c = problem_id("/src/db.rs", "Other issue");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_estimates_fix_success_prob() {
        let p = Problem::discovered(
            "leak",
            Severity::High,
            Frequency::Frequent,
            ProblemImpact::DegradedPerformance,
            "/src/db.rs",
        );
        let est = p.derived_estimates();
        assert_eq!(est.impact, Some(8.0));
        assert_eq!(est.urgency, Some(Urgency::High));
        assert_eq!(est.success_prob, Some(0.7));
        assert_eq!(est.resource_cost, Some(ResourceCost::Moderate));
    }
}

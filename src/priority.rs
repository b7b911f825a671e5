//! Priority engine — weighted multiplicative scoring of task estimates.
//!
//! The score function is pure: same estimates and weights give the same
//! score, byte for byte. The formula is multiplicative on purpose — a
//! zero impact or success probability collapses the score to 0, so an
//! uninformed or hopeless task never preempts a known-good one.

use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::task::PriorityEstimates;

/// Default numeric anchors for absent estimates.
const DEFAULT_IMPACT: f64 = 5.0;
const DEFAULT_SUCCESS_PROB: f64 = 0.5;

fn default_weight() -> f64 {
    1.0
}

/// Tunable scoring coefficients. The YAML file under `<base>/config` is
/// authoritative; the metrics sink mirror is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    #[serde(default = "default_weight")]
    pub impact: f64,
    #[serde(default = "default_weight")]
    pub urgency: f64,
    #[serde(default = "default_weight")]
    pub success: f64,
    #[serde(default = "default_weight")]
    pub cost: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            impact: 1.0,
            urgency: 1.0,
            success: 1.0,
            cost: 1.0,
        }
    }
}

/// Compute the priority score for a set of estimates.
///
/// score = (impact·w) · (urgency·w) · (success·w)
///       / (cost·w · (1 + cooldown_hours/24))
///
/// A zero factor in the denominator is substituted by 1 so the division
/// is always defined.
pub fn score(estimates: &PriorityEstimates, weights: &PriorityWeights) -> f64 {
    let impact = estimates.impact.unwrap_or(DEFAULT_IMPACT);
    let urgency = estimates
        .urgency
        .map(|u| u.as_factor())
        .unwrap_or_else(|| crate::store::task::Urgency::Medium.as_factor());
    let success = estimates.success_prob.unwrap_or(DEFAULT_SUCCESS_PROB);
    let resource_cost = estimates
        .resource_cost
        .map(|c| c.as_factor())
        .unwrap_or_else(|| crate::store::task::ResourceCost::Moderate.as_factor());
    let cooldown_hours = estimates.cooldown_hours.unwrap_or(0.0);

    let numerator = (impact * weights.impact) * (urgency * weights.urgency) * (success * weights.success);

    let cost_factor = non_zero(resource_cost * weights.cost);
    let cooldown_factor = non_zero(1.0 + cooldown_hours / 24.0);

    numerator / (cost_factor * cooldown_factor)
}

fn non_zero(factor: f64) -> f64 {
    if factor == 0.0 { 1.0 } else { factor }
}

/// Shared weights snapshot, reloadable at runtime without blocking
/// scorers: readers clone the tiny struct out from under the lock.
#[derive(Debug)]
pub struct WeightsHandle {
    current: RwLock<PriorityWeights>,
}

impl WeightsHandle {
    pub fn new(weights: PriorityWeights) -> Self {
        Self {
            current: RwLock::new(weights),
        }
    }

    /// Load weights from the YAML file, falling back to all-1.0 defaults
    /// when the file is missing or malformed.
    pub fn load(path: &Path) -> Self {
        Self::new(read_weights_file(path))
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> PriorityWeights {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in a new set of weights.
    pub fn replace(&self, weights: PriorityWeights) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = weights;
    }

    /// Re-read the YAML file and swap the snapshot.
    pub fn reload(&self, path: &Path) {
        self.replace(read_weights_file(path));
    }
}

fn read_weights_file(path: &Path) -> PriorityWeights {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_yaml::from_str(&raw) {
            Ok(weights) => weights,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed weights file, using defaults");
                PriorityWeights::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Weights file unreadable, using defaults");
            PriorityWeights::default()
        }
    }
}

/// Write the default weights file if none exists yet.
pub async fn seed_weights_file(path: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let yaml = serde_yaml::to_string(&PriorityWeights::default())
        .map_err(std::io::Error::other)?;
    tokio::fs::write(path, yaml).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::task::{ResourceCost, Urgency};

    fn estimates(
        impact: f64,
        urgency: Urgency,
        success: f64,
        cost: ResourceCost,
        cooldown: f64,
    ) -> PriorityEstimates {
        PriorityEstimates {
            impact: Some(impact),
            urgency: Some(urgency),
            success_prob: Some(success),
            resource_cost: Some(cost),
            cooldown_hours: Some(cooldown),
        }
    }

    #[test]
    fn weighted_score_reference_case() {
        // impact=8 w=1.0, urgency=high(3.0) w=0.8, success=0.8 w=0.6,
        // cost=moderate(2.0) w=0.5, cooldown=0
        let est = estimates(8.0, Urgency::High, 0.8, ResourceCost::Moderate, 0.0);
        let weights = PriorityWeights {
            impact: 1.0,
            urgency: 0.8,
            success: 0.6,
            cost: 0.5,
        };
        let got = score(&est, &weights);
        assert!((got - 9.216).abs() < 1e-9, "score was {got}");
    }

    #[test]
    fn absent_estimates_use_anchors() {
        // impact 5.0 * urgency 2.0 * success 0.5 / cost 2.0 = 2.5
        let got = score(&PriorityEstimates::default(), &PriorityWeights::default());
        assert!((got - 2.5).abs() < 1e-9);
    }

    #[test]
    fn zero_denominator_factor_substitutes_one() {
        let est = estimates(8.0, Urgency::High, 0.5, ResourceCost::Raw(0.0), 0.0);
        let got = score(&est, &PriorityWeights::default());
        // cost factor 0 → 1: 8 * 3 * 0.5 / 1
        assert!((got - 12.0).abs() < 1e-9);
    }

    #[test]
    fn zero_impact_collapses_score() {
        let est = estimates(0.0, Urgency::Critical, 1.0, ResourceCost::Minimal, 0.0);
        assert_eq!(score(&est, &PriorityWeights::default()), 0.0);
    }

    #[test]
    fn cooldown_discounts_the_score() {
        let base = estimates(8.0, Urgency::High, 0.8, ResourceCost::Moderate, 0.0);
        let cooled = estimates(8.0, Urgency::High, 0.8, ResourceCost::Moderate, 24.0);
        let weights = PriorityWeights::default();
        assert!((score(&cooled, &weights) - score(&base, &weights) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_deterministic() {
        let est = estimates(7.0, Urgency::Medium, 0.9, ResourceCost::Heavy, 6.0);
        let weights = PriorityWeights {
            impact: 1.3,
            urgency: 0.7,
            success: 1.1,
            cost: 0.9,
        };
        let a = score(&est, &weights);
        let b = score(&est, &weights);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn handle_replace_swaps_snapshot() {
        let handle = WeightsHandle::new(PriorityWeights::default());
        handle.replace(PriorityWeights {
            impact: 2.0,
            ..PriorityWeights::default()
        });
        assert_eq!(handle.snapshot().impact, 2.0);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let handle = WeightsHandle::load(Path::new("/definitely/not/here.yaml"));
        assert_eq!(handle.snapshot(), PriorityWeights::default());
    }

    #[test]
    fn weights_file_partial_fields_default_to_one() {
        let weights: PriorityWeights = serde_yaml::from_str("impact: 2.5").unwrap();
        assert_eq!(weights.impact, 2.5);
        assert_eq!(weights.urgency, 1.0);
        assert_eq!(weights.cost, 1.0);
    }
}

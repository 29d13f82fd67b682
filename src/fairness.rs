//! Advisor workload fairness: inequality of utilization across advisors and
//! a rebalancing proposal toward the department-wide utilization ratio.

use serde::{Deserialize, Serialize};

use crate::config::FairnessConfig;
use crate::models::{AdvisorCapacity, AdvisorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImbalanceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorUtilization {
    pub advisor_id: AdvisorId,
    pub current_load: u32,
    pub max_capacity: u32,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceSuggestion {
    pub advisor_id: AdvisorId,
    pub current_load: u32,
    pub target_load: u32,
    /// Positive: take on students. Negative: hand students over.
    pub transfer: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    pub gini: f64,
    pub std_dev: f64,
    pub mean_utilization: f64,
    pub imbalance: ImbalanceLevel,
    pub overall_utilization_ratio: f64,
    pub most_loaded: Vec<AdvisorUtilization>,
    pub least_loaded: Vec<AdvisorUtilization>,
    pub rebalancing: Vec<RebalanceSuggestion>,
    pub over_soft_limit: Vec<AdvisorId>,
    pub over_hard_limit: Vec<AdvisorId>,
}

/// Mean absolute difference form of the Gini coefficient. Empty or
/// zero-mean input yields 0.
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let mut numerator = 0.0;
    for x in values {
        for y in values {
            numerator += (x - y).abs();
        }
    }
    numerator / (2.0 * (n * n) as f64 * mean)
}

/// Population standard deviation; 0 for empty input.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

pub fn classify(gini: f64, config: &FairnessConfig) -> ImbalanceLevel {
    if gini > config.high_gini_above {
        ImbalanceLevel::High
    } else if gini > config.medium_gini_above {
        ImbalanceLevel::Medium
    } else {
        ImbalanceLevel::Low
    }
}

/// Target loads proportional to each advisor's capacity at the overall
/// utilization ratio; advisors off target by more than the threshold get a
/// signed transfer suggestion.
pub fn rebalance(
    advisors: &[AdvisorCapacity],
    config: &FairnessConfig,
) -> Vec<RebalanceSuggestion> {
    let ratio = overall_ratio(advisors);
    advisors
        .iter()
        .filter_map(|advisor| {
            let target_load = (f64::from(advisor.max_capacity) * ratio).round() as u32;
            let transfer = i64::from(target_load) - i64::from(advisor.current_load);
            (transfer.unsigned_abs() > u64::from(config.transfer_threshold)).then_some(
                RebalanceSuggestion {
                    advisor_id: advisor.advisor_id,
                    current_load: advisor.current_load,
                    target_load,
                    transfer,
                },
            )
        })
        .collect()
}

pub fn analyze(advisors: &[AdvisorCapacity], config: &FairnessConfig) -> FairnessReport {
    let mut utilization: Vec<AdvisorUtilization> = advisors
        .iter()
        .map(|advisor| AdvisorUtilization {
            advisor_id: advisor.advisor_id,
            current_load: advisor.current_load,
            max_capacity: advisor.max_capacity,
            utilization_pct: advisor.utilization_pct(),
        })
        .collect();
    let values: Vec<f64> = utilization.iter().map(|u| u.utilization_pct).collect();

    let gini = gini(&values);
    let mean_utilization = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };

    utilization.sort_by(|a, b| b.utilization_pct.total_cmp(&a.utilization_pct));
    let most_loaded = utilization.iter().take(config.ranking_size).cloned().collect();
    let least_loaded = utilization
        .iter()
        .rev()
        .take(config.ranking_size)
        .cloned()
        .collect();

    FairnessReport {
        gini,
        std_dev: std_dev(&values),
        mean_utilization,
        imbalance: classify(gini, config),
        overall_utilization_ratio: overall_ratio(advisors),
        most_loaded,
        least_loaded,
        rebalancing: rebalance(advisors, config),
        over_soft_limit: advisors
            .iter()
            .filter(|a| a.over_soft_limit())
            .map(|a| a.advisor_id)
            .collect(),
        over_hard_limit: advisors
            .iter()
            .filter(|a| a.over_hard_limit())
            .map(|a| a.advisor_id)
            .collect(),
    }
}

fn overall_ratio(advisors: &[AdvisorCapacity]) -> f64 {
    let total_load: u64 = advisors.iter().map(|a| u64::from(a.current_load)).sum();
    let total_capacity: u64 = advisors.iter().map(|a| u64::from(a.max_capacity)).sum();
    if total_capacity == 0 {
        return 0.0;
    }
    total_load as f64 / total_capacity as f64
}

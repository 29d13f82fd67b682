use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{EngagementConfig, EngineConfig};
use crate::models::{HazardType, RiskAssessment, RiskFactor, Severity, StudentSnapshot};

/// Per-factor sub-scores (0-100) computed upstream for one student.
pub type SubScores = BTreeMap<RiskFactor, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: RiskFactor,
    pub sub_score: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub raw: f64,
    pub score: u8,
    pub severity: Severity,
    pub hazard: HazardType,
    pub contributions: Vec<FactorContribution>,
}

/// Weighted risk score for a student under its program track's weights.
/// Missing sub-scores count as 0; out-of-range ones are clamped.
pub fn score_student(
    student: &StudentSnapshot,
    sub_scores: &SubScores,
    config: &EngineConfig,
) -> RiskScore {
    let weights = config.weights.for_track(student.track);
    let contributions: Vec<FactorContribution> = weights
        .iter()
        .map(|(factor, weight)| {
            let sub_score = sanitize_sub_score(sub_scores.get(&factor).copied());
            FactorContribution {
                factor,
                sub_score,
                weight,
                contribution: sub_score * weight,
            }
        })
        .collect();

    let raw: f64 = contributions.iter().map(|c| c.contribution).sum();
    let score = clamp_score(raw);

    RiskScore {
        raw,
        score,
        severity: config.severity.classify(score),
        hazard: dominant_hazard(&contributions),
        contributions,
    }
}

/// Builds a fresh assessment record; earlier records are never touched.
pub fn assess(
    student: &StudentSnapshot,
    sub_scores: &SubScores,
    as_of: DateTime<Utc>,
    config: &EngineConfig,
) -> RiskAssessment {
    let risk = score_student(student, sub_scores, config);
    RiskAssessment {
        id: Uuid::new_v4(),
        student_id: student.id,
        score: risk.score,
        severity: risk.severity,
        hazard: risk.hazard,
        ghost: is_ghost(student, as_of, &config.engagement),
        assessed_at: as_of,
    }
}

pub fn is_ghost(
    student: &StudentSnapshot,
    as_of: DateTime<Utc>,
    config: &EngagementConfig,
) -> bool {
    match student.days_since_login(as_of) {
        Some(days) => days > config.ghost_after_days,
        None => true,
    }
}

/// Rounds to the nearest integer score in [0, 100]. NaN maps to 0.
pub fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    // strip binary noise so that e.g. 54.499999999 from 54.5 rounds up
    let settled = (value * 1e6).round() / 1e6;
    settled.round().clamp(0.0, 100.0) as u8
}

fn sanitize_sub_score(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        Some(v) if v == f64::INFINITY => 100.0,
        _ => 0.0,
    }
}

fn dominant_hazard(contributions: &[FactorContribution]) -> HazardType {
    let mut best: Option<&FactorContribution> = None;
    for candidate in contributions.iter().filter(|c| c.contribution > 0.0) {
        if best.map_or(true, |current| candidate.contribution > current.contribution) {
            best = Some(candidate);
        }
    }
    best.map_or(HazardType::General, |c| HazardType::Factor(c.factor))
}

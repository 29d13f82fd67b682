//! Engine configuration.
//!
//! Every coefficient and cut-point the analyzers use lives here so it can be
//! tuned against historical data without touching the algorithms. Sections
//! missing from a TOML file, and fields missing from a section that is
//! present, keep their defaults. A track listed under `[weights]` replaces
//! that track's whole weight vector. The merged result is then validated.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{AdvisorCapacity, ProgramTrack, RiskFactor, Severity};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: TrackWeights,
    pub severity: SeverityBands,
    pub engagement: EngagementConfig,
    pub bottleneck: BottleneckConfig,
    pub fairness: FairnessConfig,
    pub allocation: AllocationConfig,
    pub propagation: PropagationConfig,
    pub simulation: SimulationConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("invalid engine config {}", path.display()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.weights.validate()?;
        self.severity.validate()?;
        self.engagement.validate()?;
        self.bottleneck.validate()?;
        self.fairness.validate()?;
        self.propagation.validate()?;
        self.simulation.validate()?;
        self.batch.validate()
    }
}

/// Risk factor weights for one program track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<RiskFactor, f64>);

impl WeightVector {
    pub fn new(entries: impl IntoIterator<Item = (RiskFactor, f64)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiskFactor, f64)> + '_ {
        self.0.iter().map(|(factor, weight)| (*factor, *weight))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn validate(&self, field: &str) -> EngineResult<()> {
        if self.0.is_empty() {
            return Err(EngineError::invalid(field, "weight vector is empty"));
        }
        if let Some((factor, weight)) = self
            .0
            .iter()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
        {
            return Err(EngineError::invalid(
                field,
                format!(
                    "weight for {} must be a non-negative number, got {weight}",
                    factor.as_str()
                ),
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::invalid(
                field,
                format!("weights must sum to 1.0, got {sum}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackWeights {
    pub doctoral: WeightVector,
    pub thesis_masters: WeightVector,
    pub non_thesis_masters: WeightVector,
}

impl TrackWeights {
    pub fn for_track(&self, track: ProgramTrack) -> &WeightVector {
        match track {
            ProgramTrack::Doctoral => &self.doctoral,
            ProgramTrack::ThesisMasters => &self.thesis_masters,
            ProgramTrack::NonThesisMasters => &self.non_thesis_masters,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        for track in ProgramTrack::ALL {
            self.for_track(track)
                .validate(&format!("weights.{}", track.as_str()))?;
        }
        Ok(())
    }
}

impl Default for TrackWeights {
    fn default() -> Self {
        Self {
            doctoral: WeightVector::new([
                (RiskFactor::ProgressReview, 0.35),
                (RiskFactor::QualifyingExam, 0.25),
                (RiskFactor::ThesisProposal, 0.20),
                (RiskFactor::MaxDuration, 0.15),
                (RiskFactor::ThesisProgress, 0.05),
            ]),
            thesis_masters: WeightVector::new([
                (RiskFactor::CourseworkCompletion, 0.40),
                (RiskFactor::ThesisTermRegistration, 0.30),
                (RiskFactor::AdvisorEvaluation, 0.20),
                (RiskFactor::MaxDuration, 0.10),
            ]),
            non_thesis_masters: WeightVector::new([
                (RiskFactor::GhostStudent, 0.50),
                (RiskFactor::CourseworkCompletion, 0.30),
                (RiskFactor::TermProject, 0.20),
            ]),
        }
    }
}

/// Cut-points of the canonical severity banding. Each bound is the highest
/// score that still belongs to its band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    pub low_max: u8,
    pub medium_max: u8,
    pub high_max: u8,
}

impl SeverityBands {
    pub fn classify(&self, score: u8) -> Severity {
        if score <= self.low_max {
            Severity::Low
        } else if score <= self.medium_max {
            Severity::Medium
        } else if score <= self.high_max {
            Severity::High
        } else {
            Severity::Critical
        }
    }

    /// Lowest score classified as High.
    pub fn high_threshold(&self) -> u8 {
        self.medium_max.saturating_add(1)
    }

    fn validate(&self) -> EngineResult<()> {
        if !(self.low_max < self.medium_max
            && self.medium_max < self.high_max
            && self.high_max < 100)
        {
            return Err(EngineError::invalid(
                "severity",
                "bands must satisfy low_max < medium_max < high_max < 100",
            ));
        }
        Ok(())
    }
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            low_max: 30,
            medium_max: 50,
            high_max: 70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub ghost_after_days: i64,
    pub passive_after_days: i64,
    pub inactive_after_days: i64,
    pub ghost_deduction: f64,
    pub passive_deduction: f64,
    pub inactive_deduction: f64,
    pub risk_weight: f64,
    pub high_below: f64,
    pub medium_below: f64,
}

impl EngagementConfig {
    fn validate(&self) -> EngineResult<()> {
        if !(0 <= self.inactive_after_days
            && self.inactive_after_days < self.passive_after_days
            && self.passive_after_days < self.ghost_after_days)
        {
            return Err(EngineError::invalid(
                "engagement",
                "login thresholds must satisfy 0 <= inactive < passive < ghost",
            ));
        }
        let coefficients = [
            self.ghost_deduction,
            self.passive_deduction,
            self.inactive_deduction,
            self.risk_weight,
        ];
        if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(EngineError::invalid(
                "engagement",
                "deductions and risk weight must be non-negative numbers",
            ));
        }
        if self.high_below > self.medium_below {
            return Err(EngineError::invalid(
                "engagement",
                "high_below must not exceed medium_below",
            ));
        }
        Ok(())
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            ghost_after_days: 180,
            passive_after_days: 90,
            inactive_after_days: 30,
            ghost_deduction: 50.0,
            passive_deduction: 30.0,
            inactive_deduction: 15.0,
            risk_weight: 0.3,
            high_below: 30.0,
            medium_below: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckConfig {
    pub warning_at: u8,
    pub critical_at: u8,
    pub seminar_critical_term: u32,
    pub seminar_planning_term: u32,
}

impl BottleneckConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.warning_at > self.critical_at {
            return Err(EngineError::invalid(
                "bottleneck",
                "warning_at must not exceed critical_at",
            ));
        }
        Ok(())
    }
}

impl Default for BottleneckConfig {
    fn default() -> Self {
        Self {
            warning_at: 50,
            critical_at: 70,
            seminar_critical_term: 4,
            seminar_planning_term: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    pub high_gini_above: f64,
    pub medium_gini_above: f64,
    pub transfer_threshold: u32,
    pub ranking_size: usize,
}

impl FairnessConfig {
    fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.medium_gini_above)
            || !(0.0..=1.0).contains(&self.high_gini_above)
            || self.medium_gini_above > self.high_gini_above
        {
            return Err(EngineError::invalid(
                "fairness",
                "gini thresholds must lie in [0, 1] with medium <= high",
            ));
        }
        Ok(())
    }
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            high_gini_above: 0.3,
            medium_gini_above: 0.2,
            transfer_threshold: 2,
            ranking_size: 5,
        }
    }
}

/// Which advisor limit bounds new assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityCap {
    #[default]
    Maximum,
    HardLimit,
    SoftLimit,
}

impl CapacityCap {
    pub fn limit_for(&self, advisor: &AdvisorCapacity) -> u32 {
        match self {
            CapacityCap::Maximum => advisor.max_capacity,
            CapacityCap::HardLimit => advisor.hard_limit,
            CapacityCap::SoftLimit => advisor.soft_limit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub cap: CapacityCap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub history_window: usize,
    pub decay_per_month: f64,
    pub default_horizon_months: u32,
    pub trend_band: f64,
}

impl PropagationConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.history_window < 2 {
            return Err(EngineError::invalid(
                "propagation.history_window",
                "a trend needs at least two points",
            ));
        }
        if !self.decay_per_month.is_finite()
            || !self.trend_band.is_finite()
            || self.trend_band < 0.0
        {
            return Err(EngineError::invalid(
                "propagation",
                "decay_per_month and trend_band must be finite, trend_band non-negative",
            ));
        }
        Ok(())
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            decay_per_month: 0.5,
            default_horizon_months: 12,
            trend_band: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub graduation_rate: f64,
    pub default_horizon_years: u32,
    pub rapid_growth_threshold: i64,
}

impl SimulationConfig {
    fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.graduation_rate) {
            return Err(EngineError::invalid(
                "simulation.graduation_rate",
                format!("must lie in [0, 1], got {}", self.graduation_rate),
            ));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            graduation_rate: 0.15,
            default_horizon_years: 2,
            rapid_growth_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub chunk_size: usize,
}

impl BatchConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::invalid("batch.chunk_size", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { chunk_size: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

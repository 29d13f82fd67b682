//! Batch and on-demand runs that pull records through a [`DataAccessPort`],
//! hand them to the analyzers and persist or return the results.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::allocation::{self, AllocationPlan};
use crate::bottleneck::{self, BottleneckReport};
use crate::config::EngineConfig;
use crate::engagement::{self, DisengagementSummary};
use crate::error::{EngineError, EngineResult, UpstreamError};
use crate::fairness::{self, FairnessReport};
use crate::models::{Recommendation, RiskAssessment, Stage, StudentId, StudentSnapshot};
use crate::port::{DataAccessPort, StudentRoster};
use crate::propagation::{self, RiskProjection};
use crate::recommend::{self, StudentContext};
use crate::risk;
use crate::simulation::{self, ScenarioParams, SimulationScenario};

/// Why a single student was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The snapshot was read but breaks a field rule.
    InvalidInput,
    /// The stored row could not be read as a record.
    MalformedRecord,
    /// The student disappeared between listing and lookup.
    MissingRecord,
}

impl FailureKind {
    /// Classifies an error for which [`EngineError::is_unit_scoped`] holds.
    fn of(err: &EngineError) -> Self {
        match err {
            EngineError::InputValidation { .. } => Self::InvalidInput,
            EngineError::Upstream(UpstreamError::StudentNotFound(_)) => Self::MissingRecord,
            _ => Self::MalformedRecord,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentFailure {
    pub student_id: StudentId,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub scored: Vec<RiskAssessment>,
    pub failures: Vec<StudentFailure>,
}

impl BatchOutcome {
    pub fn scored_count(&self) -> usize {
        self.scored.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Scores every student and appends one assessment each.
///
/// Rows the store could not read, snapshots that fail validation and
/// students that vanish mid-run are recorded as failures and skipped. Any
/// other error (store unreachable, write rejected) aborts the run and is
/// returned; assessments appended before the abort stay in the history.
pub async fn rescore_population<P: DataAccessPort>(
    port: &P,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> EngineResult<BatchOutcome> {
    let roster = port.fetch_students().await?;
    let chunk_size = config.batch.chunk_size.max(1);
    info!(
        students = roster.students.len(),
        rejected = roster.rejected.len(),
        chunk_size,
        "rescoring population"
    );

    let mut outcome = BatchOutcome::default();
    for row in &roster.rejected {
        warn!(student_id = %row.student_id, reason = %row.reason, "skipping unreadable student");
        outcome.failures.push(StudentFailure {
            student_id: row.student_id,
            kind: FailureKind::MalformedRecord,
            reason: row.reason.clone(),
        });
    }

    for (index, chunk) in roster.students.chunks(chunk_size).enumerate() {
        for student in chunk {
            match rescore_student(port, student, config, as_of).await {
                Ok(assessment) => outcome.scored.push(assessment),
                Err(err) if err.is_unit_scoped() => {
                    warn!(student_id = %student.id, error = %err, "skipping student");
                    outcome.failures.push(StudentFailure {
                        student_id: student.id,
                        kind: FailureKind::of(&err),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    error!(
                        student_id = %student.id,
                        error = %err,
                        scored = outcome.scored_count(),
                        "rescoring aborted"
                    );
                    return Err(err);
                }
            }
        }
        debug!(chunk = index, size = chunk.len(), "chunk scored");
    }

    info!(
        scored = outcome.scored_count(),
        failed = outcome.failure_count(),
        "rescoring finished"
    );
    Ok(outcome)
}

/// Readable snapshots of the population; unreadable rows are only logged.
async fn readable_students<P: DataAccessPort>(port: &P) -> EngineResult<Vec<StudentSnapshot>> {
    let StudentRoster { students, rejected } = port.fetch_students().await?;
    if !rejected.is_empty() {
        warn!(rejected = rejected.len(), "leaving unreadable students out of the report");
    }
    Ok(students)
}

async fn rescore_student<P: DataAccessPort>(
    port: &P,
    student: &StudentSnapshot,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> EngineResult<RiskAssessment> {
    student.validate()?;
    let sub_scores = port.fetch_sub_scores(student.id).await?;
    let assessment = risk::assess(student, &sub_scores, as_of, config);
    port.append_assessment(&assessment).await?;
    Ok(assessment)
}

/// Latest stored score per student; students never assessed are scored on
/// the spot without persisting anything.
async fn current_scores<P: DataAccessPort>(
    port: &P,
    students: &[StudentSnapshot],
    config: &EngineConfig,
) -> EngineResult<Vec<u8>> {
    let latest: HashMap<StudentId, u8> = port
        .fetch_latest_assessments()
        .await?
        .into_iter()
        .map(|assessment| (assessment.student_id, assessment.score))
        .collect();

    let mut scores = Vec::with_capacity(students.len());
    for student in students {
        let score = match latest.get(&student.id) {
            Some(score) => *score,
            None => {
                let sub_scores = port.fetch_sub_scores(student.id).await?;
                risk::score_student(student, &sub_scores, config).score
            }
        };
        scores.push(score);
    }
    Ok(scores)
}

pub async fn disengagement_report<P: DataAccessPort>(
    port: &P,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> EngineResult<DisengagementSummary> {
    let students = readable_students(port).await?;
    let scores = current_scores(port, &students, config).await?;
    let summary = engagement::summarize(
        students.iter().zip(scores.iter().copied()),
        as_of,
        &config.engagement,
    );
    info!(
        total = summary.total_students,
        ghosts = summary.ghost_count,
        high = summary.high_disengagement_count,
        "disengagement report built"
    );
    Ok(summary)
}

pub async fn bottleneck_report<P: DataAccessPort>(
    port: &P,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> EngineResult<BottleneckReport> {
    let students = readable_students(port).await?;
    let scores = current_scores(port, &students, config).await?;
    let milestones = port.fetch_milestones(None).await?;

    let report = bottleneck::detect(
        students.iter().zip(scores.iter().copied()),
        &milestones,
        as_of.date_naive(),
        &config.bottleneck,
    );
    info!(
        alerts = report.alerts.len(),
        overdue = report.overdue_milestones.len(),
        "bottleneck report built"
    );
    Ok(report)
}

pub async fn fairness_report<P: DataAccessPort>(
    port: &P,
    config: &EngineConfig,
) -> EngineResult<FairnessReport> {
    let advisors = port.fetch_advisors().await?;
    let report = fairness::analyze(&advisors, &config.fairness);
    info!(
        advisors = advisors.len(),
        gini = report.gini,
        imbalance = ?report.imbalance,
        "fairness report built"
    );
    Ok(report)
}

pub async fn allocate_new_students<P: DataAccessPort>(
    port: &P,
    students: &[StudentId],
    config: &EngineConfig,
) -> EngineResult<AllocationPlan> {
    let advisors = port.fetch_advisors().await?;
    let plan = allocation::allocate(students, &advisors, config.allocation.cap);
    if let Some(warning) = &plan.warning {
        warn!(unassigned = plan.unassigned_count(), "{warning}");
    }
    info!(
        requested = plan.requested,
        assigned = plan.assigned_count(),
        "allocation planned"
    );
    Ok(plan)
}

/// Projects from the stored history; `horizon_months` falls back to the
/// configured default.
pub async fn project_student_risk<P: DataAccessPort>(
    port: &P,
    student_id: StudentId,
    horizon_months: Option<u32>,
    config: &EngineConfig,
) -> EngineResult<RiskProjection> {
    port.fetch_student(student_id).await?;
    let history = port
        .fetch_risk_history(student_id, config.propagation.history_window)
        .await?;
    let horizon = horizon_months.unwrap_or(config.propagation.default_horizon_months);
    let projection = propagation::project(&history, horizon, config);
    if projection.insufficient_history {
        debug!(%student_id, points = history.len(), "projecting with too little history");
    }
    Ok(projection)
}

/// Runs a capacity scenario seeded from the store: students not yet
/// completed form the starting population and advisor limits under the
/// configured cap form total capacity.
pub async fn simulate_intake<P: DataAccessPort>(
    port: &P,
    intake_per_year: u64,
    horizon_years: Option<u32>,
    config: &EngineConfig,
) -> EngineResult<SimulationScenario> {
    let students = readable_students(port).await?;
    let advisors = port.fetch_advisors().await?;

    let enrolled = students
        .iter()
        .filter(|student| student.stage != Stage::Completed)
        .count() as u64;
    let capacity: u64 = advisors
        .iter()
        .map(|advisor| u64::from(config.allocation.cap.limit_for(advisor)))
        .sum();

    let mut params = ScenarioParams::new(enrolled, intake_per_year, capacity, &config.simulation);
    if let Some(years) = horizon_years {
        params.horizon_years = years;
    }
    let scenario = simulation::simulate(params, config)?;
    info!(
        scenario = %scenario.id,
        enrolled,
        capacity,
        final_population = scenario.final_year().map(|year| year.ending_population),
        "intake scenario simulated"
    );
    Ok(scenario)
}

pub async fn recommend_for_student<P: DataAccessPort>(
    port: &P,
    student_id: StudentId,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> EngineResult<Vec<Recommendation>> {
    let student = port.fetch_student(student_id).await?;
    student.validate()?;

    let risk_score = match port.fetch_risk_history(student_id, 1).await?.last() {
        Some(latest) => latest.score,
        None => {
            let sub_scores = port.fetch_sub_scores(student_id).await?;
            risk::score_student(&student, &sub_scores, config).score
        }
    };
    let milestones = port.fetch_milestones(Some(student_id)).await?;
    let overdue = bottleneck::overdue(&milestones, as_of.date_naive());

    let advisors = match student.advisor_id {
        Some(_) => port.fetch_advisors().await?,
        None => Vec::new(),
    };
    let advisor = student
        .advisor_id
        .and_then(|id| advisors.iter().find(|advisor| advisor.advisor_id == id));

    let days_since_login = student.days_since_login(as_of);
    let context = StudentContext {
        student: &student,
        risk_score,
        severity: config.severity.classify(risk_score),
        activity: engagement::activity_tier(days_since_login, &config.engagement),
        days_since_login,
        overdue_milestones: &overdue,
        advisor,
    };

    let recommendations = recommend::recommend(&context, config);
    debug!(%student_id, count = recommendations.len(), "recommendations built");
    Ok(recommendations)
}

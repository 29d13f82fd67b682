use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::BottleneckConfig;
use crate::models::{
    Milestone, MilestoneKind, Priority, SeminarStatus, Stage, StudentId, StudentSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Normal,
    Warning,
    Critical,
}

pub fn risk_band(score: u8, config: &BottleneckConfig) -> RiskBand {
    if score >= config.critical_at {
        RiskBand::Critical
    } else if score >= config.warning_at {
        RiskBand::Warning
    } else {
        RiskBand::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub stage: Stage,
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SeminarBottleneck,
    SeminarPlanning,
    MilestoneDelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAlert {
    pub kind: AlertKind,
    pub student_id: StudentId,
    pub term: u32,
    pub priority: Priority,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDwell {
    pub stage: Stage,
    pub student_count: usize,
    pub average_term: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueMilestone {
    pub student_id: StudentId,
    pub kind: MilestoneKind,
    pub target_date: NaiveDate,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateAlert {
    pub kind: AlertKind,
    pub count: usize,
    pub priority: Priority,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub funnel: Vec<FunnelStage>,
    pub alerts: Vec<StudentAlert>,
    pub dwell: Vec<StageDwell>,
    pub overdue_milestones: Vec<OverdueMilestone>,
    pub aggregate_alerts: Vec<AggregateAlert>,
}

/// Seminar gap check for a single student: a failed or missing seminar in
/// the critical term, or nothing scheduled in the planning term.
pub fn seminar_alert(student: &StudentSnapshot, config: &BottleneckConfig) -> Option<StudentAlert> {
    if student.stage == Stage::Completed {
        return None;
    }

    if student.term == config.seminar_critical_term && student.seminar != SeminarStatus::Passed {
        return Some(StudentAlert {
            kind: AlertKind::SeminarBottleneck,
            student_id: student.id,
            term: student.term,
            priority: Priority::Critical,
            message: format!(
                "critical bottleneck: term {} without a passed seminar",
                student.term
            ),
        });
    }

    if student.term == config.seminar_planning_term
        && student.seminar == SeminarStatus::NotScheduled
    {
        return Some(StudentAlert {
            kind: AlertKind::SeminarPlanning,
            student_id: student.id,
            term: student.term,
            priority: Priority::High,
            message: format!(
                "planning warning: term {} with no seminar scheduled",
                student.term
            ),
        });
    }

    None
}

/// Open or delayed milestones past their target date, earliest target first.
pub fn overdue(milestones: &[Milestone], as_of: NaiveDate) -> Vec<OverdueMilestone> {
    let mut overdue: Vec<OverdueMilestone> = milestones
        .iter()
        .filter_map(|milestone| {
            milestone
                .days_overdue(as_of)
                .map(|days_overdue| OverdueMilestone {
                    student_id: milestone.student_id,
                    kind: milestone.kind,
                    target_date: milestone.target_date,
                    days_overdue,
                })
        })
        .collect();
    overdue.sort_by(|a, b| a.target_date.cmp(&b.target_date));
    overdue
}

/// Funnel, stagnation alerts and dwell proxies over `(student, latest risk
/// score)` pairs and the milestones of the same population.
pub fn detect<'a, I>(
    students: I,
    milestones: &[Milestone],
    as_of: NaiveDate,
    config: &BottleneckConfig,
) -> BottleneckReport
where
    I: IntoIterator<Item = (&'a StudentSnapshot, u8)>,
{
    let mut funnel: BTreeMap<Stage, FunnelStage> = Stage::ALL
        .into_iter()
        .map(|stage| {
            (
                stage,
                FunnelStage {
                    stage,
                    normal: 0,
                    warning: 0,
                    critical: 0,
                    total: 0,
                },
            )
        })
        .collect();
    let mut terms: BTreeMap<Stage, (usize, u64)> = BTreeMap::new();
    let mut alerts = Vec::new();

    for (student, score) in students {
        if let Some(row) = funnel.get_mut(&student.stage) {
            match risk_band(score, config) {
                RiskBand::Normal => row.normal += 1,
                RiskBand::Warning => row.warning += 1,
                RiskBand::Critical => row.critical += 1,
            }
            row.total += 1;
        }

        let entry = terms.entry(student.stage).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(student.term);

        if let Some(alert) = seminar_alert(student, config) {
            alerts.push(alert);
        }
    }

    let dwell = terms
        .into_iter()
        .map(|(stage, (count, term_total))| StageDwell {
            stage,
            student_count: count,
            average_term: term_total as f64 / count as f64,
        })
        .collect();

    let overdue_milestones = overdue(milestones, as_of);
    let aggregate_alerts = aggregate(&alerts, &overdue_milestones, config);

    BottleneckReport {
        funnel: funnel.into_values().collect(),
        alerts,
        dwell,
        overdue_milestones,
        aggregate_alerts,
    }
}

fn aggregate(
    alerts: &[StudentAlert],
    overdue: &[OverdueMilestone],
    config: &BottleneckConfig,
) -> Vec<AggregateAlert> {
    let mut summary = Vec::new();

    let seminar_count = alerts
        .iter()
        .filter(|alert| alert.kind == AlertKind::SeminarBottleneck)
        .count();
    if seminar_count > 0 {
        summary.push(AggregateAlert {
            kind: AlertKind::SeminarBottleneck,
            count: seminar_count,
            priority: Priority::High,
            message: format!(
                "{seminar_count} students in term {} are blocked on the seminar",
                config.seminar_critical_term
            ),
        });
    }

    if !overdue.is_empty() {
        summary.push(AggregateAlert {
            kind: AlertKind::MilestoneDelay,
            count: overdue.len(),
            priority: Priority::Medium,
            message: format!("{} milestones are overdue", overdue.len()),
        });
    }

    summary
}

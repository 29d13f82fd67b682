use crate::bottleneck::{self, AlertKind, OverdueMilestone};
use crate::config::{EngineConfig, SimulationConfig};
use crate::engagement::ActivityTier;
use crate::models::{
    AdvisorCapacity, MilestoneKind, Priority, ProgramTrack, Recommendation,
    RecommendationCategory, Severity, Stage, StudentSnapshot,
};
use crate::simulation::YearProjection;

const MILESTONE_CRITICAL_AFTER_DAYS: i64 = 30;
const STALLED_COURSEWORK_TERM: u32 = 4;
const MISSED_REVIEW_LIMIT: usize = 2;
const REVIEW_LOOKBACK_DAYS: i64 = 365;

/// Everything the rule set looks at for one student.
#[derive(Debug, Clone)]
pub struct StudentContext<'a> {
    pub student: &'a StudentSnapshot,
    pub risk_score: u8,
    pub severity: Severity,
    pub activity: ActivityTier,
    pub days_since_login: Option<i64>,
    pub overdue_milestones: &'a [OverdueMilestone],
    pub advisor: Option<&'a AdvisorCapacity>,
}

type Rule = fn(&StudentContext<'_>, &EngineConfig) -> Option<Recommendation>;

/// Evaluated in this order; at most one recommendation per rule.
const RULES: &[Rule] = &[
    risk_escalation,
    seminar_gap,
    milestone_delay,
    progress_review_attendance,
    qualifying_exam_readiness,
    coursework_completion,
    disengagement,
    advisor_capacity,
];

/// Runs the rule set and orders the result by priority, highest first. Rules
/// with equal priority keep rule order.
pub fn recommend(context: &StudentContext<'_>, config: &EngineConfig) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> =
        RULES.iter().filter_map(|rule| rule(context, config)).collect();
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

/// Scenario-level advice from the final simulated year.
pub fn for_projection(
    projection: &[YearProjection],
    config: &SimulationConfig,
) -> Vec<Recommendation> {
    let Some(last) = projection.last() else {
        return Vec::new();
    };
    let mut recommendations = Vec::new();

    if !last.capacity_sufficient {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: RecommendationCategory::CapacityShortfall,
            message: format!(
                "Advisor capacity falls {} students short by year {}.",
                last.shortfall, last.year
            ),
            action: "Appoint additional advisors or raise advisor capacity limits.".to_string(),
            estimated_impact: "Keeps every enrolled student supervised".to_string(),
        });
    }

    if last.net_growth > config.rapid_growth_threshold {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            category: RecommendationCategory::RapidGrowth,
            message: format!(
                "Enrollment grows by {} students in year {}.",
                last.net_growth, last.year
            ),
            action: "Plan infrastructure and staffing for the larger cohort.".to_string(),
            estimated_impact: "Avoids capacity bottlenecks in later years".to_string(),
        });
    }

    recommendations
}

fn risk_escalation(context: &StudentContext<'_>, _: &EngineConfig) -> Option<Recommendation> {
    let priority = match context.severity {
        Severity::Critical => Priority::Critical,
        Severity::High => Priority::High,
        _ => return None,
    };
    Some(Recommendation {
        priority,
        category: RecommendationCategory::RiskManagement,
        message: format!(
            "Risk score is {} ({}); intervention is needed.",
            context.risk_score, context.severity
        ),
        action: "Schedule a meeting with the advisor to review the risk factors.".to_string(),
        estimated_impact: "Can lower the risk score by 20-30%".to_string(),
    })
}

fn seminar_gap(context: &StudentContext<'_>, config: &EngineConfig) -> Option<Recommendation> {
    let alert = bottleneck::seminar_alert(context.student, &config.bottleneck)?;
    let recommendation = match alert.kind {
        AlertKind::SeminarBottleneck => Recommendation {
            priority: Priority::Critical,
            category: RecommendationCategory::SeminarBottleneck,
            message: format!(
                "Term {} without a passed seminar blocks further progress.",
                alert.term
            ),
            action: "Enroll in the seminar immediately and pass it this term.".to_string(),
            estimated_impact: "Clears the stage blockage, lowering risk by 20-30%".to_string(),
        },
        AlertKind::SeminarPlanning => Recommendation {
            priority: Priority::High,
            category: RecommendationCategory::SeminarPlanning,
            message: format!(
                "Term {} with no seminar scheduled; next term becomes a bottleneck.",
                alert.term
            ),
            action: "Plan the seminar for this or the coming term.".to_string(),
            estimated_impact: "Prevents a future bottleneck".to_string(),
        },
        AlertKind::MilestoneDelay => return None,
    };
    Some(recommendation)
}

fn milestone_delay(context: &StudentContext<'_>, _: &EngineConfig) -> Option<Recommendation> {
    let worst = context
        .overdue_milestones
        .iter()
        .filter(|milestone| milestone.student_id == context.student.id)
        .max_by_key(|milestone| milestone.days_overdue)?;
    let count = context
        .overdue_milestones
        .iter()
        .filter(|milestone| milestone.student_id == context.student.id)
        .count();

    Some(Recommendation {
        priority: if worst.days_overdue > MILESTONE_CRITICAL_AFTER_DAYS {
            Priority::Critical
        } else {
            Priority::High
        },
        category: RecommendationCategory::MilestoneDelay,
        message: format!(
            "{count} overdue milestone(s); {} is {} days late.",
            worst.kind.display_name(),
            worst.days_overdue
        ),
        action: "Complete the overdue milestones and agree on a plan with the advisor.".to_string(),
        estimated_impact: "Stops the delay, lowering risk by 10-15%".to_string(),
    })
}

/// Progress review meetings held without the student in the last year.
fn progress_review_attendance(
    context: &StudentContext<'_>,
    _: &EngineConfig,
) -> Option<Recommendation> {
    let missed = context
        .overdue_milestones
        .iter()
        .filter(|milestone| {
            milestone.student_id == context.student.id
                && milestone.kind == MilestoneKind::ProgressReview
                && milestone.days_overdue <= REVIEW_LOOKBACK_DAYS
        })
        .count();
    if missed < MISSED_REVIEW_LIMIT {
        return None;
    }
    Some(Recommendation {
        priority: Priority::Critical,
        category: RecommendationCategory::ProgressReviewAttendance,
        message: format!("Missed {missed} progress review meetings in the last 12 months."),
        action: "Schedule the next progress review with the committee and attend it.".to_string(),
        estimated_impact: "Avoids a failing review, lowering risk by 25-35%".to_string(),
    })
}

fn qualifying_exam_readiness(
    context: &StudentContext<'_>,
    _: &EngineConfig,
) -> Option<Recommendation> {
    let student = context.student;
    if student.track != ProgramTrack::Doctoral
        || student.stage != Stage::Coursework
        || student.term < STALLED_COURSEWORK_TERM
    {
        return None;
    }
    Some(Recommendation {
        priority: Priority::High,
        category: RecommendationCategory::QualifyingExam,
        message: format!(
            "Still in coursework in term {}; the qualifying exam is due.",
            student.term
        ),
        action: "Apply for the qualifying exam and start preparing.".to_string(),
        estimated_impact: "Moves the student to the next stage, lowering risk by 15-20%"
            .to_string(),
    })
}

fn coursework_completion(context: &StudentContext<'_>, _: &EngineConfig) -> Option<Recommendation> {
    let student = context.student;
    if student.track != ProgramTrack::ThesisMasters
        || student.stage != Stage::Coursework
        || student.term < STALLED_COURSEWORK_TERM
    {
        return None;
    }
    Some(Recommendation {
        priority: Priority::Critical,
        category: RecommendationCategory::CourseCompletion,
        message: format!(
            "Coursework unfinished in term {} ({} courses, {} credits so far).",
            student.term, student.completed_courses, student.completed_credits
        ),
        action: "Take and pass the remaining courses this term.".to_string(),
        estimated_impact: "Completes the coursework stage, lowering risk by 30-40%".to_string(),
    })
}

fn disengagement(context: &StudentContext<'_>, _: &EngineConfig) -> Option<Recommendation> {
    let (priority, message) = match (context.activity, context.days_since_login) {
        (ActivityTier::Ghost, None) => (
            Priority::Critical,
            "The student has never logged in.".to_string(),
        ),
        (ActivityTier::Ghost, Some(days)) => (
            Priority::Critical,
            format!("No login for {days} days; the student is a ghost student."),
        ),
        (ActivityTier::Passive, Some(days)) => (
            Priority::High,
            format!("No login for {days} days."),
        ),
        _ => return None,
    };
    Some(Recommendation {
        priority,
        category: RecommendationCategory::Disengagement,
        message,
        action: "Contact the student to re-engage and review their academic status.".to_string(),
        estimated_impact: "Can raise engagement by 20-50%".to_string(),
    })
}

fn advisor_capacity(context: &StudentContext<'_>, _: &EngineConfig) -> Option<Recommendation> {
    let advisor = context.advisor?;
    if advisor.over_hard_limit() {
        return Some(Recommendation {
            priority: Priority::Medium,
            category: RecommendationCategory::CapacityManagement,
            message: format!(
                "The advisor supervises {} students, above the hard limit of {}.",
                advisor.current_load, advisor.hard_limit
            ),
            action: "Request a transfer to an advisor with free capacity.".to_string(),
            estimated_impact: "Balances advisor workload".to_string(),
        });
    }
    if advisor.over_soft_limit() {
        return Some(Recommendation {
            priority: Priority::Low,
            category: RecommendationCategory::CapacityManagement,
            message: format!(
                "The advisor supervises {} students, above the soft limit of {}.",
                advisor.current_load, advisor.soft_limit
            ),
            action: "Monitor the advisor's load before assigning more students.".to_string(),
            estimated_impact: "Prevents advisor overload".to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MilestoneKind, SeminarStatus};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn student(
        track: ProgramTrack,
        stage: Stage,
        term: u32,
        seminar: SeminarStatus,
    ) -> StudentSnapshot {
        StudentSnapshot {
            id: Uuid::new_v4(),
            track,
            registered_on: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            stage,
            term,
            completed_courses: 4,
            completed_credits: 28,
            seminar,
            last_login: None,
            advisor_id: None,
        }
    }

    fn context<'a>(student: &'a StudentSnapshot, severity: Severity) -> StudentContext<'a> {
        StudentContext {
            student,
            risk_score: 20,
            severity,
            activity: ActivityTier::Active,
            days_since_login: Some(3),
            overdue_milestones: &[],
            advisor: None,
        }
    }

    #[test]
    fn healthy_student_gets_nothing() {
        let config = EngineConfig::default();
        let s = student(ProgramTrack::Doctoral, Stage::ThesisWriting, 8, SeminarStatus::Passed);
        assert!(recommend(&context(&s, Severity::Low), &config).is_empty());
    }

    #[test]
    fn results_are_sorted_by_priority() {
        let config = EngineConfig::default();
        let s = student(ProgramTrack::ThesisMasters, Stage::Coursework, 4, SeminarStatus::Failed);
        let advisor = AdvisorCapacity {
            advisor_id: Uuid::new_v4(),
            current_load: 15,
            max_capacity: 16,
            soft_limit: 10,
            hard_limit: 14,
        };
        let ctx = StudentContext {
            risk_score: 64,
            activity: ActivityTier::Passive,
            days_since_login: Some(120),
            advisor: Some(&advisor),
            ..context(&s, Severity::High)
        };

        let recommendations = recommend(&ctx, &config);
        let categories: Vec<RecommendationCategory> =
            recommendations.iter().map(|r| r.category).collect();

        assert_eq!(
            categories,
            vec![
                RecommendationCategory::SeminarBottleneck,
                RecommendationCategory::CourseCompletion,
                RecommendationCategory::RiskManagement,
                RecommendationCategory::Disengagement,
                RecommendationCategory::CapacityManagement,
            ]
        );
        assert!(recommendations
            .windows(2)
            .all(|pair| pair[0].priority >= pair[1].priority));
    }

    #[test]
    fn ghost_and_critical_risk_are_critical() {
        let config = EngineConfig::default();
        let s = student(
            ProgramTrack::NonThesisMasters,
            Stage::Coursework,
            2,
            SeminarStatus::Enrolled,
        );
        let ctx = StudentContext {
            risk_score: 88,
            activity: ActivityTier::Ghost,
            days_since_login: None,
            ..context(&s, Severity::Critical)
        };

        let recommendations = recommend(&ctx, &config);
        assert_eq!(recommendations.len(), 2);
        assert!(recommendations.iter().all(|r| r.priority == Priority::Critical));
        assert_eq!(recommendations[0].category, RecommendationCategory::RiskManagement);
        assert_eq!(recommendations[1].message, "The student has never logged in.");
    }

    #[test]
    fn overdue_milestones_collapse_into_one_recommendation() {
        let config = EngineConfig::default();
        let s = student(ProgramTrack::Doctoral, Stage::ProposalDefense, 6, SeminarStatus::Passed);
        let overdue = vec![
            OverdueMilestone {
                student_id: s.id,
                kind: MilestoneKind::ThesisProposal,
                target_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                days_overdue: 12,
            },
            OverdueMilestone {
                student_id: s.id,
                kind: MilestoneKind::QualifyingExam,
                target_date: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
                days_overdue: 73,
            },
            OverdueMilestone {
                student_id: Uuid::new_v4(),
                kind: MilestoneKind::TermProject,
                target_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
                days_overdue: 100,
            },
        ];
        let ctx = StudentContext {
            overdue_milestones: &overdue,
            ..context(&s, Severity::Low)
        };

        let recommendations = recommend(&ctx, &config);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].priority, Priority::Critical);
        assert_eq!(
            recommendations[0].message,
            "2 overdue milestone(s); Qualifying exam is 73 days late."
        );
    }

    #[test]
    fn two_missed_progress_reviews_in_a_year_are_critical() {
        let config = EngineConfig::default();
        let s = student(ProgramTrack::Doctoral, Stage::ProgressReview, 7, SeminarStatus::Passed);
        let review = |days_overdue| OverdueMilestone {
            student_id: s.id,
            kind: MilestoneKind::ProgressReview,
            target_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            days_overdue,
        };

        let once = [review(40), review(400)];
        let ctx = StudentContext {
            overdue_milestones: &once,
            ..context(&s, Severity::Low)
        };
        assert!(recommend(&ctx, &config)
            .iter()
            .all(|r| r.category != RecommendationCategory::ProgressReviewAttendance));

        let twice = [review(40), review(200)];
        let ctx = StudentContext {
            overdue_milestones: &twice,
            ..context(&s, Severity::Low)
        };
        let attendance = recommend(&ctx, &config)
            .into_iter()
            .find(|r| r.category == RecommendationCategory::ProgressReviewAttendance)
            .unwrap();
        assert_eq!(attendance.priority, Priority::Critical);
        assert_eq!(
            attendance.message,
            "Missed 2 progress review meetings in the last 12 months."
        );
    }

    #[test]
    fn doctoral_stalled_in_coursework_needs_qualifying_exam() {
        let config = EngineConfig::default();
        let s = student(ProgramTrack::Doctoral, Stage::Coursework, 5, SeminarStatus::Passed);
        let recommendations = recommend(&context(&s, Severity::Medium), &config);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].category, RecommendationCategory::QualifyingExam);
        assert_eq!(recommendations[0].priority, Priority::High);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let config = EngineConfig::default();
        let s = student(
            ProgramTrack::ThesisMasters,
            Stage::Coursework,
            3,
            SeminarStatus::NotScheduled,
        );
        let ctx = StudentContext {
            activity: ActivityTier::Ghost,
            days_since_login: Some(240),
            ..context(&s, Severity::Critical)
        };
        assert_eq!(recommend(&ctx, &config), recommend(&ctx, &config));
    }

    #[test]
    fn projection_advice_uses_final_year() {
        let config = SimulationConfig::default();
        let year = |year, net_growth, shortfall| YearProjection {
            year,
            starting_population: 100,
            population: 100,
            graduates: 0,
            ending_population: 100,
            net_growth,
            intake_by_track: BTreeMap::new(),
            capacity_sufficient: shortfall == 0,
            shortfall,
            surplus: 0,
        };

        assert!(for_projection(&[], &config).is_empty());
        assert!(for_projection(&[year(1, 80, 10), year(2, 10, 0)], &config).is_empty());

        let advice = for_projection(&[year(1, 10, 0), year(2, 60, 25)], &config);
        assert_eq!(advice.len(), 2);
        assert_eq!(advice[0].category, RecommendationCategory::CapacityShortfall);
        assert_eq!(advice[0].priority, Priority::High);
        assert_eq!(advice[1].category, RecommendationCategory::RapidGrowth);
    }
}

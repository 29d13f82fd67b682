use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngagementConfig;
use crate::models::{StudentId, StudentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisengagementLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTier {
    Active,
    Inactive,
    Passive,
    Ghost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementAssessment {
    pub student_id: StudentId,
    pub days_since_login: Option<i64>,
    pub risk_score: u8,
    pub tier: ActivityTier,
    pub engagement_score: u8,
    pub ghost: bool,
    pub level: DisengagementLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisengagementSummary {
    pub total_students: usize,
    pub ghost_count: usize,
    pub high_disengagement_count: usize,
    pub average_engagement: Option<f64>,
    pub details: Vec<EngagementAssessment>,
}

/// Login recency tier. A student who never logged in is a ghost.
pub fn activity_tier(days_since_login: Option<i64>, config: &EngagementConfig) -> ActivityTier {
    match days_since_login {
        None => ActivityTier::Ghost,
        Some(days) if days > config.ghost_after_days => ActivityTier::Ghost,
        Some(days) if days > config.passive_after_days => ActivityTier::Passive,
        Some(days) if days > config.inactive_after_days => ActivityTier::Inactive,
        Some(_) => ActivityTier::Active,
    }
}

pub fn assess_engagement(
    student: &StudentSnapshot,
    risk_score: u8,
    as_of: DateTime<Utc>,
    config: &EngagementConfig,
) -> EngagementAssessment {
    let days_since_login = student.days_since_login(as_of);
    let tier = activity_tier(days_since_login, config);
    let deduction = match tier {
        ActivityTier::Ghost => config.ghost_deduction,
        ActivityTier::Passive => config.passive_deduction,
        ActivityTier::Inactive => config.inactive_deduction,
        ActivityTier::Active => 0.0,
    };

    let raw = 100.0 - deduction - f64::from(risk_score.min(100)) * config.risk_weight;
    let engagement_score = crate::risk::clamp_score(raw);

    EngagementAssessment {
        student_id: student.id,
        days_since_login,
        risk_score,
        tier,
        engagement_score,
        ghost: tier == ActivityTier::Ghost,
        level: classify(engagement_score, config),
    }
}

pub fn classify(engagement_score: u8, config: &EngagementConfig) -> DisengagementLevel {
    let score = f64::from(engagement_score);
    if score < config.high_below {
        DisengagementLevel::High
    } else if score < config.medium_below {
        DisengagementLevel::Medium
    } else {
        DisengagementLevel::Low
    }
}

/// Population view over `(student, latest risk score)` pairs.
pub fn summarize<'a, I>(
    students: I,
    as_of: DateTime<Utc>,
    config: &EngagementConfig,
) -> DisengagementSummary
where
    I: IntoIterator<Item = (&'a StudentSnapshot, u8)>,
{
    let details: Vec<EngagementAssessment> = students
        .into_iter()
        .map(|(student, risk_score)| assess_engagement(student, risk_score, as_of, config))
        .collect();

    let average_engagement = if details.is_empty() {
        None
    } else {
        let total: f64 = details.iter().map(|d| f64::from(d.engagement_score)).sum();
        Some(total / details.len() as f64)
    };

    DisengagementSummary {
        total_students: details.len(),
        ghost_count: details.iter().filter(|d| d.ghost).count(),
        high_disengagement_count: details
            .iter()
            .filter(|d| d.level == DisengagementLevel::High)
            .count(),
        average_engagement,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProgramTrack, SeminarStatus, Stage};
    use chrono::{Duration, NaiveDate, TimeZone};
    use uuid::Uuid;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    fn student_last_seen(days_ago: Option<i64>) -> StudentSnapshot {
        StudentSnapshot {
            id: Uuid::new_v4(),
            track: ProgramTrack::NonThesisMasters,
            registered_on: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            stage: Stage::Coursework,
            term: 3,
            completed_courses: 4,
            completed_credits: 30,
            seminar: SeminarStatus::NotScheduled,
            last_login: days_ago.map(|days| as_of() - Duration::days(days)),
            advisor_id: None,
        }
    }

    #[test]
    fn ghost_login_with_moderate_risk() {
        let config = EngagementConfig::default();
        let result = assess_engagement(&student_last_seen(Some(200)), 40, as_of(), &config);

        assert_eq!(result.engagement_score, 38);
        assert_eq!(result.level, DisengagementLevel::Medium);
        assert!(result.ghost);
        assert_eq!(result.days_since_login, Some(200));
    }

    #[test]
    fn tiers_follow_login_recency() {
        let config = EngagementConfig::default();
        assert_eq!(activity_tier(Some(10), &config), ActivityTier::Active);
        assert_eq!(activity_tier(Some(30), &config), ActivityTier::Active);
        assert_eq!(activity_tier(Some(31), &config), ActivityTier::Inactive);
        assert_eq!(activity_tier(Some(91), &config), ActivityTier::Passive);
        assert_eq!(activity_tier(Some(180), &config), ActivityTier::Passive);
        assert_eq!(activity_tier(Some(181), &config), ActivityTier::Ghost);
        assert_eq!(activity_tier(None, &config), ActivityTier::Ghost);
    }

    #[test]
    fn never_logged_in_is_worst_tier() {
        let config = EngagementConfig::default();
        let result = assess_engagement(&student_last_seen(None), 0, as_of(), &config);
        assert_eq!(result.engagement_score, 50);
        assert!(result.ghost);
        assert_eq!(result.level, DisengagementLevel::Low);
    }

    #[test]
    fn score_never_drops_below_zero() {
        let config = EngagementConfig::default();
        let result = assess_engagement(&student_last_seen(Some(400)), 100, as_of(), &config);
        assert_eq!(result.engagement_score, 20);
        assert_eq!(result.level, DisengagementLevel::High);

        let harsh = EngagementConfig {
            risk_weight: 2.0,
            ..EngagementConfig::default()
        };
        let result = assess_engagement(&student_last_seen(Some(400)), 100, as_of(), &harsh);
        assert_eq!(result.engagement_score, 0);
    }

    #[test]
    fn summary_counts_and_average() {
        let config = EngagementConfig::default();
        let active = student_last_seen(Some(3));
        let ghost = student_last_seen(Some(365));
        let summary = summarize([(&active, 0), (&ghost, 100)], as_of(), &config);

        assert_eq!(summary.total_students, 2);
        assert_eq!(summary.ghost_count, 1);
        assert_eq!(summary.high_disengagement_count, 1);
        assert_eq!(summary.average_engagement, Some(60.0));
    }

    #[test]
    fn empty_population_has_no_average() {
        let summary = summarize(
            std::iter::empty::<(&StudentSnapshot, u8)>(),
            as_of(),
            &EngagementConfig::default(),
        );
        assert_eq!(summary.total_students, 0);
        assert_eq!(summary.average_engagement, None);
    }
}

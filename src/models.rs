use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

pub type StudentId = Uuid;
pub type AdvisorId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramTrack {
    Doctoral,
    ThesisMasters,
    NonThesisMasters,
}

impl ProgramTrack {
    pub const ALL: [ProgramTrack; 3] = [
        ProgramTrack::Doctoral,
        ProgramTrack::ThesisMasters,
        ProgramTrack::NonThesisMasters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramTrack::Doctoral => "doctoral",
            ProgramTrack::ThesisMasters => "thesis_masters",
            ProgramTrack::NonThesisMasters => "non_thesis_masters",
        }
    }
}

impl FromStr for ProgramTrack {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ProgramTrack::ALL
            .into_iter()
            .find(|track| track.as_str() == value)
            .ok_or_else(|| format!("unknown program track `{value}`"))
    }
}

/// Pipeline stage. Declaration order is the stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Coursework,
    Qualifying,
    ProposalDefense,
    ProgressReview,
    ThesisWriting,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Coursework,
        Stage::Qualifying,
        Stage::ProposalDefense,
        Stage::ProgressReview,
        Stage::ThesisWriting,
        Stage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Coursework => "coursework",
            Stage::Qualifying => "qualifying",
            Stage::ProposalDefense => "proposal_defense",
            Stage::ProgressReview => "progress_review",
            Stage::ThesisWriting => "thesis_writing",
            Stage::Completed => "completed",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| format!("unknown stage `{value}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeminarStatus {
    NotScheduled,
    Enrolled,
    Failed,
    Passed,
}

impl SeminarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeminarStatus::NotScheduled => "not_scheduled",
            SeminarStatus::Enrolled => "enrolled",
            SeminarStatus::Failed => "failed",
            SeminarStatus::Passed => "passed",
        }
    }
}

impl FromStr for SeminarStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            SeminarStatus::NotScheduled,
            SeminarStatus::Enrolled,
            SeminarStatus::Failed,
            SeminarStatus::Passed,
        ]
        .into_iter()
        .find(|status| status.as_str() == value)
        .ok_or_else(|| format!("unknown seminar status `{value}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub id: StudentId,
    pub track: ProgramTrack,
    pub registered_on: NaiveDate,
    pub stage: Stage,
    pub term: u32,
    pub completed_courses: u32,
    pub completed_credits: u32,
    pub seminar: SeminarStatus,
    pub last_login: Option<DateTime<Utc>>,
    pub advisor_id: Option<AdvisorId>,
}

impl StudentSnapshot {
    /// Whole days between the last login and `as_of`, floored at zero.
    /// `None` when the student never logged in.
    pub fn days_since_login(&self, as_of: DateTime<Utc>) -> Option<i64> {
        self.last_login
            .map(|login| (as_of - login).num_days().max(0))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.term == 0 {
            return Err(EngineError::invalid(
                format!("student {}.term", self.id),
                "term numbers start at 1",
            ));
        }
        Ok(())
    }
}

/// Canonical severity band of a 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    ProgressReview,
    QualifyingExam,
    ThesisProposal,
    MaxDuration,
    ThesisProgress,
    CourseworkCompletion,
    ThesisTermRegistration,
    AdvisorEvaluation,
    GhostStudent,
    TermProject,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 10] = [
        RiskFactor::ProgressReview,
        RiskFactor::QualifyingExam,
        RiskFactor::ThesisProposal,
        RiskFactor::MaxDuration,
        RiskFactor::ThesisProgress,
        RiskFactor::CourseworkCompletion,
        RiskFactor::ThesisTermRegistration,
        RiskFactor::AdvisorEvaluation,
        RiskFactor::GhostStudent,
        RiskFactor::TermProject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::ProgressReview => "progress_review",
            RiskFactor::QualifyingExam => "qualifying_exam",
            RiskFactor::ThesisProposal => "thesis_proposal",
            RiskFactor::MaxDuration => "max_duration",
            RiskFactor::ThesisProgress => "thesis_progress",
            RiskFactor::CourseworkCompletion => "coursework_completion",
            RiskFactor::ThesisTermRegistration => "thesis_term_registration",
            RiskFactor::AdvisorEvaluation => "advisor_evaluation",
            RiskFactor::GhostStudent => "ghost_student",
            RiskFactor::TermProject => "term_project",
        }
    }
}

impl FromStr for RiskFactor {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RiskFactor::ALL
            .into_iter()
            .find(|factor| factor.as_str() == value)
            .ok_or_else(|| format!("unknown risk factor `{value}`"))
    }
}

/// Dominant source of a student's risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    General,
    Factor(RiskFactor),
}

impl HazardType {
    pub fn label(&self) -> &'static str {
        match self {
            HazardType::General => "general",
            HazardType::Factor(factor) => factor.as_str(),
        }
    }
}

impl FromStr for HazardType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "general" {
            return Ok(HazardType::General);
        }
        value.parse().map(HazardType::Factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub student_id: StudentId,
    pub score: u8,
    pub severity: Severity,
    pub hazard: HazardType,
    pub ghost: bool,
    pub assessed_at: DateTime<Utc>,
}

/// Append-only, chronologically ordered assessment history of one student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentLog {
    entries: Vec<RiskAssessment>,
}

impl AssessmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records arriving out of order are placed by timestamp; records with
    /// equal timestamps keep arrival order.
    pub fn append(&mut self, assessment: RiskAssessment) {
        let at = self
            .entries
            .partition_point(|entry| entry.assessed_at <= assessment.assessed_at);
        self.entries.insert(at, assessment);
    }

    pub fn latest(&self) -> Option<&RiskAssessment> {
        self.entries.last()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[RiskAssessment] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskAssessment> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RiskAssessment> for AssessmentLog {
    fn from_iter<I: IntoIterator<Item = RiskAssessment>>(iter: I) -> Self {
        let mut log = AssessmentLog::new();
        for assessment in iter {
            log.append(assessment);
        }
        log
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorCapacity {
    pub advisor_id: AdvisorId,
    pub current_load: u32,
    pub max_capacity: u32,
    pub soft_limit: u32,
    pub hard_limit: u32,
}

impl AdvisorCapacity {
    /// Load as a percentage of maximum capacity. An advisor with no
    /// capacity counts as fully used once any student is assigned.
    pub fn utilization_pct(&self) -> f64 {
        if self.max_capacity == 0 {
            return if self.current_load == 0 { 0.0 } else { 100.0 };
        }
        f64::from(self.current_load) / f64::from(self.max_capacity) * 100.0
    }

    pub fn over_soft_limit(&self) -> bool {
        self.current_load > self.soft_limit
    }

    pub fn over_hard_limit(&self) -> bool {
        self.current_load > self.hard_limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    QualifyingExam,
    ThesisProposal,
    ThesisDefense,
    TermProject,
    Seminar,
    ProgressReview,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneKind::QualifyingExam => "qualifying_exam",
            MilestoneKind::ThesisProposal => "thesis_proposal",
            MilestoneKind::ThesisDefense => "thesis_defense",
            MilestoneKind::TermProject => "term_project",
            MilestoneKind::Seminar => "seminar",
            MilestoneKind::ProgressReview => "progress_review",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MilestoneKind::QualifyingExam => "Qualifying exam",
            MilestoneKind::ThesisProposal => "Thesis proposal",
            MilestoneKind::ThesisDefense => "Thesis defense",
            MilestoneKind::TermProject => "Term project",
            MilestoneKind::Seminar => "Seminar",
            MilestoneKind::ProgressReview => "Progress review meeting",
        }
    }
}

impl FromStr for MilestoneKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            MilestoneKind::QualifyingExam,
            MilestoneKind::ThesisProposal,
            MilestoneKind::ThesisDefense,
            MilestoneKind::TermProject,
            MilestoneKind::Seminar,
            MilestoneKind::ProgressReview,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
        .ok_or_else(|| format!("unknown milestone type `{value}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Completed,
    Delayed,
}

impl FromStr for MilestoneStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(MilestoneStatus::Pending),
            "completed" => Ok(MilestoneStatus::Completed),
            "delayed" => Ok(MilestoneStatus::Delayed),
            other => Err(format!("unknown milestone status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub student_id: StudentId,
    pub kind: MilestoneKind,
    pub target_date: NaiveDate,
    pub actual_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
}

impl Milestone {
    /// Days past the target date for milestones that are still open, or
    /// explicitly delayed. `None` for completed or not-yet-due milestones.
    pub fn days_overdue(&self, as_of: NaiveDate) -> Option<i64> {
        let late_by = (as_of - self.target_date).num_days();
        match self.status {
            MilestoneStatus::Completed => None,
            MilestoneStatus::Delayed => Some(late_by.max(0)),
            MilestoneStatus::Pending if late_by > 0 => Some(late_by),
            MilestoneStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    RiskManagement,
    SeminarBottleneck,
    SeminarPlanning,
    MilestoneDelay,
    ProgressReviewAttendance,
    QualifyingExam,
    CourseCompletion,
    Disengagement,
    CapacityManagement,
    CapacityShortfall,
    RapidGrowth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: RecommendationCategory,
    pub message: String,
    pub action: String,
    pub estimated_impact: String,
}

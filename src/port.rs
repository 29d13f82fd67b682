//! The engine's only window onto stored data. Implementations convert
//! whatever the store holds into typed records and reject malformed rows at
//! this boundary.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::UpstreamError;
use crate::models::{
    AdvisorCapacity, AssessmentLog, Milestone, RiskAssessment, StudentId, StudentSnapshot,
};
use crate::risk::SubScores;

/// A store row that could not be read as a student snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub student_id: StudentId,
    pub reason: String,
}

/// Population listing. Rows that fail boundary validation are reported
/// next to the valid snapshots instead of failing the whole listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRoster {
    pub students: Vec<StudentSnapshot>,
    pub rejected: Vec<RejectedRow>,
}

impl StudentRoster {
    pub fn len(&self) -> usize {
        self.students.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty() && self.rejected.is_empty()
    }
}

pub trait DataAccessPort: Send + Sync {
    fn fetch_students(&self) -> impl Future<Output = Result<StudentRoster, UpstreamError>> + Send;

    fn fetch_student(
        &self,
        id: StudentId,
    ) -> impl Future<Output = Result<StudentSnapshot, UpstreamError>> + Send;

    /// Pre-computed factor sub-scores; factors the store has nothing for are
    /// simply absent.
    fn fetch_sub_scores(
        &self,
        id: StudentId,
    ) -> impl Future<Output = Result<SubScores, UpstreamError>> + Send;

    fn fetch_advisors(
        &self,
    ) -> impl Future<Output = Result<Vec<AdvisorCapacity>, UpstreamError>> + Send;

    /// Milestones of one student, or of everyone when `student` is `None`.
    fn fetch_milestones(
        &self,
        student: Option<StudentId>,
    ) -> impl Future<Output = Result<Vec<Milestone>, UpstreamError>> + Send;

    /// Up to `limit` most recent assessments of a student, oldest first.
    fn fetch_risk_history(
        &self,
        id: StudentId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RiskAssessment>, UpstreamError>> + Send;

    /// Most recent assessment of every student that has one.
    fn fetch_latest_assessments(
        &self,
    ) -> impl Future<Output = Result<Vec<RiskAssessment>, UpstreamError>> + Send;

    /// Appends to the student's history. Never overwrites earlier records.
    fn append_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;
}

/// In-process store holding typed records, with one append-only log per
/// student.
#[derive(Debug, Default)]
pub struct MemoryStore {
    students: Vec<StudentSnapshot>,
    rejected: Vec<RejectedRow>,
    sub_scores: HashMap<StudentId, SubScores>,
    advisors: Vec<AdvisorCapacity>,
    milestones: Vec<Milestone>,
    assessments: RwLock<HashMap<StudentId, AssessmentLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_student(mut self, student: StudentSnapshot, sub_scores: SubScores) -> Self {
        self.sub_scores.insert(student.id, sub_scores);
        self.students.push(student);
        self
    }

    /// Registers a row that the listing reports as unreadable.
    pub fn with_rejected_row(mut self, student_id: StudentId, reason: impl Into<String>) -> Self {
        self.rejected.push(RejectedRow {
            student_id,
            reason: reason.into(),
        });
        self
    }

    pub fn with_advisor(mut self, advisor: AdvisorCapacity) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestones.push(milestone);
        self
    }

    pub fn with_assessment(mut self, assessment: RiskAssessment) -> Self {
        self.assessments
            .get_mut()
            .entry(assessment.student_id)
            .or_default()
            .append(assessment);
        self
    }

    pub async fn history(&self, id: StudentId) -> AssessmentLog {
        self.assessments
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

impl DataAccessPort for MemoryStore {
    async fn fetch_students(&self) -> Result<StudentRoster, UpstreamError> {
        Ok(StudentRoster {
            students: self.students.clone(),
            rejected: self.rejected.clone(),
        })
    }

    async fn fetch_student(&self, id: StudentId) -> Result<StudentSnapshot, UpstreamError> {
        self.students
            .iter()
            .find(|student| student.id == id)
            .cloned()
            .ok_or(UpstreamError::StudentNotFound(id))
    }

    async fn fetch_sub_scores(&self, id: StudentId) -> Result<SubScores, UpstreamError> {
        Ok(self.sub_scores.get(&id).cloned().unwrap_or_default())
    }

    async fn fetch_advisors(&self) -> Result<Vec<AdvisorCapacity>, UpstreamError> {
        Ok(self.advisors.clone())
    }

    async fn fetch_milestones(
        &self,
        student: Option<StudentId>,
    ) -> Result<Vec<Milestone>, UpstreamError> {
        Ok(self
            .milestones
            .iter()
            .filter(|milestone| student.map_or(true, |id| milestone.student_id == id))
            .cloned()
            .collect())
    }

    async fn fetch_risk_history(
        &self,
        id: StudentId,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, UpstreamError> {
        Ok(self
            .assessments
            .read()
            .await
            .get(&id)
            .map(|log| log.recent(limit).to_vec())
            .unwrap_or_default())
    }

    async fn fetch_latest_assessments(&self) -> Result<Vec<RiskAssessment>, UpstreamError> {
        Ok(self
            .assessments
            .read()
            .await
            .values()
            .filter_map(|log| log.latest().cloned())
            .collect())
    }

    async fn append_assessment(&self, assessment: &RiskAssessment) -> Result<(), UpstreamError> {
        self.assessments
            .write()
            .await
            .entry(assessment.student_id)
            .or_default()
            .append(assessment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HazardType, ProgramTrack, SeminarStatus, Severity, Stage};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn student() -> StudentSnapshot {
        StudentSnapshot {
            id: Uuid::new_v4(),
            track: ProgramTrack::ThesisMasters,
            registered_on: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            stage: Stage::Coursework,
            term: 2,
            completed_courses: 3,
            completed_credits: 18,
            seminar: SeminarStatus::Enrolled,
            last_login: None,
            advisor_id: None,
        }
    }

    fn assessment(student_id: StudentId, score: u8, days: i64) -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            student_id,
            score,
            severity: Severity::Low,
            hazard: HazardType::General,
            ghost: false,
            assessed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(days),
        }
    }

    #[tokio::test]
    async fn appends_never_replace_history() {
        let s = student();
        let store = MemoryStore::new()
            .with_student(s.clone(), SubScores::new())
            .with_assessment(assessment(s.id, 10, 0));

        store.append_assessment(&assessment(s.id, 30, 2)).await.unwrap();
        store.append_assessment(&assessment(s.id, 20, 1)).await.unwrap();

        let history = store.fetch_risk_history(s.id, 10).await.unwrap();
        let scores: Vec<u8> = history.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![10, 20, 30]);

        let recent = store.fetch_risk_history(s.id, 2).await.unwrap();
        assert_eq!(recent.iter().map(|a| a.score).collect::<Vec<_>>(), vec![20, 30]);

        let latest = store.fetch_latest_assessments().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].score, 30);
        assert_eq!(store.history(s.id).await.len(), 3);
    }

    #[tokio::test]
    async fn listing_reports_rejected_rows_beside_students() {
        let s = student();
        let bad = Uuid::new_v4();
        let store = MemoryStore::new()
            .with_student(s.clone(), SubScores::new())
            .with_rejected_row(bad, "stage: unknown stage `limbo`");

        let roster = store.fetch_students().await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.students, vec![s]);
        assert_eq!(roster.rejected[0].student_id, bad);
        assert!(matches!(
            store.fetch_student(bad).await,
            Err(UpstreamError::StudentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.fetch_student(id).await,
            Err(UpstreamError::StudentNotFound(missing)) if missing == id
        ));
        assert!(store.fetch_sub_scores(id).await.unwrap().is_empty());
        assert!(store.fetch_risk_history(id, 6).await.unwrap().is_empty());
    }
}

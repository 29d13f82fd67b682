use std::str::FromStr;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::models::{
    AdvisorCapacity, Milestone, RiskAssessment, RiskFactor, StudentId, StudentSnapshot,
};
use crate::port::{DataAccessPort, RejectedRow, StudentRoster};
use crate::risk::SubScores;

const STUDENT_COLUMNS: &str = "id, program_track, registered_on, stage, term, completed_courses, \
     completed_credits, seminar_status, last_login, advisor_id";

const ASSESSMENT_COLUMNS: &str =
    "id, student_id, score, severity, hazard_type, is_ghost, assessed_at";

/// Postgres-backed [`DataAccessPort`]. Rows are checked on the way in; a row
/// that does not describe a valid record is reported as malformed rather
/// than patched up.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, UpstreamError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| {
                UpstreamError::Unavailable(format!("failed to connect to Postgres: {err}"))
            })?;
        Ok(Self::new(pool))
    }
}

impl DataAccessPort for PgStore {
    async fn fetch_students(&self) -> Result<StudentRoster, UpstreamError> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM graduate_progress.students ORDER BY registered_on, id"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "fetched student snapshots");

        let mut roster = StudentRoster::default();
        for row in &rows {
            let student_id: StudentId = row.try_get("id")?;
            match student_from_row(row) {
                Ok(student) => roster.students.push(student),
                Err(err @ UpstreamError::Malformed { .. }) => {
                    warn!(%student_id, error = %err, "rejecting student row");
                    roster.rejected.push(RejectedRow {
                        student_id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(roster)
    }

    async fn fetch_student(&self, id: StudentId) -> Result<StudentSnapshot, UpstreamError> {
        let query =
            format!("SELECT {STUDENT_COLUMNS} FROM graduate_progress.students WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(UpstreamError::StudentNotFound(id))?;
        student_from_row(&row)
    }

    async fn fetch_sub_scores(&self, id: StudentId) -> Result<SubScores, UpstreamError> {
        let rows = sqlx::query(
            "SELECT factor, score FROM graduate_progress.student_sub_scores WHERE student_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = SubScores::new();
        for row in rows {
            let factor: RiskFactor = parse_text(&row, "factor", "sub-score")?;
            let score: f64 = row.try_get("score")?;
            scores.insert(factor, score);
        }
        Ok(scores)
    }

    async fn fetch_advisors(&self) -> Result<Vec<AdvisorCapacity>, UpstreamError> {
        let rows = sqlx::query(
            "SELECT id, current_load, max_capacity, soft_limit, hard_limit \
             FROM graduate_progress.advisors ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        debug!(rows = rows.len(), "fetched advisor capacities");

        rows.iter().map(advisor_from_row).collect()
    }

    async fn fetch_milestones(
        &self,
        student: Option<StudentId>,
    ) -> Result<Vec<Milestone>, UpstreamError> {
        let mut query = String::from(
            "SELECT student_id, milestone_type, target_date, actual_date, status \
             FROM graduate_progress.milestones",
        );
        if student.is_some() {
            query.push_str(" WHERE student_id = $1");
        }
        query.push_str(" ORDER BY target_date");

        let mut rows = sqlx::query(&query);
        if let Some(id) = student {
            rows = rows.bind(id);
        }
        let records = rows.fetch_all(&self.pool).await?;

        records.iter().map(milestone_from_row).collect()
    }

    async fn fetch_risk_history(
        &self,
        id: StudentId,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, UpstreamError> {
        let query = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM graduate_progress.risk_assessments \
             WHERE student_id = $1 ORDER BY assessed_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut history = rows
            .iter()
            .map(assessment_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        history.reverse();
        Ok(history)
    }

    async fn fetch_latest_assessments(&self) -> Result<Vec<RiskAssessment>, UpstreamError> {
        let query = format!(
            "SELECT DISTINCT ON (student_id) {ASSESSMENT_COLUMNS} \
             FROM graduate_progress.risk_assessments \
             ORDER BY student_id, assessed_at DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(assessment_from_row).collect()
    }

    async fn append_assessment(&self, assessment: &RiskAssessment) -> Result<(), UpstreamError> {
        sqlx::query(
            r#"
            INSERT INTO graduate_progress.risk_assessments
            (id, student_id, score, severity, hazard_type, is_ghost, assessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assessment.id)
        .bind(assessment.student_id)
        .bind(i16::from(assessment.score))
        .bind(assessment.severity.as_str())
        .bind(assessment.hazard.label())
        .bind(assessment.ghost)
        .bind(assessment.assessed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| UpstreamError::Write {
            entity: "risk assessment",
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

fn student_from_row(row: &PgRow) -> Result<StudentSnapshot, UpstreamError> {
    Ok(StudentSnapshot {
        id: row.try_get("id")?,
        track: parse_text(row, "program_track", "student")?,
        registered_on: row.try_get("registered_on")?,
        stage: parse_text(row, "stage", "student")?,
        term: count(row, "term", "student")?,
        completed_courses: count(row, "completed_courses", "student")?,
        completed_credits: count(row, "completed_credits", "student")?,
        seminar: parse_text(row, "seminar_status", "student")?,
        last_login: row.try_get("last_login")?,
        advisor_id: row.try_get("advisor_id")?,
    })
}

fn advisor_from_row(row: &PgRow) -> Result<AdvisorCapacity, UpstreamError> {
    Ok(AdvisorCapacity {
        advisor_id: row.try_get("id")?,
        current_load: count(row, "current_load", "advisor")?,
        max_capacity: count(row, "max_capacity", "advisor")?,
        soft_limit: count(row, "soft_limit", "advisor")?,
        hard_limit: count(row, "hard_limit", "advisor")?,
    })
}

fn milestone_from_row(row: &PgRow) -> Result<Milestone, UpstreamError> {
    Ok(Milestone {
        student_id: row.try_get("student_id")?,
        kind: parse_text(row, "milestone_type", "milestone")?,
        target_date: row.try_get("target_date")?,
        actual_date: row.try_get("actual_date")?,
        status: parse_text(row, "status", "milestone")?,
    })
}

fn assessment_from_row(row: &PgRow) -> Result<RiskAssessment, UpstreamError> {
    let raw_score: i16 = row.try_get("score")?;
    let score = u8::try_from(raw_score)
        .ok()
        .filter(|score| *score <= 100)
        .ok_or_else(|| {
            UpstreamError::malformed("risk assessment", format!("score {raw_score} outside 0-100"))
        })?;

    Ok(RiskAssessment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        score,
        severity: parse_text(row, "severity", "risk assessment")?,
        hazard: parse_text(row, "hazard_type", "risk assessment")?,
        ghost: row.try_get("is_ghost")?,
        assessed_at: row.try_get("assessed_at")?,
    })
}

fn parse_text<T>(row: &PgRow, column: &str, entity: &'static str) -> Result<T, UpstreamError>
where
    T: FromStr<Err = String>,
{
    let value: String = row.try_get(column)?;
    value
        .parse()
        .map_err(|reason: String| UpstreamError::malformed(entity, format!("{column}: {reason}")))
}

fn count(row: &PgRow, column: &str, entity: &'static str) -> Result<u32, UpstreamError> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| UpstreamError::malformed(entity, format!("{column} is negative ({value})")))
}

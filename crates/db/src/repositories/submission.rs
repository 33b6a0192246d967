use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use formchain_core::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType, StepStatus};
use formchain_core::domain::form_type::FormTypeId;
use formchain_core::domain::staff::StaffId;
use formchain_core::domain::submission::{
    ApprovalChain, ReferenceNumber, StudentId, Submission, SubmissionId, SubmissionStatus,
};
use formchain_core::workflow::DecisionOutcome;

use super::{
    chain_after_decision, column, decode_version, parse_optional_timestamp, parse_timestamp,
    RepositoryError, SubmissionStore,
};
use crate::DbPool;

const SUBMISSION_COLUMNS: &str = "id, reference_number, student_id, form_type_id, form_data, \
     status, submitted_at, completed_at, rejection_reason, version";

const STEP_COLUMNS: &str = "id, submission_id, approval_type, sequence_order, \
     assigned_approver_id, status, comments, rejection_reason, decided_at, decided_by, version, \
     created_at";

pub struct SqlSubmissionStore {
    pool: DbPool,
}

impl SqlSubmissionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step WHERE submission_id = ? ORDER BY sequence_order"
        ))
        .bind(&submission_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_from_row).collect()
    }
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission, RepositoryError> {
    let status: String = column(row, "status")?;
    let form_data: String = column(row, "form_data")?;
    let submitted_at: String = column(row, "submitted_at")?;

    Ok(Submission {
        id: SubmissionId(column(row, "id")?),
        reference_number: ReferenceNumber(column(row, "reference_number")?),
        student_id: StudentId(column(row, "student_id")?),
        form_type_id: FormTypeId(column(row, "form_type_id")?),
        form_data: serde_json::from_str(&form_data)
            .map_err(|e| RepositoryError::Decode(format!("form_data: {e}")))?,
        status: SubmissionStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown submission status `{status}`")))?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at)?,
        completed_at: parse_optional_timestamp("completed_at", column(row, "completed_at")?)?,
        rejection_reason: column(row, "rejection_reason")?,
        version: decode_version("submission.version", column(row, "version")?)?,
    })
}

fn step_from_row(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let approval_type: String = column(row, "approval_type")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;

    Ok(ApprovalStep {
        id: ApprovalStepId(column(row, "id")?),
        submission_id: SubmissionId(column(row, "submission_id")?),
        approval_type: ApprovalType::parse(&approval_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown approval type `{approval_type}`"))
        })?,
        sequence_order: column(row, "sequence_order")?,
        assigned_approver_id: column::<Option<String>>(row, "assigned_approver_id")?.map(StaffId),
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        comments: column(row, "comments")?,
        rejection_reason: column(row, "rejection_reason")?,
        decided_at: parse_optional_timestamp("decided_at", column(row, "decided_at")?)?,
        decided_by: column::<Option<String>>(row, "decided_by")?.map(StaffId),
        version: decode_version("approval_step.version", column(row, "version")?)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl SubmissionStore for SqlSubmissionStore {
    async fn next_reference_number(
        &self,
        prefix: &str,
        year: i32,
    ) -> Result<ReferenceNumber, RepositoryError> {
        let prefix = prefix.trim().to_ascii_uppercase();
        let row = sqlx::query(
            "INSERT INTO reference_sequence (prefix, year, last_value) VALUES (?, ?, 1)
             ON CONFLICT(prefix, year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
        )
        .bind(&prefix)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        let sequence: i64 = column(&row, "last_value")?;
        let sequence = u32::try_from(sequence)
            .map_err(|_| RepositoryError::Decode(format!("reference sequence {sequence}")))?;
        Ok(ReferenceNumber::compose(&prefix, year, sequence))
    }

    async fn create_submission(&self, chain: ApprovalChain) -> Result<(), RepositoryError> {
        let submission = &chain.submission;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO submission (id, reference_number, student_id, form_type_id, form_data,
                                     status, submitted_at, completed_at, rejection_reason, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&submission.id.0)
        .bind(&submission.reference_number.0)
        .bind(&submission.student_id.0)
        .bind(&submission.form_type_id.0)
        .bind(submission.form_data.to_string())
        .bind(submission.status.as_str())
        .bind(submission.submitted_at.to_rfc3339())
        .bind(submission.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&submission.rejection_reason)
        .bind(i64::from(submission.version))
        .execute(&mut *tx)
        .await?;

        for step in &chain.steps {
            sqlx::query(&format!(
                "INSERT INTO approval_step ({STEP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&step.id.0)
            .bind(&step.submission_id.0)
            .bind(step.approval_type.as_str())
            .bind(step.sequence_order)
            .bind(step.assigned_approver_id.as_ref().map(|id| id.0.as_str()))
            .bind(step.status.as_str())
            .bind(&step.comments)
            .bind(&step.rejection_reason)
            .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
            .bind(step.decided_by.as_ref().map(|id| id.0.as_str()))
            .bind(i64::from(step.version))
            .bind(step.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_chain(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<ApprovalChain>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SUBMISSION_COLUMNS} FROM submission WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let submission = submission_from_row(&row)?;
        let steps = self.load_steps(&submission.id).await?;
        Ok(Some(ApprovalChain::new(submission, steps)))
    }

    async fn save_decision(
        &self,
        snapshot: &ApprovalChain,
        outcome: &DecisionOutcome,
    ) -> Result<ApprovalChain, RepositoryError> {
        let updated = chain_after_decision(snapshot, outcome)?;
        let submission = &updated.submission;
        let mut tx = self.pool.begin().await?;

        let written = sqlx::query(
            "UPDATE submission
             SET status = ?, completed_at = ?, rejection_reason = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(submission.status.as_str())
        .bind(submission.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&submission.rejection_reason)
        .bind(&submission.id.0)
        .bind(i64::from(snapshot.submission.version))
        .execute(&mut *tx)
        .await?;

        if written.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "submission {} changed since version {}",
                submission.id, snapshot.submission.version
            )));
        }

        // Touched steps in the outcome still carry the versions they were read at.
        for step in outcome.touched_steps() {
            let written = sqlx::query(
                "UPDATE approval_step
                 SET assigned_approver_id = ?, status = ?, comments = ?, rejection_reason = ?,
                     decided_at = ?, decided_by = ?, version = version + 1
                 WHERE id = ? AND submission_id = ? AND version = ?",
            )
            .bind(step.assigned_approver_id.as_ref().map(|id| id.0.as_str()))
            .bind(step.status.as_str())
            .bind(&step.comments)
            .bind(&step.rejection_reason)
            .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
            .bind(step.decided_by.as_ref().map(|id| id.0.as_str()))
            .bind(&step.id.0)
            .bind(&submission.id.0)
            .bind(i64::from(step.version))
            .execute(&mut *tx)
            .await?;

            if written.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "approval step {} changed since version {}",
                    step.id, step.version
                )));
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_chains(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<ApprovalChain>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submission WHERE status = ?
                     ORDER BY submitted_at ASC, id ASC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submission ORDER BY submitted_at ASC, id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut chains = Vec::with_capacity(rows.len());
        for row in &rows {
            let submission = submission_from_row(row)?;
            let steps = self.load_steps(&submission.id).await?;
            chains.push(ApprovalChain::new(submission, steps));
        }
        Ok(chains)
    }

    async fn list_decided_by(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE decided_by = ? AND status != 'pending'
             ORDER BY decided_at DESC, id ASC"
        ))
        .bind(&staff_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_from_row).collect()
    }

    async fn save_reconciled_status(
        &self,
        repaired: &Submission,
    ) -> Result<Submission, RepositoryError> {
        let written = sqlx::query(
            "UPDATE submission
             SET status = ?, completed_at = ?, rejection_reason = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(repaired.status.as_str())
        .bind(repaired.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&repaired.rejection_reason)
        .bind(&repaired.id.0)
        .bind(i64::from(repaired.version))
        .execute(&self.pool)
        .await?;

        if written.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "submission {} changed since version {}",
                repaired.id, repaired.version
            )));
        }

        let mut stored = repaired.clone();
        stored.version += 1;
        Ok(stored)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, ApprovalStepId};
use crate::domain::form_type::FormTypeId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Human-readable submission reference, `<PREFIX>-<YEAR>-<SEQ>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceNumber(pub String);

impl ReferenceNumber {
    pub fn compose(prefix: &str, year: i32, sequence: u32) -> Self {
        Self(format!("{}-{year}-{sequence:06}", prefix.trim().to_ascii_uppercase()))
    }

    /// Returns `(prefix, year, sequence)` for a well-formed reference.
    pub fn parts(&self) -> Option<(&str, i32, u32)> {
        let mut segments = self.0.rsplitn(3, '-');
        let sequence = segments.next()?.parse::<u32>().ok()?;
        let year = segments.next()?.parse::<i32>().ok()?;
        let prefix = segments.next().filter(|prefix| !prefix.is_empty())?;
        Some((prefix, year, sequence))
    }
}

impl std::fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub reference_number: ReferenceNumber,
    pub student_id: StudentId,
    pub form_type_id: FormTypeId,
    pub form_data: serde_json::Value,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub version: u32,
}

impl Submission {
    pub fn new(
        id: SubmissionId,
        reference_number: ReferenceNumber,
        student_id: StudentId,
        form_type_id: FormTypeId,
        form_data: serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            reference_number,
            student_id,
            form_type_id,
            form_data,
            status: SubmissionStatus::Submitted,
            submitted_at,
            completed_at: None,
            rejection_reason: None,
            version: 0,
        }
    }

    /// Records a derived status. Terminal fields are written once; a terminal
    /// submission only accepts its own status again, as a no-op.
    pub fn settle(
        &mut self,
        status: SubmissionStatus,
        at: DateTime<Utc>,
        rejection_reason: Option<String>,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            if self.status == status {
                return Ok(());
            }
            return Err(DomainError::InvalidSubmissionTransition { from: self.status, to: status });
        }

        match status {
            SubmissionStatus::Submitted => {
                if rejection_reason.is_some() {
                    return Err(DomainError::InvariantViolation(
                        "rejection reason on an open submission".to_string(),
                    ));
                }
            }
            SubmissionStatus::Approved => {
                if rejection_reason.is_some() {
                    return Err(DomainError::InvariantViolation(
                        "rejection reason on an approved submission".to_string(),
                    ));
                }
                self.status = status;
                self.completed_at = Some(at);
            }
            SubmissionStatus::Rejected => {
                let reason = rejection_reason
                    .map(|reason| reason.trim().to_string())
                    .filter(|reason| !reason.is_empty())
                    .ok_or_else(|| {
                        DomainError::InvariantViolation(
                            "rejected submission requires a rejection reason".to_string(),
                        )
                    })?;
                self.status = status;
                self.completed_at = Some(at);
                self.rejection_reason = Some(reason);
            }
        }

        Ok(())
    }
}

/// A submission together with its approval steps; loaded and saved as one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalChain {
    pub submission: Submission,
    pub steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    pub fn new(submission: Submission, mut steps: Vec<ApprovalStep>) -> Self {
        steps.sort_by_key(|step| step.sequence_order);
        Self { submission, steps }
    }

    pub fn step(&self, step_id: &ApprovalStepId) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| &step.id == step_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ReferenceNumber, StudentId, Submission, SubmissionId, SubmissionStatus};
    use crate::domain::form_type::FormTypeId;
    use crate::errors::DomainError;

    fn submission() -> Submission {
        Submission::new(
            SubmissionId("sub-1".to_string()),
            ReferenceNumber::compose("frm", 2026, 42),
            StudentId("stu-1".to_string()),
            FormTypeId("transcript".to_string()),
            serde_json::json!({ "copies": 2 }),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn reference_number_is_zero_padded_and_parseable() {
        let reference = ReferenceNumber::compose("frm", 2026, 42);
        assert_eq!(reference.0, "FRM-2026-000042");
        assert_eq!(reference.parts(), Some(("FRM", 2026, 42)));
        assert_eq!(ReferenceNumber("garbage".to_string()).parts(), None);
    }

    #[test]
    fn completed_at_is_written_once() {
        let mut submission = submission();
        let first = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap();

        submission.settle(SubmissionStatus::Approved, first, None).expect("first settle");
        submission.settle(SubmissionStatus::Approved, later, None).expect("repeat is a no-op");

        assert_eq!(submission.completed_at, Some(first));
    }

    #[test]
    fn terminal_submission_cannot_flip() {
        let mut submission = submission();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        submission
            .settle(SubmissionStatus::Rejected, at, Some("Missing signature".to_string()))
            .expect("reject");

        let error = submission
            .settle(SubmissionStatus::Approved, at, None)
            .expect_err("rejected submissions stay rejected");
        assert!(matches!(error, DomainError::InvalidSubmissionTransition { .. }));
        assert_eq!(submission.rejection_reason.as_deref(), Some("Missing signature"));
    }

    #[test]
    fn rejection_requires_reason() {
        let mut submission = submission();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let error = submission
            .settle(SubmissionStatus::Rejected, at, Some("   ".to_string()))
            .expect_err("blank reason");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
        assert_eq!(submission.status, SubmissionStatus::Submitted);
        assert_eq!(submission.completed_at, None);
    }
}

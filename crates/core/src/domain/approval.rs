use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::staff::StaffId;
use crate::domain::submission::SubmissionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalStepId(pub String);

impl std::fmt::Display for ApprovalStepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role that must act on a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    Lecturer,
    Dean,
    Registrar,
    AccountsReceivable,
}

impl ApprovalType {
    /// Order in which roles appear in a freshly built chain.
    pub const CANONICAL_ORDER: [ApprovalType; 4] =
        [Self::Lecturer, Self::Dean, Self::Registrar, Self::AccountsReceivable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lecturer => "lecturer",
            Self::Dean => "dean",
            Self::Registrar => "registrar",
            Self::AccountsReceivable => "accounts_receivable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "lecturer" | "teacher" => Some(Self::Lecturer),
            "dean" => Some(Self::Dean),
            "registrar" => Some(Self::Registrar),
            "accounts_receivable" | "accountsreceivable" => Some(Self::AccountsReceivable),
            _ => None,
        }
    }

    /// Whether the student may pick the approver for this step at submission time.
    pub fn is_student_selectable(&self) -> bool {
        matches!(self, Self::Lecturer | Self::Dean)
    }
}

impl std::fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub submission_id: SubmissionId,
    pub approval_type: ApprovalType,
    pub sequence_order: i32,
    pub assigned_approver_id: Option<StaffId>,
    pub status: StepStatus,
    pub comments: Option<String>,
    pub rejection_reason: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<StaffId>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl ApprovalStep {
    pub fn pending(
        id: ApprovalStepId,
        submission_id: SubmissionId,
        approval_type: ApprovalType,
        sequence_order: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            submission_id,
            approval_type,
            sequence_order,
            assigned_approver_id: None,
            status: StepStatus::Pending,
            comments: None,
            rejection_reason: None,
            decided_at: None,
            decided_by: None,
            version: 0,
            created_at,
        }
    }

    pub fn with_assignee(mut self, staff_id: StaffId) -> Self {
        self.assigned_approver_id = Some(staff_id);
        self
    }

    pub fn is_assigned_to(&self, staff_id: &StaffId) -> bool {
        self.assigned_approver_id.as_ref() == Some(staff_id)
    }
}

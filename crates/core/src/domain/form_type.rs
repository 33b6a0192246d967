use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType};
use crate::domain::staff::StaffId;
use crate::domain::submission::SubmissionId;
use crate::errors::DomainError;
use crate::workflow::{ChainDefect, WorkflowError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormTypeId(pub String);

impl std::fmt::Display for FormTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormType {
    pub id: FormTypeId,
    pub name: String,
    pub requires_lecturer_approval: bool,
    pub requires_dean_approval: bool,
    pub requires_registrar_approval: bool,
    pub requires_accounts_receivable_approval: bool,
    pub is_active: bool,
}

impl FormType {
    pub fn required_approvals(&self) -> Vec<ApprovalType> {
        ApprovalType::CANONICAL_ORDER
            .into_iter()
            .filter(|approval_type| self.requires(*approval_type))
            .collect()
    }

    pub fn requires(&self, approval_type: ApprovalType) -> bool {
        match approval_type {
            ApprovalType::Lecturer => self.requires_lecturer_approval,
            ApprovalType::Dean => self.requires_dean_approval,
            ApprovalType::Registrar => self.requires_registrar_approval,
            ApprovalType::AccountsReceivable => self.requires_accounts_receivable_approval,
        }
    }

    /// Role of the first step, which is the one a student may pre-assign.
    pub fn first_approval(&self) -> Option<ApprovalType> {
        self.required_approvals().into_iter().next()
    }
}

/// Builds the initial, all-pending step set for a new submission.
///
/// Steps are numbered 1..=n in canonical role order. `initial_assignee` is
/// attached to the first step only when that step's role is one a student
/// picks (lecturer or dean); role-queue steps start unassigned.
pub fn build_chain(
    form_type: &FormType,
    submission_id: &SubmissionId,
    initial_assignee: Option<StaffId>,
    created_at: DateTime<Utc>,
) -> Result<Vec<ApprovalStep>, DomainError> {
    if !form_type.is_active {
        return Err(DomainError::InvariantViolation(format!(
            "form type `{}` is not accepting submissions",
            form_type.id
        )));
    }

    let required = form_type.required_approvals();
    if required.is_empty() {
        return Err(WorkflowError::MalformedChain(ChainDefect::Empty).into());
    }

    let mut initial_assignee = initial_assignee;
    let steps = required
        .into_iter()
        .zip(1..)
        .map(|(approval_type, sequence_order)| {
            let step = ApprovalStep::pending(
                ApprovalStepId(Uuid::new_v4().to_string()),
                submission_id.clone(),
                approval_type,
                sequence_order,
                created_at,
            );
            match initial_assignee.take() {
                Some(staff_id) if sequence_order == 1 && approval_type.is_student_selectable() => {
                    step.with_assignee(staff_id)
                }
                _ => step,
            }
        })
        .collect();

    Ok(steps)
}

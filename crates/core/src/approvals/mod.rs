use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType};
use crate::domain::staff::{StaffId, StaffMember};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentFailure {
    UnknownStaff { staff_id: StaffId },
    InactiveStaff { staff_id: StaffId },
    RoleMismatch { staff_id: StaffId, role: String, required: ApprovalType },
    NoUnassignedSuccessor { step_id: ApprovalStepId },
}

impl AssignmentFailure {
    fn reason(&self) -> String {
        match self {
            Self::UnknownStaff { staff_id } => format!("staff member `{staff_id}` does not exist"),
            Self::InactiveStaff { staff_id } => format!("staff member `{staff_id}` is inactive"),
            Self::RoleMismatch { staff_id, role, required } => {
                format!("staff member `{staff_id}` with role `{role}` cannot act as `{required}`")
            }
            Self::NoUnassignedSuccessor { step_id } => {
                format!("no unassigned step follows `{step_id}`")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<AssignmentFailure>,
    /// Step the staff member would be assigned to, when one was resolved.
    pub target_step_id: Option<ApprovalStepId>,
}

impl AssignmentValidationResult {
    fn allow(reason: impl Into<String>, target_step_id: Option<ApprovalStepId>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None, target_step_id }
    }

    fn deny(failure: AssignmentFailure, target_step_id: Option<ApprovalStepId>) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure), target_step_id }
    }
}

/// Decides whether a staff member may be put on an approval step.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssignmentValidator;

impl AssignmentValidator {
    pub fn new() -> Self {
        Self
    }

    /// `staff` is the directory lookup for `staff_id`; `None` means it was not found.
    pub fn validate(
        &self,
        staff_id: &StaffId,
        staff: Option<&StaffMember>,
        approval_type: ApprovalType,
    ) -> AssignmentValidationResult {
        self.validate_for_step(staff_id, staff, approval_type, None)
    }

    /// Validates a `next_assignee_id` against the step it would land on: the
    /// first unassigned step after `decided_step_id`.
    pub fn validate_next_assignee(
        &self,
        steps: &[ApprovalStep],
        decided_step_id: &ApprovalStepId,
        staff_id: &StaffId,
        staff: Option<&StaffMember>,
    ) -> AssignmentValidationResult {
        match assignment_target(steps, decided_step_id) {
            Some(target) => self.validate_for_step(
                staff_id,
                staff,
                target.approval_type,
                Some(target.id.clone()),
            ),
            None => AssignmentValidationResult::deny(
                AssignmentFailure::NoUnassignedSuccessor { step_id: decided_step_id.clone() },
                None,
            ),
        }
    }

    fn validate_for_step(
        &self,
        staff_id: &StaffId,
        staff: Option<&StaffMember>,
        approval_type: ApprovalType,
        target_step_id: Option<ApprovalStepId>,
    ) -> AssignmentValidationResult {
        let Some(staff) = staff else {
            return AssignmentValidationResult::deny(
                AssignmentFailure::UnknownStaff { staff_id: staff_id.clone() },
                target_step_id,
            );
        };

        if !staff.is_active {
            return AssignmentValidationResult::deny(
                AssignmentFailure::InactiveStaff { staff_id: staff_id.clone() },
                target_step_id,
            );
        }

        if !staff.holds_role(approval_type) {
            return AssignmentValidationResult::deny(
                AssignmentFailure::RoleMismatch {
                    staff_id: staff_id.clone(),
                    role: staff.role.clone(),
                    required: approval_type,
                },
                target_step_id,
            );
        }

        AssignmentValidationResult::allow(
            format!("{} may act as `{approval_type}`", staff.display_name()),
            target_step_id,
        )
    }
}

/// First unassigned step ordered after `decided_step_id`, if any.
pub fn assignment_target<'a>(
    steps: &'a [ApprovalStep],
    decided_step_id: &ApprovalStepId,
) -> Option<&'a ApprovalStep> {
    let decided_order = steps.iter().find(|step| &step.id == decided_step_id)?.sequence_order;
    steps
        .iter()
        .filter(|step| step.sequence_order > decided_order && step.assigned_approver_id.is_none())
        .min_by_key(|step| step.sequence_order)
}

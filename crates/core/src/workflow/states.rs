use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, ApprovalStepId};
use crate::domain::staff::StaffId;
use crate::domain::submission::{ApprovalChain, SubmissionStatus};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveStep {
    pub step_id: ApprovalStepId,
    pub decided_by: StaffId,
    pub comments: Option<String>,
    /// Approver picked for the next unassigned step further down the chain.
    pub next_assignee_id: Option<StaffId>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectStep {
    pub step_id: ApprovalStepId,
    pub decided_by: StaffId,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepDecision {
    Approve(ApproveStep),
    Reject(RejectStep),
}

impl StepDecision {
    pub fn step_id(&self) -> &ApprovalStepId {
        match self {
            Self::Approve(command) => &command.step_id,
            Self::Reject(command) => &command.step_id,
        }
    }

    pub fn decided_by(&self) -> &StaffId {
        match self {
            Self::Approve(command) => &command.decided_by,
            Self::Reject(command) => &command.decided_by,
        }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Approve(_) => DecisionKind::Approved,
            Self::Reject(_) => DecisionKind::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approved,
    Rejected,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: DecisionKind,
    pub decided_step_id: ApprovalStepId,
    pub decided_at: DateTime<Utc>,
    /// The whole chain after the decision, ordered by `sequence_order`.
    pub updated_steps: Vec<ApprovalStep>,
    pub submission_status: SubmissionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub assigned_step_id: Option<ApprovalStepId>,
    /// Assigned approver that was bypassed when someone else decided the step.
    pub override_of: Option<StaffId>,
}

impl DecisionOutcome {
    /// Steps whose rows changed: the decided step and, if any, the newly assigned one.
    pub fn touched_steps(&self) -> impl Iterator<Item = &ApprovalStep> {
        self.updated_steps.iter().filter(move |step| {
            step.id == self.decided_step_id || Some(&step.id) == self.assigned_step_id.as_ref()
        })
    }

    pub fn decided_step(&self) -> Option<&ApprovalStep> {
        self.updated_steps.iter().find(|step| step.id == self.decided_step_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.submission_status.is_terminal()
    }

    /// Writes the outcome into an in-memory chain snapshot.
    pub fn apply_to(&self, chain: &mut ApprovalChain) -> Result<(), DomainError> {
        chain.submission.settle(
            self.submission_status,
            self.completed_at.unwrap_or(self.decided_at),
            self.rejection_reason.clone(),
        )?;
        chain.steps = self.updated_steps.clone();
        Ok(())
    }
}

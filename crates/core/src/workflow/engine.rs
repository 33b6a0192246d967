use std::collections::BTreeSet;

use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{ApprovalStep, ApprovalStepId, StepStatus};
use crate::domain::staff::StaffId;
use crate::domain::submission::SubmissionStatus;
use crate::workflow::states::{
    ApproveStep, DecisionKind, DecisionOutcome, RejectStep, StepDecision,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step `{step_id}` is not ready: {reason}")]
    NotReady { step_id: ApprovalStepId, reason: NotReadyReason },
    #[error("rejecting step `{step_id}` requires a non-empty reason")]
    MissingReason { step_id: ApprovalStepId },
    #[error("malformed approval chain: {0}")]
    MalformedChain(ChainDefect),
}

impl WorkflowError {
    fn not_ready(step_id: &ApprovalStepId, reason: NotReadyReason) -> Self {
        Self::NotReady { step_id: step_id.clone(), reason }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotReadyReason {
    #[error("no such step in this chain")]
    UnknownStep,
    #[error("step is already {}", .0.as_str())]
    AlreadyDecided(StepStatus),
    #[error("waiting on step `{blocking_step_id}` at sequence order {sequence_order}")]
    BlockedBy { blocking_step_id: ApprovalStepId, sequence_order: i32 },
    #[error("submission is already {}", .0.as_str())]
    SubmissionClosed(SubmissionStatus),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainDefect {
    #[error("submission has no approval steps")]
    Empty,
    #[error("sequence order {0} is used by more than one step")]
    DuplicateSequenceOrder(i32),
    #[error("steps belong to more than one submission")]
    MixedSubmissions,
}

/// Sequential approval state machine over an in-memory step snapshot.
///
/// Every operation is a pure function of its inputs: it never performs I/O and
/// never mutates the slice it is given. Callers persist the returned
/// [`DecisionOutcome`] under optimistic concurrency control.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalWorkflowEngine;

impl ApprovalWorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_chain(&self, steps: &[ApprovalStep]) -> Result<(), WorkflowError> {
        validate_chain(steps)
    }

    /// Steps an approver queue should surface right now.
    ///
    /// A step qualifies when it is pending and every step with a smaller
    /// sequence order is approved. Nothing qualifies once any step is rejected.
    /// The result holds at most one step; chains with duplicate sequence orders
    /// are reported as [`WorkflowError::MalformedChain`] instead.
    pub fn compute_ready_steps<'a>(
        &self,
        steps: &'a [ApprovalStep],
    ) -> Result<Vec<&'a ApprovalStep>, WorkflowError> {
        compute_ready_steps(steps)
    }

    pub fn next_ready_step<'a>(
        &self,
        steps: &'a [ApprovalStep],
    ) -> Result<Option<&'a ApprovalStep>, WorkflowError> {
        Ok(compute_ready_steps(steps)?.into_iter().next())
    }

    pub fn derive_submission_status(&self, steps: &[ApprovalStep]) -> SubmissionStatus {
        derive_submission_status(steps)
    }

    pub fn approve_step(
        &self,
        steps: &[ApprovalStep],
        command: &ApproveStep,
    ) -> Result<DecisionOutcome, WorkflowError> {
        approve_step(steps, command)
    }

    pub fn reject_step(
        &self,
        steps: &[ApprovalStep],
        command: &RejectStep,
    ) -> Result<DecisionOutcome, WorkflowError> {
        reject_step(steps, command)
    }

    pub fn apply(
        &self,
        steps: &[ApprovalStep],
        decision: &StepDecision,
    ) -> Result<DecisionOutcome, WorkflowError> {
        match decision {
            StepDecision::Approve(command) => approve_step(steps, command),
            StepDecision::Reject(command) => reject_step(steps, command),
        }
    }

    pub fn apply_with_audit<S>(
        &self,
        steps: &[ApprovalStep],
        decision: &StepDecision,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<DecisionOutcome, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.apply(steps, decision);
        match &result {
            Ok(outcome) => emit_outcome_events(sink, audit, outcome),
            Err(error) => {
                sink.emit(
                    audit
                        .event("approval.decision_refused", AuditCategory::Decision, AuditOutcome::Rejected)
                        .with_metadata("step_id", decision.step_id().0.clone())
                        .with_metadata("decided_by", decision.decided_by().0.clone())
                        .with_metadata("decision", decision.kind().as_str())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn emit_outcome_events<S>(sink: &S, audit: &AuditContext, outcome: &DecisionOutcome)
where
    S: AuditSink,
{
    let event_type = match outcome.decision {
        DecisionKind::Approved => "approval.step_approved",
        DecisionKind::Rejected => "approval.step_rejected",
    };
    let mut event = audit
        .event(event_type, AuditCategory::Decision, AuditOutcome::Success)
        .with_metadata("step_id", outcome.decided_step_id.0.clone())
        .with_metadata("submission_status", outcome.submission_status.as_str());
    if let Some(step) = outcome.decided_step() {
        event = event
            .with_metadata("approval_type", step.approval_type.as_str())
            .with_metadata("sequence_order", step.sequence_order.to_string());
    }
    sink.emit(event);

    if let Some(bypassed) = &outcome.override_of {
        sink.emit(
            audit
                .event("approval.override_decision", AuditCategory::Decision, AuditOutcome::Success)
                .with_metadata("step_id", outcome.decided_step_id.0.clone())
                .with_metadata("assigned_approver_id", bypassed.0.clone()),
        );
    }

    if let Some(assigned_step_id) = &outcome.assigned_step_id {
        let assignee = outcome
            .updated_steps
            .iter()
            .find(|step| &step.id == assigned_step_id)
            .and_then(|step| step.assigned_approver_id.as_ref())
            .map(|staff_id| staff_id.0.clone())
            .unwrap_or_default();
        sink.emit(
            audit
                .event("approval.next_assignee_set", AuditCategory::Assignment, AuditOutcome::Success)
                .with_metadata("step_id", assigned_step_id.0.clone())
                .with_metadata("assignee_id", assignee),
        );
    }

    if outcome.is_terminal() {
        sink.emit(
            audit
                .event("submission.completed", AuditCategory::Decision, AuditOutcome::Success)
                .with_metadata("status", outcome.submission_status.as_str()),
        );
    }
}

fn validate_chain(steps: &[ApprovalStep]) -> Result<(), WorkflowError> {
    let Some(first) = steps.first() else {
        return Err(WorkflowError::MalformedChain(ChainDefect::Empty));
    };

    if steps.iter().any(|step| step.submission_id != first.submission_id) {
        return Err(WorkflowError::MalformedChain(ChainDefect::MixedSubmissions));
    }

    let mut seen = BTreeSet::new();
    for step in steps {
        if !seen.insert(step.sequence_order) {
            return Err(WorkflowError::MalformedChain(ChainDefect::DuplicateSequenceOrder(
                step.sequence_order,
            )));
        }
    }

    Ok(())
}

fn ordered(steps: &[ApprovalStep]) -> Vec<&ApprovalStep> {
    let mut ordered: Vec<&ApprovalStep> = steps.iter().collect();
    ordered.sort_by_key(|step| step.sequence_order);
    ordered
}

fn compute_ready_steps(steps: &[ApprovalStep]) -> Result<Vec<&ApprovalStep>, WorkflowError> {
    validate_chain(steps)?;

    // A rejection anywhere closes the chain, including steps ordered before it.
    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return Ok(Vec::new());
    }

    let first_pending =
        ordered(steps).into_iter().find(|step| step.status == StepStatus::Pending);
    Ok(first_pending.into_iter().collect())
}

fn derive_submission_status(steps: &[ApprovalStep]) -> SubmissionStatus {
    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return SubmissionStatus::Rejected;
    }

    // An empty chain is malformed, never vacuously approved.
    if !steps.is_empty() && steps.iter().all(|step| step.status == StepStatus::Approved) {
        return SubmissionStatus::Approved;
    }

    SubmissionStatus::Submitted
}

/// Returns the targeted step if it is the ready step, otherwise explains why not.
fn locate_ready<'a>(
    steps: &'a [ApprovalStep],
    step_id: &ApprovalStepId,
) -> Result<&'a ApprovalStep, WorkflowError> {
    let ready = compute_ready_steps(steps)?;
    if let Some(step) = ready.into_iter().find(|step| &step.id == step_id) {
        return Ok(step);
    }

    let Some(target) = steps.iter().find(|step| &step.id == step_id) else {
        return Err(WorkflowError::not_ready(step_id, NotReadyReason::UnknownStep));
    };

    if target.status.is_terminal() {
        return Err(WorkflowError::not_ready(
            step_id,
            NotReadyReason::AlreadyDecided(target.status),
        ));
    }

    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return Err(WorkflowError::not_ready(
            step_id,
            NotReadyReason::SubmissionClosed(SubmissionStatus::Rejected),
        ));
    }

    // A pending step outside the ready set always has an unapproved predecessor.
    let blocker = ordered(steps).into_iter().find(|step| {
        step.sequence_order < target.sequence_order && step.status != StepStatus::Approved
    });
    let reason = match blocker {
        Some(blocker) => NotReadyReason::BlockedBy {
            blocking_step_id: blocker.id.clone(),
            sequence_order: blocker.sequence_order,
        },
        None => NotReadyReason::AlreadyDecided(target.status),
    };
    Err(WorkflowError::not_ready(step_id, reason))
}

/// Stamps the decision fields shared by approve and reject.
///
/// An unassigned step is claimed by the staff member deciding it. Returns the
/// assigned approver when someone else decided in their place.
fn stamp_decision(
    step: &mut ApprovalStep,
    decided_by: &StaffId,
    decided_at: chrono::DateTime<chrono::Utc>,
) -> Option<StaffId> {
    let override_of = match &step.assigned_approver_id {
        Some(assigned) if assigned != decided_by => Some(assigned.clone()),
        Some(_) => None,
        None => {
            step.assigned_approver_id = Some(decided_by.clone());
            None
        }
    };
    step.decided_at = Some(decided_at);
    step.decided_by = Some(decided_by.clone());
    override_of
}

fn approve_step(
    steps: &[ApprovalStep],
    command: &ApproveStep,
) -> Result<DecisionOutcome, WorkflowError> {
    let target_order = locate_ready(steps, &command.step_id)?.sequence_order;

    let mut updated: Vec<ApprovalStep> = ordered(steps).into_iter().cloned().collect();
    let mut override_of = None;
    if let Some(step) = updated.iter_mut().find(|step| step.id == command.step_id) {
        override_of = stamp_decision(step, &command.decided_by, command.decided_at);
        step.status = StepStatus::Approved;
        step.comments = non_blank(command.comments.as_deref());
    }

    let mut assigned_step_id = None;
    if let Some(next_assignee_id) = &command.next_assignee_id {
        let successor = updated.iter_mut().find(|step| {
            step.sequence_order > target_order && step.assigned_approver_id.is_none()
        });
        if let Some(successor) = successor {
            successor.assigned_approver_id = Some(next_assignee_id.clone());
            assigned_step_id = Some(successor.id.clone());
        }
    }

    let submission_status = derive_submission_status(&updated);
    Ok(DecisionOutcome {
        decision: DecisionKind::Approved,
        decided_step_id: command.step_id.clone(),
        decided_at: command.decided_at,
        updated_steps: updated,
        submission_status,
        completed_at: submission_status.is_terminal().then_some(command.decided_at),
        rejection_reason: None,
        assigned_step_id,
        override_of,
    })
}

fn reject_step(
    steps: &[ApprovalStep],
    command: &RejectStep,
) -> Result<DecisionOutcome, WorkflowError> {
    let Some(reason) = non_blank(Some(&command.reason)) else {
        return Err(WorkflowError::MissingReason { step_id: command.step_id.clone() });
    };
    locate_ready(steps, &command.step_id)?;

    let mut updated: Vec<ApprovalStep> = ordered(steps).into_iter().cloned().collect();
    let mut override_of = None;
    if let Some(step) = updated.iter_mut().find(|step| step.id == command.step_id) {
        override_of = stamp_decision(step, &command.decided_by, command.decided_at);
        step.status = StepStatus::Rejected;
        step.rejection_reason = Some(reason.clone());
    }

    Ok(DecisionOutcome {
        decision: DecisionKind::Rejected,
        decided_step_id: command.step_id.clone(),
        decided_at: command.decided_at,
        updated_steps: updated,
        submission_status: SubmissionStatus::Rejected,
        completed_at: Some(command.decided_at),
        rejection_reason: Some(reason),
        assigned_step_id: None,
        override_of,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType, StepStatus};
    use crate::domain::staff::StaffId;
    use crate::domain::submission::{SubmissionId, SubmissionStatus};
    use crate::workflow::engine::{ApprovalWorkflowEngine, ChainDefect, NotReadyReason, WorkflowError};
    use crate::workflow::states::{ApproveStep, RejectStep, StepDecision};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn step(id: &str, order: i32, approval_type: ApprovalType) -> ApprovalStep {
        ApprovalStep::pending(
            ApprovalStepId(id.to_string()),
            SubmissionId("sub-1".to_string()),
            approval_type,
            order,
            at(0),
        )
    }

    fn with_status(mut step: ApprovalStep, status: StepStatus) -> ApprovalStep {
        step.status = status;
        step
    }

    fn lecturer_then_dean() -> Vec<ApprovalStep> {
        vec![
            step("step-1", 1, ApprovalType::Lecturer).with_assignee(StaffId("lec-1".to_string())),
            step("step-2", 2, ApprovalType::Dean),
        ]
    }

    fn approve(step_id: &str, by: &str, minutes: i64) -> ApproveStep {
        ApproveStep {
            step_id: ApprovalStepId(step_id.to_string()),
            decided_by: StaffId(by.to_string()),
            comments: None,
            next_assignee_id: None,
            decided_at: at(minutes),
        }
    }

    fn reject(step_id: &str, by: &str, reason: &str) -> RejectStep {
        RejectStep {
            step_id: ApprovalStepId(step_id.to_string()),
            decided_by: StaffId(by.to_string()),
            reason: reason.to_string(),
            decided_at: at(5),
        }
    }

    fn ready_ids(steps: &[ApprovalStep]) -> Vec<String> {
        ApprovalWorkflowEngine::new()
            .compute_ready_steps(steps)
            .expect("well-formed chain")
            .into_iter()
            .map(|step| step.id.0.clone())
            .collect()
    }

    #[test]
    fn approving_first_step_assigns_dean_and_surfaces_second_step() {
        let engine = ApprovalWorkflowEngine::new();
        let steps = lecturer_then_dean();
        assert_eq!(ready_ids(&steps), vec!["step-1"]);

        let outcome = engine
            .approve_step(
                &steps,
                &ApproveStep {
                    comments: Some("Looks complete".to_string()),
                    next_assignee_id: Some(StaffId("D1".to_string())),
                    ..approve("step-1", "lec-1", 3)
                },
            )
            .expect("step-1 is ready");

        assert_eq!(
            outcome.updated_steps[1].assigned_approver_id,
            Some(StaffId("D1".to_string()))
        );
        assert_eq!(outcome.assigned_step_id, Some(ApprovalStepId("step-2".to_string())));
        assert_eq!(outcome.updated_steps[0].comments.as_deref(), Some("Looks complete"));
        assert_eq!(outcome.submission_status, SubmissionStatus::Submitted);
        assert_eq!(outcome.completed_at, None);
        assert_eq!(ready_ids(&outcome.updated_steps), vec!["step-2"]);
    }

    #[test]
    fn rejecting_first_step_closes_submission_and_strands_later_steps() {
        let engine = ApprovalWorkflowEngine::new();
        let outcome = engine
            .reject_step(&lecturer_then_dean(), &reject("step-1", "lec-1", "Incomplete transcript"))
            .expect("step-1 is ready");

        assert_eq!(outcome.updated_steps[0].status, StepStatus::Rejected);
        assert_eq!(
            outcome.updated_steps[0].rejection_reason.as_deref(),
            Some("Incomplete transcript")
        );
        assert_eq!(outcome.updated_steps[1].status, StepStatus::Pending);
        assert_eq!(outcome.submission_status, SubmissionStatus::Rejected);
        assert_eq!(outcome.rejection_reason.as_deref(), Some("Incomplete transcript"));
        assert_eq!(outcome.completed_at, Some(at(5)));
        assert!(ready_ids(&outcome.updated_steps).is_empty());
        assert_eq!(
            engine.derive_submission_status(&outcome.updated_steps),
            SubmissionStatus::Rejected
        );
    }

    #[test]
    fn three_step_chain_completes_on_last_approval() {
        let engine = ApprovalWorkflowEngine::new();
        let mut steps = vec![
            step("step-1", 1, ApprovalType::Lecturer),
            step("step-2", 2, ApprovalType::Dean),
            step("step-3", 3, ApprovalType::Registrar),
        ];

        let mut completions = Vec::new();
        for (index, id) in ["step-1", "step-2", "step-3"].into_iter().enumerate() {
            let minutes = (index as i64 + 1) * 10;
            let outcome = engine.approve_step(&steps, &approve(id, "staff-1", minutes)).expect(id);
            completions.push(outcome.completed_at);
            steps = outcome.updated_steps;
        }

        assert_eq!(completions, vec![None, None, Some(at(30))]);
        assert_eq!(engine.derive_submission_status(&steps), SubmissionStatus::Approved);
        assert!(ready_ids(&steps).is_empty());
    }

    #[test]
    fn approving_out_of_order_is_not_ready() {
        let error = ApprovalWorkflowEngine::new()
            .approve_step(&lecturer_then_dean(), &approve("step-2", "dean-1", 1))
            .expect_err("step-1 still pending");

        assert_eq!(
            error,
            WorkflowError::NotReady {
                step_id: ApprovalStepId("step-2".to_string()),
                reason: NotReadyReason::BlockedBy {
                    blocking_step_id: ApprovalStepId("step-1".to_string()),
                    sequence_order: 1,
                },
            }
        );
    }

    #[test]
    fn blank_rejection_reason_is_refused_before_anything_changes() {
        let steps = lecturer_then_dean();
        let error = ApprovalWorkflowEngine::new()
            .reject_step(&steps, &reject("step-1", "lec-1", "  "))
            .expect_err("reason required");

        assert_eq!(
            error,
            WorkflowError::MissingReason { step_id: ApprovalStepId("step-1".to_string()) }
        );
        assert_eq!(steps, lecturer_then_dean());
    }

    #[test]
    fn second_approval_of_same_step_is_not_ready() {
        let engine = ApprovalWorkflowEngine::new();
        let first =
            engine.approve_step(&lecturer_then_dean(), &approve("step-1", "lec-1", 1)).expect("ok");
        let error = engine
            .approve_step(&first.updated_steps, &approve("step-1", "lec-1", 2))
            .expect_err("already approved");

        assert!(matches!(
            error,
            WorkflowError::NotReady {
                reason: NotReadyReason::AlreadyDecided(StepStatus::Approved),
                ..
            }
        ));
    }

    #[test]
    fn unknown_step_is_not_ready() {
        let error = ApprovalWorkflowEngine::new()
            .approve_step(&lecturer_then_dean(), &approve("step-9", "lec-1", 1))
            .expect_err("unknown");

        assert!(matches!(
            error,
            WorkflowError::NotReady { reason: NotReadyReason::UnknownStep, .. }
        ));
    }

    #[test]
    fn duplicate_sequence_orders_are_malformed() {
        let steps = vec![
            step("step-1", 1, ApprovalType::Lecturer),
            step("step-2", 1, ApprovalType::Dean),
        ];

        let error = ApprovalWorkflowEngine::new().compute_ready_steps(&steps).expect_err("dupes");
        assert_eq!(error, WorkflowError::MalformedChain(ChainDefect::DuplicateSequenceOrder(1)));
    }

    #[test]
    fn empty_and_mixed_chains_are_malformed() {
        let engine = ApprovalWorkflowEngine::new();
        assert_eq!(
            engine.compute_ready_steps(&[]).expect_err("empty"),
            WorkflowError::MalformedChain(ChainDefect::Empty)
        );

        let mut foreign = step("step-2", 2, ApprovalType::Dean);
        foreign.submission_id = SubmissionId("sub-2".to_string());
        let mixed = vec![step("step-1", 1, ApprovalType::Lecturer), foreign];
        assert_eq!(
            engine.compute_ready_steps(&mixed).expect_err("mixed"),
            WorkflowError::MalformedChain(ChainDefect::MixedSubmissions)
        );
        assert_eq!(engine.derive_submission_status(&[]), SubmissionStatus::Submitted);
    }

    #[test]
    fn readiness_ignores_input_order_and_gaps() {
        let steps = vec![
            step("step-c", 30, ApprovalType::Registrar),
            with_status(step("step-a", 10, ApprovalType::Lecturer), StepStatus::Approved),
            step("step-b", 20, ApprovalType::Dean),
        ];

        assert_eq!(ready_ids(&steps), vec!["step-b"]);
    }

    #[test]
    fn rejection_anywhere_blocks_every_later_step() {
        let steps = vec![
            with_status(step("step-1", 1, ApprovalType::Lecturer), StepStatus::Approved),
            with_status(step("step-2", 2, ApprovalType::Dean), StepStatus::Rejected),
            step("step-3", 3, ApprovalType::Registrar),
        ];

        assert!(ready_ids(&steps).is_empty());
        assert_eq!(
            ApprovalWorkflowEngine::new().derive_submission_status(&steps),
            SubmissionStatus::Rejected
        );
    }

    #[test]
    fn next_assignee_skips_already_assigned_successors() {
        let steps = vec![
            step("step-1", 1, ApprovalType::Lecturer),
            step("step-2", 2, ApprovalType::Dean).with_assignee(StaffId("dean-0".to_string())),
            step("step-3", 3, ApprovalType::Registrar),
        ];

        let outcome = ApprovalWorkflowEngine::new()
            .approve_step(
                &steps,
                &ApproveStep {
                    next_assignee_id: Some(StaffId("reg-1".to_string())),
                    ..approve("step-1", "lec-1", 1)
                },
            )
            .expect("ok");

        assert_eq!(outcome.updated_steps[1].assigned_approver_id, Some(StaffId("dean-0".into())));
        assert_eq!(outcome.updated_steps[2].assigned_approver_id, Some(StaffId("reg-1".into())));
    }

    #[test]
    fn next_assignee_without_unassigned_successor_is_ignored() {
        let steps = vec![step("step-1", 1, ApprovalType::Registrar)];
        let outcome = ApprovalWorkflowEngine::new()
            .approve_step(
                &steps,
                &ApproveStep {
                    next_assignee_id: Some(StaffId("ar-1".to_string())),
                    ..approve("step-1", "reg-1", 1)
                },
            )
            .expect("ok");

        assert_eq!(outcome.assigned_step_id, None);
        assert_eq!(outcome.submission_status, SubmissionStatus::Approved);
    }

    #[test]
    fn unassigned_step_is_claimed_and_override_is_reported() {
        let engine = ApprovalWorkflowEngine::new();
        let claimed = engine
            .approve_step(&[step("step-1", 1, ApprovalType::Registrar)], &approve("step-1", "reg-1", 1))
            .expect("ok");
        assert_eq!(claimed.updated_steps[0].assigned_approver_id, Some(StaffId("reg-1".into())));
        assert_eq!(claimed.override_of, None);

        let overridden = engine
            .approve_step(&lecturer_then_dean(), &approve("step-1", "admin-1", 1))
            .expect("override allowed");
        assert_eq!(overridden.override_of, Some(StaffId("lec-1".to_string())));
        assert_eq!(overridden.updated_steps[0].decided_by, Some(StaffId("admin-1".to_string())));
        assert_eq!(
            overridden.updated_steps[0].assigned_approver_id,
            Some(StaffId("lec-1".to_string()))
        );
    }

    #[test]
    fn decisions_emit_audit_events() {
        let engine = ApprovalWorkflowEngine::new();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(SubmissionId("sub-1".to_string())), "req-7", "lec-1");

        engine
            .apply_with_audit(
                &lecturer_then_dean(),
                &StepDecision::Approve(ApproveStep {
                    next_assignee_id: Some(StaffId("D1".to_string())),
                    ..approve("step-1", "lec-1", 1)
                }),
                &sink,
                &audit,
            )
            .expect("ok");
        let _ = engine.apply_with_audit(
            &lecturer_then_dean(),
            &StepDecision::Approve(approve("step-2", "dean-1", 1)),
            &sink,
            &audit,
        );

        let types: Vec<_> = sink.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec!["approval.step_approved", "approval.next_assignee_set", "approval.decision_refused"]
        );
        assert!(sink.events().iter().all(|event| event.correlation_id == "req-7"));
        assert_eq!(
            sink.events()[2].metadata.get("decision").map(String::as_str),
            Some("approved")
        );
    }

    #[test]
    fn pending_step_before_a_rejection_is_not_ready() {
        let steps = vec![
            step("step-1", 1, ApprovalType::Lecturer),
            with_status(step("step-2", 2, ApprovalType::Dean), StepStatus::Rejected),
        ];

        assert!(ready_ids(&steps).is_empty());
        let error = ApprovalWorkflowEngine::new()
            .approve_step(&steps, &approve("step-1", "lec-1", 1))
            .expect_err("chain is closed");
        assert_eq!(
            error,
            WorkflowError::NotReady {
                step_id: ApprovalStepId("step-1".to_string()),
                reason: NotReadyReason::SubmissionClosed(SubmissionStatus::Rejected),
            }
        );
    }
}

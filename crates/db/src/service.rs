use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use formchain_core::approvals::{AssignmentFailure, AssignmentValidator};
use formchain_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, TracingAuditSink};
use formchain_core::config::WorkflowConfig;
use formchain_core::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType, StepStatus};
use formchain_core::domain::form_type::{build_chain, FormTypeId};
use formchain_core::domain::staff::{StaffId, StaffMember};
use formchain_core::domain::submission::{
    ApprovalChain, ReferenceNumber, StudentId, Submission, SubmissionId, SubmissionStatus,
};
use formchain_core::errors::{ApplicationError, DomainError};
use formchain_core::workflow::{
    ApprovalWorkflowEngine, ApproveStep, DecisionOutcome, NotReadyReason, RejectStep,
    StepDecision, WorkflowError,
};

use crate::repositories::{FormTypeRepository, RepositoryError, StaffDirectory, SubmissionStore};

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub form_type_id: FormTypeId,
    pub student_id: StudentId,
    pub form_data: serde_json::Value,
    /// Lecturer or dean picked by the student for the first step.
    pub initial_assignee: Option<StaffId>,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct ApproveRequest {
    pub submission_id: SubmissionId,
    pub step_id: ApprovalStepId,
    pub decided_by: StaffId,
    pub comments: Option<String>,
    pub next_assignee_id: Option<StaffId>,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct RejectRequest {
    pub submission_id: SubmissionId,
    pub step_id: ApprovalStepId,
    pub decided_by: StaffId,
    pub reason: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionResult {
    pub chain: ApprovalChain,
    pub outcome: DecisionOutcome,
    /// Number of load-evaluate-save rounds it took, 1 when no conflict occurred.
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueReason {
    Assigned,
    RoleQueue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueItem {
    pub submission_id: SubmissionId,
    pub reference_number: ReferenceNumber,
    pub submitted_at: DateTime<Utc>,
    pub step: ApprovalStep,
    pub reason: QueueReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftResolution {
    Reported,
    Repaired,
    Unrepairable { detail: String },
    Conflict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusDrift {
    pub submission_id: SubmissionId,
    pub reference_number: ReferenceNumber,
    pub stored: SubmissionStatus,
    pub derived: SubmissionStatus,
    pub resolution: DriftResolution,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MalformedChain {
    pub submission_id: SubmissionId,
    pub reference_number: ReferenceNumber,
    pub defect: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub drifted: Vec<StatusDrift>,
    pub malformed: Vec<MalformedChain>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.malformed.is_empty()
    }
}

/// Loads chains, runs the workflow engine over them and persists the outcome.
///
/// Every decision is evaluated against a fresh snapshot. When the store reports
/// a version conflict the snapshot is reloaded and the decision re-evaluated, so
/// a step that another approver decided meanwhile surfaces as `NotReady`.
pub struct ApprovalService<S, D, F, A = TracingAuditSink> {
    store: S,
    directory: D,
    form_types: F,
    audit: A,
    engine: ApprovalWorkflowEngine,
    validator: AssignmentValidator,
    settings: WorkflowConfig,
}

impl<S, D, F> ApprovalService<S, D, F, TracingAuditSink>
where
    S: SubmissionStore,
    D: StaffDirectory,
    F: FormTypeRepository,
{
    pub fn new(store: S, directory: D, form_types: F, settings: WorkflowConfig) -> Self {
        Self::with_audit_sink(store, directory, form_types, TracingAuditSink, settings)
    }
}

impl<S, D, F, A> ApprovalService<S, D, F, A>
where
    S: SubmissionStore,
    D: StaffDirectory,
    F: FormTypeRepository,
    A: AuditSink,
{
    pub fn with_audit_sink(
        store: S,
        directory: D,
        form_types: F,
        audit: A,
        settings: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            directory,
            form_types,
            audit,
            engine: ApprovalWorkflowEngine::new(),
            validator: AssignmentValidator::new(),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<ApprovalChain, ApplicationError> {
        let form_type = self
            .form_types
            .find_by_id(&request.form_type_id)
            .await?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("form type {}", request.form_type_id))
            })?;

        let initial_assignee = match (form_type.first_approval(), request.initial_assignee) {
            (Some(first), Some(staff_id)) if first.is_student_selectable() => {
                let staff = self.directory.find_staff(&staff_id).await?;
                let result = self.validator.validate(&staff_id, staff.as_ref(), first);
                if !result.allowed {
                    return Err(ApplicationError::Ineligible(result.reason));
                }
                Some(staff_id)
            }
            (_, Some(staff_id)) => {
                debug!(
                    event_name = "submission.initial_assignee_ignored",
                    correlation_id = %request.correlation_id,
                    staff_id = %staff_id,
                    "first step is picked up from a role queue"
                );
                None
            }
            (_, None) => None,
        };

        let now = Utc::now();
        let reference_number =
            self.store.next_reference_number(&self.settings.reference_prefix, now.year()).await?;
        let submission_id = SubmissionId(Uuid::new_v4().to_string());
        let steps = build_chain(&form_type, &submission_id, initial_assignee, now)?;
        let submission = Submission::new(
            submission_id.clone(),
            reference_number.clone(),
            request.student_id.clone(),
            form_type.id.clone(),
            request.form_data,
            now,
        );
        let chain = ApprovalChain::new(submission, steps);
        self.store.create_submission(chain.clone()).await?;

        self.audit.emit(
            AuditContext::new(
                Some(submission_id.clone()),
                request.correlation_id.clone(),
                request.student_id.0.clone(),
            )
            .event("submission.created", AuditCategory::Decision, AuditOutcome::Success)
            .with_metadata("reference_number", reference_number.0.clone())
            .with_metadata("form_type_id", form_type.id.0.clone())
            .with_metadata("steps", chain.steps.len().to_string()),
        );
        info!(
            event_name = "submission.created",
            correlation_id = %request.correlation_id,
            submission_id = %submission_id,
            reference_number = %reference_number,
            steps = chain.steps.len(),
            "submission created"
        );

        Ok(chain)
    }

    pub async fn approve(
        &self,
        request: ApproveRequest,
    ) -> Result<DecisionResult, ApplicationError> {
        let decision = StepDecision::Approve(ApproveStep {
            step_id: request.step_id,
            decided_by: request.decided_by,
            comments: request.comments,
            next_assignee_id: request.next_assignee_id,
            decided_at: Utc::now(),
        });
        self.decide(&request.submission_id, decision, &request.correlation_id).await
    }

    pub async fn reject(
        &self,
        request: RejectRequest,
    ) -> Result<DecisionResult, ApplicationError> {
        let decision = StepDecision::Reject(RejectStep {
            step_id: request.step_id,
            decided_by: request.decided_by,
            reason: request.reason,
            decided_at: Utc::now(),
        });
        self.decide(&request.submission_id, decision, &request.correlation_id).await
    }

    async fn decide(
        &self,
        submission_id: &SubmissionId,
        decision: StepDecision,
        correlation_id: &str,
    ) -> Result<DecisionResult, ApplicationError> {
        let audit = AuditContext::new(
            Some(submission_id.clone()),
            correlation_id,
            decision.decided_by().0.clone(),
        );
        let mut attempts = 0;

        loop {
            attempts += 1;
            let snapshot = self.load_chain(submission_id).await?;
            if snapshot.submission.status.is_terminal() {
                return Err(DomainError::from(WorkflowError::NotReady {
                    step_id: decision.step_id().clone(),
                    reason: NotReadyReason::SubmissionClosed(snapshot.submission.status),
                })
                .into());
            }

            let decision = self
                .checked_decision(&snapshot, &decision, correlation_id)
                .await
                .map_err(|error| report_malformed(error, submission_id, correlation_id))?;
            let outcome = self
                .engine
                .apply_with_audit(&snapshot.steps, &decision, &self.audit, &audit)
                .map_err(|error| {
                    let error = ApplicationError::from(DomainError::from(error));
                    report_malformed(error, submission_id, correlation_id)
                })?;

            if let Some(assigned) = &outcome.override_of {
                warn!(
                    event_name = "approval.decision.override",
                    correlation_id = %correlation_id,
                    submission_id = %submission_id,
                    step_id = %outcome.decided_step_id,
                    decided_by = %decision.decided_by(),
                    assigned_approver_id = %assigned,
                    "step decided by someone other than its assigned approver"
                );
            }

            match self.store.save_decision(&snapshot, &outcome).await {
                Ok(chain) => {
                    info!(
                        event_name = "approval.decision.saved",
                        correlation_id = %correlation_id,
                        submission_id = %submission_id,
                        step_id = %outcome.decided_step_id,
                        submission_status = outcome.submission_status.as_str(),
                        attempts,
                        "approval decision saved"
                    );
                    return Ok(DecisionResult { chain, outcome, attempts });
                }
                Err(RepositoryError::Conflict(detail))
                    if attempts <= self.settings.max_conflict_retries =>
                {
                    warn!(
                        event_name = "approval.decision.conflict_retry",
                        correlation_id = %correlation_id,
                        submission_id = %submission_id,
                        attempts,
                        detail = %detail,
                        "concurrent update detected, reloading submission"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Validates `next_assignee_id` when the targeted step is the ready one.
    ///
    /// A pick with no unassigned step left to land on is dropped. Readiness
    /// failures are left for the engine to report.
    async fn checked_decision(
        &self,
        snapshot: &ApprovalChain,
        decision: &StepDecision,
        correlation_id: &str,
    ) -> Result<StepDecision, ApplicationError> {
        let StepDecision::Approve(command) = decision else {
            return Ok(decision.clone());
        };
        let Some(next_assignee_id) = &command.next_assignee_id else {
            return Ok(decision.clone());
        };

        let targets_ready_step = self
            .engine
            .next_ready_step(&snapshot.steps)
            .map_err(DomainError::from)?
            .is_some_and(|step| step.id == command.step_id);
        if !targets_ready_step {
            return Ok(decision.clone());
        }

        let staff = self.directory.find_staff(next_assignee_id).await?;
        let result = self.validator.validate_next_assignee(
            &snapshot.steps,
            &command.step_id,
            next_assignee_id,
            staff.as_ref(),
        );

        match result.failure {
            None => Ok(decision.clone()),
            Some(AssignmentFailure::NoUnassignedSuccessor { .. }) => {
                warn!(
                    event_name = "approval.next_assignee.ignored",
                    correlation_id = %correlation_id,
                    submission_id = %snapshot.submission.id,
                    step_id = %command.step_id,
                    next_assignee_id = %next_assignee_id,
                    "no unassigned later step to receive the next assignee"
                );
                Ok(StepDecision::Approve(ApproveStep {
                    next_assignee_id: None,
                    ..command.clone()
                }))
            }
            Some(_) => Err(ApplicationError::Ineligible(result.reason)),
        }
    }

    /// Ready steps this staff member can act on now.
    ///
    /// Lists steps assigned to them plus unassigned steps whose role they hold.
    /// Malformed chains are skipped and logged.
    pub async fn approver_queue(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<QueueItem>, ApplicationError> {
        let staff = self
            .directory
            .find_staff(staff_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("staff member {staff_id}")))?;

        let mut queue = Vec::new();
        for chain in self.store.list_chains(Some(SubmissionStatus::Submitted)).await? {
            let ready = match self.engine.next_ready_step(&chain.steps) {
                Ok(ready) => ready,
                Err(error) => {
                    warn!(
                        event_name = "approval.queue.malformed_chain",
                        submission_id = %chain.submission.id,
                        error = %error,
                        "skipping malformed approval chain"
                    );
                    continue;
                }
            };
            let Some(step) = ready else {
                continue;
            };

            let reason = if step.is_assigned_to(staff_id) {
                QueueReason::Assigned
            } else if step.assigned_approver_id.is_none() && staff.can_act_as(step.approval_type) {
                QueueReason::RoleQueue
            } else {
                continue;
            };

            queue.push(QueueItem {
                submission_id: chain.submission.id.clone(),
                reference_number: chain.submission.reference_number.clone(),
                submitted_at: chain.submission.submitted_at,
                step: step.clone(),
                reason,
            });
        }

        Ok(queue)
    }

    /// Active staff who may be picked for a step of `approval_type`, optionally within a department.
    pub async fn eligible_approvers(
        &self,
        approval_type: ApprovalType,
        department: Option<&str>,
    ) -> Result<Vec<StaffMember>, ApplicationError> {
        Ok(self.directory.list_eligible(approval_type, department).await?)
    }

    pub async fn history(&self, staff_id: &StaffId) -> Result<Vec<ApprovalStep>, ApplicationError> {
        Ok(self.store.list_decided_by(staff_id).await?)
    }

    /// Compares each stored status with the one derived from its steps.
    pub async fn reconcile(
        &self,
        repair: bool,
        correlation_id: &str,
    ) -> Result<ReconciliationReport, ApplicationError> {
        let audit = AuditContext::new(None, correlation_id, "reconciler");
        let chains = self.store.list_chains(None).await?;
        let mut report = ReconciliationReport { checked: chains.len(), ..Default::default() };

        for chain in chains {
            let submission = &chain.submission;
            if let Err(error) = self.engine.validate_chain(&chain.steps) {
                warn!(
                    event_name = "submission.reconcile.malformed",
                    correlation_id = %correlation_id,
                    submission_id = %submission.id,
                    error = %error,
                    "approval chain is malformed"
                );
                report.malformed.push(MalformedChain {
                    submission_id: submission.id.clone(),
                    reference_number: submission.reference_number.clone(),
                    defect: error.to_string(),
                });
                continue;
            }

            let derived = self.engine.derive_submission_status(&chain.steps);
            if derived == submission.status {
                continue;
            }

            let resolution = if repair {
                self.repair(&chain, derived).await?
            } else {
                DriftResolution::Reported
            };
            warn!(
                event_name = "submission.reconcile.drift",
                correlation_id = %correlation_id,
                submission_id = %submission.id,
                stored = submission.status.as_str(),
                derived = derived.as_str(),
                resolution = ?resolution,
                "stored submission status differs from its steps"
            );
            self.audit.emit(
                AuditContext { submission_id: Some(submission.id.clone()), ..audit.clone() }
                    .event(
                        "submission.reconciled",
                        AuditCategory::Reconciliation,
                        match resolution {
                            DriftResolution::Repaired => AuditOutcome::Success,
                            DriftResolution::Reported => AuditOutcome::Rejected,
                            _ => AuditOutcome::Failed,
                        },
                    )
                    .with_metadata("stored", submission.status.as_str())
                    .with_metadata("derived", derived.as_str()),
            );

            report.drifted.push(StatusDrift {
                submission_id: submission.id.clone(),
                reference_number: submission.reference_number.clone(),
                stored: submission.status,
                derived,
                resolution,
            });
        }

        Ok(report)
    }

    async fn repair(
        &self,
        chain: &ApprovalChain,
        derived: SubmissionStatus,
    ) -> Result<DriftResolution, ApplicationError> {
        let settled_at = chain.steps.iter().filter_map(|step| step.decided_at).max();
        let rejection_reason = chain
            .steps
            .iter()
            .find(|step| step.status == StepStatus::Rejected)
            .and_then(|step| step.rejection_reason.clone());

        let mut repaired = chain.submission.clone();
        if let Err(error) =
            repaired.settle(derived, settled_at.unwrap_or_else(Utc::now), rejection_reason)
        {
            return Ok(DriftResolution::Unrepairable { detail: error.to_string() });
        }

        match self.store.save_reconciled_status(&repaired).await {
            Ok(_) => Ok(DriftResolution::Repaired),
            Err(RepositoryError::Conflict(_)) => Ok(DriftResolution::Conflict),
            Err(error) => Err(error.into()),
        }
    }

    async fn load_chain(&self, id: &SubmissionId) -> Result<ApprovalChain, ApplicationError> {
        self.store
            .load_chain(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("submission {id}")))
    }
}

/// Logs a malformed chain met while deciding; the request still fails with it.
fn report_malformed(
    error: ApplicationError,
    submission_id: &SubmissionId,
    correlation_id: &str,
) -> ApplicationError {
    if let ApplicationError::Domain(DomainError::Workflow(WorkflowError::MalformedChain(defect))) =
        &error
    {
        error!(
            event_name = "approval.decision.malformed_chain",
            correlation_id = %correlation_id,
            submission_id = %submission_id,
            defect = %defect,
            "approval chain is malformed, decision refused"
        );
    }
    error
}

pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use approvals::{
    assignment_target, AssignmentFailure, AssignmentValidationResult, AssignmentValidator,
};
pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType, StepStatus};
pub use domain::form_type::{build_chain, FormType, FormTypeId};
pub use domain::staff::{StaffId, StaffMember};
pub use domain::submission::{
    ApprovalChain, ReferenceNumber, StudentId, Submission, SubmissionId, SubmissionStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{
    ApprovalWorkflowEngine, ApproveStep, ChainDefect, DecisionKind, DecisionOutcome,
    NotReadyReason, RejectStep, StepDecision, WorkflowError,
};

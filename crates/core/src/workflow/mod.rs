pub mod engine;
pub mod states;

pub use engine::{ApprovalWorkflowEngine, ChainDefect, NotReadyReason, WorkflowError};
pub use states::{ApproveStep, DecisionKind, DecisionOutcome, RejectStep, StepDecision};

#[cfg(test)]
mod properties;

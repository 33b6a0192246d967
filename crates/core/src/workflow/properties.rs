//! Property tests for the readiness rules over arbitrary step snapshots.
//!
//! Chains are generated with random statuses and sequence orders, so they
//! include duplicate orders, gaps and states no real submission reaches.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::domain::approval::{ApprovalStep, ApprovalStepId, ApprovalType, StepStatus};
use crate::domain::staff::StaffId;
use crate::domain::submission::{SubmissionId, SubmissionStatus};
use crate::workflow::engine::{ApprovalWorkflowEngine, ChainDefect, NotReadyReason, WorkflowError};
use crate::workflow::states::{ApproveStep, RejectStep};

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn arb_status() -> impl Strategy<Value = StepStatus> {
    prop::sample::select(vec![StepStatus::Pending, StepStatus::Approved, StepStatus::Rejected])
}

fn arb_approval_type() -> impl Strategy<Value = ApprovalType> {
    prop::sample::select(ApprovalType::CANONICAL_ORDER.to_vec())
}

fn build_chain(specs: Vec<(i32, StepStatus, ApprovalType)>) -> Vec<ApprovalStep> {
    specs
        .into_iter()
        .enumerate()
        .map(|(index, (order, status, approval_type))| {
            let mut step = ApprovalStep::pending(
                ApprovalStepId(format!("step-{index}")),
                SubmissionId("sub-1".to_string()),
                approval_type,
                order,
                created_at(),
            );
            step.status = status;
            step
        })
        .collect()
}

/// Between one and seven steps; orders drawn from a small range so duplicates show up.
fn arb_chain() -> impl Strategy<Value = Vec<ApprovalStep>> {
    prop::collection::vec((0..10i32, arb_status(), arb_approval_type()), 1..8).prop_map(build_chain)
}

/// Distinct, gapped orders, listed in shuffled input order.
fn arb_well_formed_chain() -> impl Strategy<Value = Vec<ApprovalStep>> {
    prop::collection::vec((1..4i32, arb_status(), arb_approval_type()), 1..8)
        .prop_map(|specs| {
            let mut order = 0;
            let specs = specs
                .into_iter()
                .map(|(gap, status, approval_type)| {
                    order += gap;
                    (order, status, approval_type)
                })
                .collect();
            build_chain(specs)
        })
        .prop_shuffle()
}

fn arb_reason() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), Just("   ".to_string()), "[a-z]{1,12}"]
}

fn has_duplicate_orders(steps: &[ApprovalStep]) -> bool {
    let mut seen = BTreeSet::new();
    !steps.iter().all(|step| seen.insert(step.sequence_order))
}

fn is_ready_by_definition(steps: &[ApprovalStep], candidate: &ApprovalStep) -> bool {
    candidate.status == StepStatus::Pending
        && steps.iter().all(|step| step.status != StepStatus::Rejected)
        && steps
            .iter()
            .filter(|step| step.sequence_order < candidate.sequence_order)
            .all(|step| step.status == StepStatus::Approved)
}

fn approve(step: &ApprovalStep) -> ApproveStep {
    ApproveStep {
        step_id: step.id.clone(),
        decided_by: StaffId("staff-1".to_string()),
        comments: None,
        next_assignee_id: None,
        decided_at: created_at(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn duplicate_orders_are_reported_never_resolved(steps in arb_chain()) {
        let engine = ApprovalWorkflowEngine::new();
        let result = engine.compute_ready_steps(&steps);

        if has_duplicate_orders(&steps) {
            prop_assert!(matches!(
                result,
                Err(WorkflowError::MalformedChain(ChainDefect::DuplicateSequenceOrder(_)))
            ));
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn ready_set_matches_the_readiness_rule(steps in arb_well_formed_chain()) {
        let engine = ApprovalWorkflowEngine::new();
        let ready = engine.compute_ready_steps(&steps).expect("well-formed chain");

        prop_assert!(ready.len() <= 1);
        for step in &steps {
            let listed = ready.iter().any(|candidate| candidate.id == step.id);
            prop_assert_eq!(listed, is_ready_by_definition(&steps, step), "step {}", step.id);
        }
    }

    #[test]
    fn derived_status_agrees_with_ready_set(steps in arb_well_formed_chain()) {
        let engine = ApprovalWorkflowEngine::new();
        let ready = engine.compute_ready_steps(&steps).expect("well-formed chain");
        let derived = engine.derive_submission_status(&steps);

        if steps.iter().any(|step| step.status == StepStatus::Rejected) {
            prop_assert_eq!(derived, SubmissionStatus::Rejected);
            prop_assert!(ready.is_empty());
        } else if steps.iter().all(|step| step.status == StepStatus::Approved) {
            prop_assert_eq!(derived, SubmissionStatus::Approved);
            prop_assert!(ready.is_empty());
        } else {
            prop_assert_eq!(derived, SubmissionStatus::Submitted);
            prop_assert_eq!(ready.len(), 1);
        }
    }

    #[test]
    fn approval_succeeds_exactly_on_the_ready_step(
        steps in arb_chain(),
        target in any::<prop::sample::Index>(),
    ) {
        let engine = ApprovalWorkflowEngine::new();
        let step = target.get(&steps);
        let before = steps.clone();

        match engine.approve_step(&steps, &approve(step)) {
            Ok(outcome) => {
                prop_assert!(!has_duplicate_orders(&steps));
                prop_assert!(is_ready_by_definition(&steps, step));
                for updated in &outcome.updated_steps {
                    let original = steps
                        .iter()
                        .find(|candidate| candidate.id == updated.id)
                        .expect("same step ids");
                    if updated.id == step.id {
                        prop_assert_eq!(updated.status, StepStatus::Approved);
                    } else {
                        prop_assert_eq!(updated, original);
                    }
                }
                prop_assert_eq!(
                    outcome.submission_status,
                    engine.derive_submission_status(&outcome.updated_steps)
                );

                let again = engine
                    .approve_step(&outcome.updated_steps, &approve(step))
                    .expect_err("already decided");
                let already_decided = matches!(
                    again,
                    WorkflowError::NotReady {
                        reason: NotReadyReason::AlreadyDecided(StepStatus::Approved),
                        ..
                    }
                );
                prop_assert!(already_decided);
            }
            Err(_) => {
                prop_assert!(has_duplicate_orders(&steps) || !is_ready_by_definition(&steps, step));
            }
        }
        prop_assert_eq!(steps, before);
    }

    #[test]
    fn rejection_is_all_or_nothing(
        steps in arb_chain(),
        target in any::<prop::sample::Index>(),
        reason in arb_reason(),
    ) {
        let engine = ApprovalWorkflowEngine::new();
        let step = target.get(&steps);
        let command = RejectStep {
            step_id: step.id.clone(),
            decided_by: StaffId("staff-1".to_string()),
            reason: reason.clone(),
            decided_at: created_at(),
        };

        match engine.reject_step(&steps, &command) {
            Ok(outcome) => {
                prop_assert!(!reason.trim().is_empty());
                prop_assert!(is_ready_by_definition(&steps, step));
                prop_assert_eq!(outcome.submission_status, SubmissionStatus::Rejected);
                prop_assert_eq!(outcome.rejection_reason.as_deref(), Some(reason.trim()));
                let changed: Vec<_> = outcome
                    .updated_steps
                    .iter()
                    .filter(|updated| steps.iter().all(|original| original != *updated))
                    .map(|updated| updated.id.clone())
                    .collect();
                prop_assert_eq!(changed, vec![step.id.clone()]);
                prop_assert!(engine
                    .compute_ready_steps(&outcome.updated_steps)
                    .expect("still well-formed")
                    .is_empty());
            }
            Err(WorkflowError::MissingReason { .. }) => {
                prop_assert!(reason.trim().is_empty());
            }
            Err(_) => {
                prop_assert!(has_duplicate_orders(&steps) || !is_ready_by_definition(&steps, step));
            }
        }
    }
}

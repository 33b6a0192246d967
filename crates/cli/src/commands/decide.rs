use formchain_core::domain::approval::ApprovalStepId;
use formchain_core::domain::staff::StaffId;
use formchain_core::domain::submission::SubmissionId;
use formchain_db::{ApproveRequest, DecisionResult, RejectRequest};

use crate::commands::{
    application_failure, connect, correlation_id, prepare, sql_service, CommandResult, Failure,
};

#[derive(Debug, Clone)]
pub struct ApproveInput {
    pub submission: String,
    pub step: String,
    pub by: String,
    pub comments: Option<String>,
    pub next_assignee: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RejectInput {
    pub submission: String,
    pub step: String,
    pub by: String,
    pub reason: String,
}

pub fn approve(input: ApproveInput) -> CommandResult {
    let (config, runtime) = match prepare("approve") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("approve");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let decided = sql_service(&pool, &config)
            .approve(ApproveRequest {
                submission_id: SubmissionId(input.submission.clone()),
                step_id: ApprovalStepId(input.step.clone()),
                decided_by: StaffId(input.by.clone()),
                comments: input.comments.clone(),
                next_assignee_id: input.next_assignee.clone().map(StaffId),
                correlation_id: correlation_id.clone(),
            })
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        decided
    });

    finish("approve", result)
}

pub fn reject(input: RejectInput) -> CommandResult {
    let (config, runtime) = match prepare("reject") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("reject");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let decided = sql_service(&pool, &config)
            .reject(RejectRequest {
                submission_id: SubmissionId(input.submission.clone()),
                step_id: ApprovalStepId(input.step.clone()),
                decided_by: StaffId(input.by.clone()),
                reason: input.reason.clone(),
                correlation_id: correlation_id.clone(),
            })
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        decided
    });

    finish("reject", result)
}

fn finish(command: &str, result: Result<DecisionResult, Failure>) -> CommandResult {
    match result {
        Ok(decided) => {
            let submission = &decided.chain.submission;
            CommandResult::success_with_data(
                command,
                format!(
                    "step {} {}; {} is {}",
                    decided.outcome.decided_step_id,
                    decided.outcome.decision.as_str(),
                    submission.reference_number,
                    submission.status.as_str()
                ),
                &decided,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

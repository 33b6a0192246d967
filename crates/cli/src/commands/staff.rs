use formchain_core::domain::approval::ApprovalType;

use crate::commands::{
    application_failure, connect, correlation_id, prepare, sql_service, CommandResult,
};

/// Staff a student could pick for a step of `role`, narrowed to `department` when given.
pub fn run(role: &str, department: Option<&str>) -> CommandResult {
    let Some(approval_type) = ApprovalType::parse(role) else {
        return CommandResult::failure(
            "staff",
            "invalid_input",
            format!("unknown approval role `{role}`"),
            7,
        );
    };

    let (config, runtime) = match prepare("staff") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("staff");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let listed = sql_service(&pool, &config)
            .eligible_approvers(approval_type, department)
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        listed
    });

    match result {
        Ok(staff) => CommandResult::success_with_data(
            "staff",
            format!("{} staff member(s) can act as {}", staff.len(), approval_type.as_str()),
            &staff,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("staff", error_class, message, exit_code)
        }
    }
}

use formchain_core::domain::staff::StaffId;

use crate::commands::{
    application_failure, connect, correlation_id, prepare, sql_service, CommandResult,
};

/// Ready steps `staff_id` can decide now: their own assignments plus unclaimed role-queue work.
pub fn run(staff_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("queue") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("queue");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let queue = sql_service(&pool, &config)
            .approver_queue(&StaffId(staff_id.to_string()))
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        queue
    });

    match result {
        Ok(items) => CommandResult::success_with_data(
            "queue",
            format!("{} step(s) ready for `{staff_id}`", items.len()),
            &items,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("queue", error_class, message, exit_code)
        }
    }
}

pub fn history(staff_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("history") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("history");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let decided = sql_service(&pool, &config)
            .history(&StaffId(staff_id.to_string()))
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        decided
    });

    match result {
        Ok(steps) => CommandResult::success_with_data(
            "history",
            format!("`{staff_id}` decided {} step(s)", steps.len()),
            &steps,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("history", error_class, message, exit_code)
        }
    }
}

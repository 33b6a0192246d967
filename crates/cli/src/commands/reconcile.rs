use formchain_db::ReconciliationReport;

use crate::commands::{
    application_failure, connect, correlation_id, prepare, sql_service, CommandResult,
};

pub fn run(repair: bool) -> CommandResult {
    let (config, runtime) = match prepare("reconcile") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("reconcile");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let report = sql_service(&pool, &config)
            .reconcile(repair, &correlation_id)
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        report
    });

    match result {
        Ok(report) => CommandResult::success_with_data("reconcile", summary(&report), &report),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reconcile", error_class, message, exit_code)
        }
    }
}

fn summary(report: &ReconciliationReport) -> String {
    if report.is_clean() {
        return format!("checked {} submission(s); no drift", report.checked);
    }
    format!(
        "checked {} submission(s); {} drifted, {} malformed",
        report.checked,
        report.drifted.len(),
        report.malformed.len()
    )
}

use formchain_core::domain::form_type::FormTypeId;
use formchain_core::domain::staff::StaffId;
use formchain_core::domain::submission::StudentId;
use formchain_db::SubmitRequest;
use serde_json::Value;

use crate::commands::{
    application_failure, connect, correlation_id, prepare, sql_service, CommandResult,
};

#[derive(Debug, Clone)]
pub struct SubmitInput {
    pub form_type: String,
    pub student: String,
    pub assignee: Option<String>,
    /// Raw JSON object with the form answers.
    pub data: String,
}

pub fn run(input: SubmitInput) -> CommandResult {
    let form_data = match parse_form_data(&input.data) {
        Ok(form_data) => form_data,
        Err(message) => return CommandResult::failure("submit", "invalid_input", message, 7),
    };

    let (config, runtime) = match prepare("submit") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let correlation_id = correlation_id("submit");

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let created = sql_service(&pool, &config)
            .submit(SubmitRequest {
                form_type_id: FormTypeId(input.form_type.clone()),
                student_id: StudentId(input.student.clone()),
                form_data,
                initial_assignee: input.assignee.clone().map(StaffId),
                correlation_id: correlation_id.clone(),
            })
            .await
            .map_err(|error| application_failure(error, &correlation_id));
        pool.close().await;
        created
    });

    match result {
        Ok(chain) => CommandResult::success_with_data(
            "submit",
            format!(
                "created {} with {} approval step(s)",
                chain.submission.reference_number,
                chain.steps.len()
            ),
            &chain,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("submit", error_class, message, exit_code)
        }
    }
}

fn parse_form_data(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("--data must be a JSON object".to_string()),
        Err(error) => Err(format!("--data is not valid JSON: {error}")),
    }
}

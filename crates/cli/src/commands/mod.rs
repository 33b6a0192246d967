pub mod config;
pub mod decide;
pub mod doctor;
pub mod migrate;
pub mod queue;
pub mod reconcile;
pub mod seed;
pub mod staff;
pub mod submit;

use formchain_core::config::{AppConfig, LoadOptions};
use formchain_core::errors::{ApplicationError, InterfaceError};
use formchain_db::repositories::{SqlFormTypeRepository, SqlStaffDirectory, SqlSubmissionStore};
use formchain_db::{connect_with_config, ApprovalService, DbPool};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    /// Success payload carrying a structured `data` field next to the message.
    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::ok(command, message.into(), Some(data)),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

/// Error class, message and exit code of a failed command.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) type SqlApprovalService =
    ApprovalService<SqlSubmissionStore, SqlStaffDirectory, SqlFormTypeRepository>;

/// Loads configuration and builds the single-threaded runtime every command runs on.
pub(crate) fn prepare(command: &str) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok((config, runtime))
}

pub(crate) async fn connect(config: &AppConfig) -> Result<DbPool, Failure> {
    connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4))
}

pub(crate) fn sql_service(pool: &DbPool, config: &AppConfig) -> SqlApprovalService {
    ApprovalService::new(
        SqlSubmissionStore::new(pool.clone()),
        SqlStaffDirectory::new(pool.clone()),
        SqlFormTypeRepository::new(pool.clone()),
        config.workflow.clone(),
    )
}

pub(crate) fn correlation_id(command: &str) -> String {
    format!("cli-{command}-{}", Uuid::new_v4())
}

/// Maps a service error onto the same classes the interface layer reports.
pub(crate) fn application_failure(error: ApplicationError, correlation_id: &str) -> Failure {
    let interface = error.into_interface(correlation_id);
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("bad_request", 7),
        InterfaceError::Conflict { .. } => ("conflict", 8),
        InterfaceError::NotFound { .. } => ("not_found", 9),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 10),
        InterfaceError::Internal { .. } => ("internal", 11),
    };
    (error_class, format!("{interface} (correlation_id: {correlation_id})"), exit_code)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use formchain_core::errors::{ApplicationError, DomainError};
    use formchain_core::workflow::{ChainDefect, WorkflowError};

    use super::{application_failure, CommandResult};

    #[test]
    fn failure_payload_carries_error_class() {
        let result = CommandResult::failure("approve", "not_found", "submission sub-9", 9);
        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn application_errors_map_to_stable_exit_codes() {
        let (class, message, code) =
            application_failure(ApplicationError::Conflict("submission sub-1".into()), "cli-1");
        assert_eq!((class, code), ("conflict", 8));
        assert!(message.contains("cli-1"));

        let (class, _, code) =
            application_failure(ApplicationError::Ineligible("role mismatch".into()), "cli-2");
        assert_eq!((class, code), ("bad_request", 7));

        let malformed = DomainError::from(WorkflowError::MalformedChain(
            ChainDefect::DuplicateSequenceOrder(2),
        ));
        let (class, _, code) = application_failure(malformed.into(), "cli-3");
        assert_eq!((class, code), ("internal", 11));
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use thiserror::Error;

use formchain_core::domain::approval::{ApprovalStep, ApprovalType};
use formchain_core::domain::form_type::{FormType, FormTypeId};
use formchain_core::domain::staff::{StaffId, StaffMember};
use formchain_core::domain::submission::{
    ApprovalChain, ReferenceNumber, Submission, SubmissionId, SubmissionStatus,
};
use formchain_core::errors::{ApplicationError, DomainError};
use formchain_core::workflow::DecisionOutcome;

pub mod form_type;
pub mod memory;
pub mod staff;
pub mod submission;

pub use form_type::SqlFormTypeRepository;
pub use memory::{InMemoryFormTypeRepository, InMemoryStaffDirectory, InMemorySubmissionStore};
pub use staff::SqlStaffDirectory;
pub use submission::SqlSubmissionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("optimistic concurrency conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound(message) => Self::NotFound(message),
            RepositoryError::Domain(error) => Self::Domain(error),
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => Self::Persistence(message),
        }
    }
}

/// Persistence for submissions and their approval steps.
///
/// Writes that follow a decision are guarded by the `version` columns: a write
/// only lands when the stored versions still match the snapshot the decision
/// was computed from, otherwise [`RepositoryError::Conflict`] is returned and
/// nothing is written.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Allocates the next reference number for `prefix` in `year`. Never reuses a value.
    async fn next_reference_number(
        &self,
        prefix: &str,
        year: i32,
    ) -> Result<ReferenceNumber, RepositoryError>;

    async fn create_submission(&self, chain: ApprovalChain) -> Result<(), RepositoryError>;

    async fn load_chain(&self, id: &SubmissionId)
        -> Result<Option<ApprovalChain>, RepositoryError>;

    /// Persists a decision computed from `snapshot` in one transaction and
    /// returns the chain as stored afterwards.
    async fn save_decision(
        &self,
        snapshot: &ApprovalChain,
        outcome: &DecisionOutcome,
    ) -> Result<ApprovalChain, RepositoryError>;

    async fn list_chains(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<ApprovalChain>, RepositoryError>;

    /// Steps decided by `staff_id`, newest decision first.
    async fn list_decided_by(&self, staff_id: &StaffId)
        -> Result<Vec<ApprovalStep>, RepositoryError>;

    /// Writes a repaired submission status. `repaired.version` is the version it was read at.
    async fn save_reconciled_status(
        &self,
        repaired: &Submission,
    ) -> Result<Submission, RepositoryError>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn find_staff(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError>;

    /// Active staff whose role title matches `approval_type`.
    async fn is_eligible(
        &self,
        id: &StaffId,
        approval_type: ApprovalType,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .find_staff(id)
            .await?
            .map(|staff| staff.can_act_as(approval_type))
            .unwrap_or(false))
    }

    async fn list_eligible(
        &self,
        approval_type: ApprovalType,
        department: Option<&str>,
    ) -> Result<Vec<StaffMember>, RepositoryError>;

    async fn save_staff(&self, staff: StaffMember) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FormTypeRepository: Send + Sync {
    async fn find_by_id(&self, id: &FormTypeId) -> Result<Option<FormType>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<FormType>, RepositoryError>;
    async fn save(&self, form_type: FormType) -> Result<(), RepositoryError>;
}

/// Applies a decision to a snapshot the way every store persists it: terminal
/// fields are settled once and each written row's version moves forward by one.
pub(crate) fn chain_after_decision(
    snapshot: &ApprovalChain,
    outcome: &DecisionOutcome,
) -> Result<ApprovalChain, RepositoryError> {
    let mut chain = snapshot.clone();
    outcome.apply_to(&mut chain)?;
    chain.submission.version += 1;

    let touched: Vec<_> = outcome.touched_steps().map(|step| step.id.clone()).collect();
    for step in chain.steps.iter_mut().filter(|step| touched.contains(&step.id)) {
        step.version += 1;
    }
    Ok(chain)
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn parse_optional_timestamp(
    field: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(field, &value)).transpose()
}

pub(crate) fn decode_version(field: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{field}: version {value} out of range")))
}

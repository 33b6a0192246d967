pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult, VerificationResult};
pub use service::{
    ApprovalService, ApproveRequest, DecisionResult, DriftResolution, QueueItem, QueueReason,
    ReconciliationReport, RejectRequest, StatusDrift, SubmitRequest,
};

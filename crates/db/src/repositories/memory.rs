use std::collections::HashMap;

use tokio::sync::RwLock;

use formchain_core::domain::approval::{ApprovalStep, ApprovalType, StepStatus};
use formchain_core::domain::form_type::{FormType, FormTypeId};
use formchain_core::domain::staff::{StaffId, StaffMember};
use formchain_core::domain::submission::{
    ApprovalChain, ReferenceNumber, Submission, SubmissionId, SubmissionStatus,
};
use formchain_core::workflow::DecisionOutcome;

use super::{
    chain_after_decision, FormTypeRepository, RepositoryError, StaffDirectory, SubmissionStore,
};

#[derive(Default)]
pub struct InMemorySubmissionStore {
    chains: RwLock<HashMap<String, ApprovalChain>>,
    sequences: RwLock<HashMap<(String, i32), u32>>,
}

fn conflict(submission_id: &SubmissionId, version: u32) -> RepositoryError {
    RepositoryError::Conflict(format!("submission {submission_id} changed since version {version}"))
}

#[async_trait::async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn next_reference_number(
        &self,
        prefix: &str,
        year: i32,
    ) -> Result<ReferenceNumber, RepositoryError> {
        let prefix = prefix.trim().to_ascii_uppercase();
        let mut sequences = self.sequences.write().await;
        let next = sequences.entry((prefix.clone(), year)).or_insert(0);
        *next += 1;
        Ok(ReferenceNumber::compose(&prefix, year, *next))
    }

    async fn create_submission(&self, chain: ApprovalChain) -> Result<(), RepositoryError> {
        let mut chains = self.chains.write().await;
        let duplicate_reference = chains.values().any(|existing| {
            existing.submission.reference_number == chain.submission.reference_number
        });
        if chains.contains_key(&chain.submission.id.0) || duplicate_reference {
            return Err(RepositoryError::Conflict(format!(
                "submission {} or reference {} already exists",
                chain.submission.id, chain.submission.reference_number
            )));
        }
        chains.insert(chain.submission.id.0.clone(), chain);
        Ok(())
    }

    async fn load_chain(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<ApprovalChain>, RepositoryError> {
        let chains = self.chains.read().await;
        Ok(chains.get(&id.0).cloned())
    }

    async fn save_decision(
        &self,
        snapshot: &ApprovalChain,
        outcome: &DecisionOutcome,
    ) -> Result<ApprovalChain, RepositoryError> {
        let mut chains = self.chains.write().await;
        let stored = chains.get(&snapshot.submission.id.0).ok_or_else(|| {
            RepositoryError::NotFound(format!("submission {}", snapshot.submission.id))
        })?;

        if stored.submission.version != snapshot.submission.version {
            return Err(conflict(&snapshot.submission.id, snapshot.submission.version));
        }
        for step in outcome.touched_steps() {
            let stored_version = stored.step(&step.id).map(|stored| stored.version);
            if stored_version != Some(step.version) {
                return Err(RepositoryError::Conflict(format!(
                    "approval step {} changed since version {}",
                    step.id, step.version
                )));
            }
        }

        let updated = chain_after_decision(snapshot, outcome)?;
        chains.insert(updated.submission.id.0.clone(), updated.clone());
        Ok(updated)
    }

    async fn list_chains(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<ApprovalChain>, RepositoryError> {
        let chains = self.chains.read().await;
        let mut listed: Vec<ApprovalChain> = chains
            .values()
            .filter(|chain| status.map(|status| chain.submission.status == status).unwrap_or(true))
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.submission
                .submitted_at
                .cmp(&right.submission.submitted_at)
                .then_with(|| left.submission.id.cmp(&right.submission.id))
        });
        Ok(listed)
    }

    async fn list_decided_by(
        &self,
        staff_id: &StaffId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let chains = self.chains.read().await;
        let mut decided: Vec<ApprovalStep> = chains
            .values()
            .flat_map(|chain| chain.steps.iter())
            .filter(|step| {
                step.status != StepStatus::Pending && step.decided_by.as_ref() == Some(staff_id)
            })
            .cloned()
            .collect();
        decided.sort_by(|left, right| {
            right.decided_at.cmp(&left.decided_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(decided)
    }

    async fn save_reconciled_status(
        &self,
        repaired: &Submission,
    ) -> Result<Submission, RepositoryError> {
        let mut chains = self.chains.write().await;
        let chain = chains
            .get_mut(&repaired.id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("submission {}", repaired.id)))?;

        if chain.submission.version != repaired.version {
            return Err(conflict(&repaired.id, repaired.version));
        }

        let mut stored = repaired.clone();
        stored.version += 1;
        chain.submission = stored.clone();
        Ok(stored)
    }
}

#[derive(Default)]
pub struct InMemoryStaffDirectory {
    staff: RwLock<HashMap<String, StaffMember>>,
}

impl InMemoryStaffDirectory {
    pub fn with_staff(staff: Vec<StaffMember>) -> Self {
        Self {
            staff: RwLock::new(
                staff.into_iter().map(|member| (member.id.0.clone(), member)).collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl StaffDirectory for InMemoryStaffDirectory {
    async fn find_staff(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError> {
        let staff = self.staff.read().await;
        Ok(staff.get(&id.0).cloned())
    }

    async fn list_eligible(
        &self,
        approval_type: ApprovalType,
        department: Option<&str>,
    ) -> Result<Vec<StaffMember>, RepositoryError> {
        let staff = self.staff.read().await;
        let mut eligible: Vec<StaffMember> = staff
            .values()
            .filter(|member| member.can_act_as(approval_type))
            .filter(|member| department.map(|dept| member.in_department(dept)).unwrap_or(true))
            .cloned()
            .collect();
        eligible.sort_by(|left, right| {
            (&left.last_name, &left.first_name, &left.id).cmp(&(
                &right.last_name,
                &right.first_name,
                &right.id,
            ))
        });
        Ok(eligible)
    }

    async fn save_staff(&self, member: StaffMember) -> Result<(), RepositoryError> {
        let mut staff = self.staff.write().await;
        staff.insert(member.id.0.clone(), member);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFormTypeRepository {
    form_types: RwLock<HashMap<String, FormType>>,
}

#[async_trait::async_trait]
impl FormTypeRepository for InMemoryFormTypeRepository {
    async fn find_by_id(&self, id: &FormTypeId) -> Result<Option<FormType>, RepositoryError> {
        let form_types = self.form_types.read().await;
        Ok(form_types.get(&id.0).cloned())
    }

    async fn list_active(&self) -> Result<Vec<FormType>, RepositoryError> {
        let form_types = self.form_types.read().await;
        let mut active: Vec<FormType> =
            form_types.values().filter(|form_type| form_type.is_active).cloned().collect();
        active.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(active)
    }

    async fn save(&self, form_type: FormType) -> Result<(), RepositoryError> {
        let mut form_types = self.form_types.write().await;
        form_types.insert(form_type.id.0.clone(), form_type);
        Ok(())
    }
}

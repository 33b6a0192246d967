use serde::Serialize;

use formchain_core::domain::approval::ApprovalType;
use formchain_core::domain::form_type::{FormType, FormTypeId};
use formchain_core::domain::staff::{StaffId, StaffMember};

use crate::connection::DbPool;
use crate::repositories::{
    FormTypeRepository, RepositoryError, SqlFormTypeRepository, SqlStaffDirectory, StaffDirectory,
};

/// Form types the portal ships with, one per approval shape.
const SEED_FORM_TYPES: &[SeedFormType] = &[
    SeedFormType {
        id: "course-change",
        name: "Course Change Request",
        approvals: &[ApprovalType::Lecturer, ApprovalType::Dean],
    },
    SeedFormType {
        id: "leave-of-absence",
        name: "Leave of Absence",
        approvals: &[ApprovalType::Lecturer, ApprovalType::Dean, ApprovalType::Registrar],
    },
    SeedFormType {
        id: "transcript-request",
        name: "Transcript Request",
        approvals: &[ApprovalType::Registrar, ApprovalType::AccountsReceivable],
    },
    SeedFormType {
        id: "graduation-clearance",
        name: "Graduation Clearance",
        approvals: &[
            ApprovalType::Lecturer,
            ApprovalType::Dean,
            ApprovalType::Registrar,
            ApprovalType::AccountsReceivable,
        ],
    },
];

const SEED_STAFF: &[SeedStaff] = &[
    SeedStaff {
        id: "staff-lecturer-001",
        first_name: "Ama",
        last_name: "Mensah",
        role: "Senior Lecturer",
        department: Some("Computer Science"),
    },
    SeedStaff {
        id: "staff-lecturer-002",
        first_name: "Daniel",
        last_name: "Okafor",
        role: "Lecturer",
        department: Some("Mathematics"),
    },
    SeedStaff {
        id: "staff-dean-001",
        first_name: "Grace",
        last_name: "Boateng",
        role: "Dean",
        department: Some("Computer Science"),
    },
    SeedStaff {
        id: "staff-dean-002",
        first_name: "Samuel",
        last_name: "Adjei",
        role: "Associate Dean",
        department: Some("Mathematics"),
    },
    SeedStaff {
        id: "staff-registrar-001",
        first_name: "Efua",
        last_name: "Owusu",
        role: "Registrar",
        department: None,
    },
    SeedStaff {
        id: "staff-ar-001",
        first_name: "Kofi",
        last_name: "Asante",
        role: "Accounts Receivable",
        department: None,
    },
];

/// Reference data for local runs: form types and the staff who approve them.
///
/// Loading is an upsert, so running it twice leaves the same rows behind.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let form_types = SqlFormTypeRepository::new(pool.clone());
        for seed in SEED_FORM_TYPES {
            form_types.save(seed.form_type()).await?;
        }

        let directory = SqlStaffDirectory::new(pool.clone());
        for seed in SEED_STAFF {
            directory.save_staff(seed.member()).await?;
        }

        Ok(SeedResult {
            form_types: SEED_FORM_TYPES.iter().map(|seed| seed.id).collect(),
            staff: SEED_STAFF.iter().map(|seed| seed.id).collect(),
        })
    }

    /// Checks every seeded row is present and still matches the dataset.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let form_types = SqlFormTypeRepository::new(pool.clone());
        for seed in SEED_FORM_TYPES {
            let stored = form_types.find_by_id(&FormTypeId(seed.id.to_string())).await?;
            checks.push((seed.id, stored == Some(seed.form_type())));
        }

        let directory = SqlStaffDirectory::new(pool.clone());
        for seed in SEED_STAFF {
            let stored = directory.find_staff(&StaffId(seed.id.to_string())).await?;
            checks.push((seed.id, stored == Some(seed.member())));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedFormType {
    id: &'static str,
    name: &'static str,
    approvals: &'static [ApprovalType],
}

impl SeedFormType {
    fn form_type(&self) -> FormType {
        FormType {
            id: FormTypeId(self.id.to_string()),
            name: self.name.to_string(),
            requires_lecturer_approval: self.approvals.contains(&ApprovalType::Lecturer),
            requires_dean_approval: self.approvals.contains(&ApprovalType::Dean),
            requires_registrar_approval: self.approvals.contains(&ApprovalType::Registrar),
            requires_accounts_receivable_approval: self
                .approvals
                .contains(&ApprovalType::AccountsReceivable),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedStaff {
    id: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    role: &'static str,
    department: Option<&'static str>,
}

impl SeedStaff {
    fn member(&self) -> StaffMember {
        StaffMember {
            id: StaffId(self.id.to_string()),
            first_name: self.first_name.to_string(),
            last_name: self.last_name.to_string(),
            role: self.role.to_string(),
            department: self.department.map(str::to_string),
            is_active: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub form_types: Vec<&'static str>,
    pub staff: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use formchain_core::domain::form_type::{FormType, FormTypeId};

use super::{column, FormTypeRepository, RepositoryError};
use crate::DbPool;

const FORM_TYPE_COLUMNS: &str = "id, name, requires_lecturer_approval, requires_dean_approval, \
     requires_registrar_approval, requires_accounts_receivable_approval, is_active";

pub struct SqlFormTypeRepository {
    pool: DbPool,
}

impl SqlFormTypeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn form_type_from_row(row: &SqliteRow) -> Result<FormType, RepositoryError> {
    Ok(FormType {
        id: FormTypeId(column(row, "id")?),
        name: column(row, "name")?,
        requires_lecturer_approval: column(row, "requires_lecturer_approval")?,
        requires_dean_approval: column(row, "requires_dean_approval")?,
        requires_registrar_approval: column(row, "requires_registrar_approval")?,
        requires_accounts_receivable_approval: column(
            row,
            "requires_accounts_receivable_approval",
        )?,
        is_active: column(row, "is_active")?,
    })
}

#[async_trait]
impl FormTypeRepository for SqlFormTypeRepository {
    async fn find_by_id(&self, id: &FormTypeId) -> Result<Option<FormType>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {FORM_TYPE_COLUMNS} FROM form_type WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(form_type_from_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<FormType>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FORM_TYPE_COLUMNS} FROM form_type WHERE is_active = 1 ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(form_type_from_row).collect()
    }

    async fn save(&self, form_type: FormType) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO form_type ({FORM_TYPE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 requires_lecturer_approval = excluded.requires_lecturer_approval,
                 requires_dean_approval = excluded.requires_dean_approval,
                 requires_registrar_approval = excluded.requires_registrar_approval,
                 requires_accounts_receivable_approval = excluded.requires_accounts_receivable_approval,
                 is_active = excluded.is_active"
        ))
        .bind(&form_type.id.0)
        .bind(&form_type.name)
        .bind(form_type.requires_lecturer_approval)
        .bind(form_type.requires_dean_approval)
        .bind(form_type.requires_registrar_approval)
        .bind(form_type.requires_accounts_receivable_approval)
        .bind(form_type.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

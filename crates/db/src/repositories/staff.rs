use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use formchain_core::domain::approval::ApprovalType;
use formchain_core::domain::staff::{StaffId, StaffMember};

use super::{column, RepositoryError, StaffDirectory};
use crate::DbPool;

pub struct SqlStaffDirectory {
    pool: DbPool,
}

impl SqlStaffDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn staff_from_row(row: &SqliteRow) -> Result<StaffMember, RepositoryError> {
    Ok(StaffMember {
        id: StaffId(column(row, "id")?),
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        role: column(row, "role")?,
        department: column(row, "department")?,
        is_active: column(row, "is_active")?,
    })
}

#[async_trait]
impl StaffDirectory for SqlStaffDirectory {
    async fn find_staff(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, role, department, is_active FROM staff WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(staff_from_row).transpose()
    }

    async fn list_eligible(
        &self,
        approval_type: ApprovalType,
        department: Option<&str>,
    ) -> Result<Vec<StaffMember>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, role, department, is_active
             FROM staff
             WHERE is_active = 1
             ORDER BY last_name ASC, first_name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        // Role titles are free-form, so matching happens on the domain type.
        let mut eligible = Vec::new();
        for row in &rows {
            let staff = staff_from_row(row)?;
            let in_department = department.map(|dept| staff.in_department(dept)).unwrap_or(true);
            if staff.can_act_as(approval_type) && in_department {
                eligible.push(staff);
            }
        }
        Ok(eligible)
    }

    async fn save_staff(&self, staff: StaffMember) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO staff (id, first_name, last_name, role, department, is_active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 role = excluded.role,
                 department = excluded.department,
                 is_active = excluded.is_active",
        )
        .bind(&staff.id.0)
        .bind(&staff.first_name)
        .bind(&staff.last_name)
        .bind(&staff.role)
        .bind(&staff.department)
        .bind(staff.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use formchain_core::domain::approval::ApprovalType;
    use formchain_core::domain::staff::{StaffId, StaffMember};

    use super::SqlStaffDirectory;
    use crate::repositories::StaffDirectory;
    use crate::{connect_with_settings, migrations};

    async fn directory() -> SqlStaffDirectory {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlStaffDirectory::new(pool)
    }

    fn member(id: &str, last_name: &str, role: &str, department: &str) -> StaffMember {
        StaffMember {
            id: StaffId(id.to_string()),
            first_name: "Sam".to_string(),
            last_name: last_name.to_string(),
            role: role.to_string(),
            department: Some(department.to_string()),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip_with_upsert() {
        let directory = directory().await;
        let mut dean = member("dean-1", "Adeyemi", "Dean", "Science");
        directory.save_staff(dean.clone()).await.expect("save");

        dean.is_active = false;
        directory.save_staff(dean.clone()).await.expect("update");

        let found = directory.find_staff(&dean.id).await.expect("find");
        assert_eq!(found, Some(dean.clone()));
        assert!(!directory.is_eligible(&dean.id, ApprovalType::Dean).await.expect("eligible"));
        assert!(directory.find_staff(&StaffId("nobody".into())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn eligibility_matches_role_titles_and_department() {
        let directory = directory().await;
        for staff in [
            member("dean-1", "Bello", "Associate Dean", "Science"),
            member("dean-2", "Achebe", "Dean", "Arts"),
            member("reg-1", "Cole", "Registrar", "Administration"),
        ] {
            directory.save_staff(staff).await.expect("save");
        }

        let deans = directory.list_eligible(ApprovalType::Dean, None).await.expect("list");
        let ids: Vec<_> = deans.iter().map(|staff| staff.id.0.as_str()).collect();
        assert_eq!(ids, vec!["dean-2", "dean-1"]);

        let science = directory
            .list_eligible(ApprovalType::Dean, Some("science"))
            .await
            .expect("list by department");
        assert_eq!(science.len(), 1);
        assert_eq!(science[0].id, StaffId("dean-1".to_string()));

        assert!(directory
            .is_eligible(&StaffId("reg-1".to_string()), ApprovalType::Registrar)
            .await
            .expect("eligible"));
        assert!(!directory
            .is_eligible(&StaffId("reg-1".to_string()), ApprovalType::Dean)
            .await
            .expect("eligible"));
    }
}

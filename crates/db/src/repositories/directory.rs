use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use reimburse_core::domain::employee::{Company, CompanyId, Employee, EmployeeId, EmployeeRole};
use reimburse_core::store::{EmployeeDirectory, StoreError};

use super::{decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeDirectory {
    pool: DbPool,
}

impl SqlEmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, email, role, manager_id, requires_manager_approval
             FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_employee(r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, base_currency FROM company WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(Company {
                id: CompanyId(r.try_get("id").map_err(decode_error)?),
                name: r.try_get("name").map_err(decode_error)?,
                base_currency: r.try_get("base_currency").map_err(decode_error)?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_employee(&self, employee: &Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, company_id, name, email, role, manager_id,
                                   requires_manager_approval)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 company_id = excluded.company_id,
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 manager_id = excluded.manager_id,
                 requires_manager_approval = excluded.requires_manager_approval",
        )
        .bind(&employee.id.0)
        .bind(&employee.company_id.0)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(employee.role.as_str())
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(employee.requires_manager_approval)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_company(&self, company: &Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, base_currency) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 base_currency = excluded.base_currency",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.base_currency)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let company_id: String = row.try_get("company_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let email: String = row.try_get("email").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(decode_error)?;
    let requires_manager_approval: bool =
        row.try_get("requires_manager_approval").map_err(decode_error)?;

    Ok(Employee {
        id: EmployeeId(id),
        company_id: CompanyId(company_id),
        name,
        email,
        role: EmployeeRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role}`")))?,
        manager_id: manager_id.map(EmployeeId),
        requires_manager_approval,
    })
}

#[async_trait::async_trait]
impl EmployeeDirectory for SqlEmployeeDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.fetch_employee(id).await?)
    }

    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self.fetch_company(id).await?)
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), StoreError> {
        Ok(self.upsert_employee(&employee).await?)
    }

    async fn save_company(&self, company: Company) -> Result<(), StoreError> {
        Ok(self.upsert_company(&company).await?)
    }
}

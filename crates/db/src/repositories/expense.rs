use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use reimburse_core::domain::employee::{CompanyId, EmployeeId};
use reimburse_core::domain::expense::{ConversionStatus, Expense, ExpenseId, ExpenseStatus};
use reimburse_core::store::{ExpenseRepository, StoreError};

use super::{
    decode_error, format_timestamp, from_json, parse_decimal, parse_timestamp, to_json,
    RepositoryError,
};
use crate::DbPool;

const SELECT_EXPENSE: &str = "SELECT id, company_id, submitter_id, amount, currency, converted_amount,
        base_currency, conversion, category, description, merchant, expense_date, status,
        current_index, flow_json, decisions_json, comments_json, submitted_at
 FROM expense";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_EXPENSE} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_expense(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        let current_index = i64::try_from(expense.current_index).map_err(decode_error)?;

        sqlx::query(
            "INSERT INTO expense (id, company_id, submitter_id, amount, currency, converted_amount,
                                  base_currency, conversion, category, description, merchant,
                                  expense_date, status, current_index, flow_json, decisions_json,
                                  comments_json, submitted_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 converted_amount = excluded.converted_amount,
                 conversion = excluded.conversion,
                 status = excluded.status,
                 current_index = excluded.current_index,
                 flow_json = excluded.flow_json,
                 decisions_json = excluded.decisions_json,
                 comments_json = excluded.comments_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&expense.id.0)
        .bind(&expense.company_id.0)
        .bind(&expense.submitter_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.converted_amount.to_string())
        .bind(&expense.base_currency)
        .bind(expense.conversion.as_str())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.merchant.as_deref())
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(expense.status.as_str())
        .bind(current_index)
        .bind(to_json("flow_json", &expense.flow)?)
        .bind(to_json("decisions_json", &expense.decisions)?)
        .bind(to_json("comments_json", &expense.comments)?)
        .bind(format_timestamp(&expense.submitted_at))
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_where(
        &self,
        clause: &str,
        binding: Option<&str>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let sql = format!("{SELECT_EXPENSE} {clause}");
        let mut query = sqlx::query(&sql);
        if let Some(value) = binding {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_expense).collect()
    }
}

fn row_to_expense(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let company_id: String = row.try_get("company_id").map_err(decode_error)?;
    let submitter_id: String = row.try_get("submitter_id").map_err(decode_error)?;
    let amount: String = row.try_get("amount").map_err(decode_error)?;
    let currency: String = row.try_get("currency").map_err(decode_error)?;
    let converted_amount: String = row.try_get("converted_amount").map_err(decode_error)?;
    let base_currency: String = row.try_get("base_currency").map_err(decode_error)?;
    let conversion: String = row.try_get("conversion").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let merchant: Option<String> = row.try_get("merchant").map_err(decode_error)?;
    let expense_date: String = row.try_get("expense_date").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let current_index: i64 = row.try_get("current_index").map_err(decode_error)?;
    let flow_json: String = row.try_get("flow_json").map_err(decode_error)?;
    let decisions_json: String = row.try_get("decisions_json").map_err(decode_error)?;
    let comments_json: String = row.try_get("comments_json").map_err(decode_error)?;
    let submitted_at: String = row.try_get("submitted_at").map_err(decode_error)?;

    Ok(Expense {
        id: ExpenseId(id),
        company_id: CompanyId(company_id),
        submitter_id: EmployeeId(submitter_id),
        amount: parse_decimal("amount", &amount)?,
        currency,
        converted_amount: parse_decimal("converted_amount", &converted_amount)?,
        base_currency,
        conversion: ConversionStatus::parse(&conversion)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown conversion `{conversion}`")))?,
        category,
        description,
        merchant,
        expense_date: NaiveDate::parse_from_str(&expense_date, "%Y-%m-%d")
            .map_err(|error| RepositoryError::Decode(format!("expense_date: {error}")))?,
        status: ExpenseStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?,
        current_index: usize::try_from(current_index).map_err(decode_error)?,
        flow: from_json("flow_json", &flow_json)?,
        decisions: from_json("decisions_json", &decisions_json)?,
        comments: from_json("comments_json", &comments_json)?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        Ok(self.fetch_one(id).await?)
    }

    async fn save(&self, expense: Expense) -> Result<(), StoreError> {
        Ok(self.upsert(&expense).await?)
    }

    async fn list_by_submitter(
        &self,
        submitter_id: &EmployeeId,
    ) -> Result<Vec<Expense>, StoreError> {
        Ok(self
            .fetch_where(
                "WHERE submitter_id = ? ORDER BY submitted_at DESC, rowid DESC",
                Some(&submitter_id.0),
            )
            .await?)
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError> {
        Ok(self
            .fetch_where(
                "WHERE company_id = ? ORDER BY submitted_at DESC, rowid DESC",
                Some(&company_id.0),
            )
            .await?)
    }

    async fn list_pending(&self) -> Result<Vec<Expense>, StoreError> {
        Ok(self
            .fetch_where("WHERE status = 'pending' ORDER BY submitted_at ASC, rowid ASC", None)
            .await?)
    }
}

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use reimburse_core::domain::employee::{CompanyId, EmployeeId};
use reimburse_core::domain::policy::{ApprovalCondition, PolicyRule, RuleId};
use reimburse_core::store::{PolicyRepository, StoreError};

use super::{decode_error, format_timestamp, from_json, parse_timestamp, to_json, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn rules_for(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<PolicyRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT company_id, id, name, sequence, approver_ids_json, condition_json, updated_at
             FROM policy_rule WHERE company_id = ? ORDER BY rowid ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn fetch_one(
        &self,
        company_id: &CompanyId,
        rule_id: &RuleId,
    ) -> Result<Option<PolicyRule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT company_id, id, name, sequence, approver_ids_json, condition_json, updated_at
             FROM policy_rule WHERE company_id = ? AND id = ?",
        )
        .bind(&company_id.0)
        .bind(&rule_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_rule(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, rule: &PolicyRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO policy_rule (company_id, id, name, sequence, rule_type,
                                      approver_ids_json, condition_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(company_id, id) DO UPDATE SET
                 name = excluded.name,
                 sequence = excluded.sequence,
                 rule_type = excluded.rule_type,
                 approver_ids_json = excluded.approver_ids_json,
                 condition_json = excluded.condition_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&rule.company_id.0)
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(rule.sequence)
        .bind(rule.rule_type().as_str())
        .bind(to_json("approver_ids_json", &rule.approver_ids)?)
        .bind(to_json("condition_json", &rule.condition)?)
        .bind(format_timestamp(&rule.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, company_id: &CompanyId, rule_id: &RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM policy_rule WHERE company_id = ? AND id = ?")
            .bind(&company_id.0)
            .bind(&rule_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<PolicyRule, RepositoryError> {
    let company_id: String = row.try_get("company_id").map_err(decode_error)?;
    let id: String = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let approver_ids_json: String = row.try_get("approver_ids_json").map_err(decode_error)?;
    let condition_json: String = row.try_get("condition_json").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let approver_ids: Vec<EmployeeId> = from_json("approver_ids_json", &approver_ids_json)?;
    let condition: ApprovalCondition = from_json("condition_json", &condition_json)?;

    Ok(PolicyRule {
        id: RuleId(id),
        company_id: CompanyId(company_id),
        name,
        sequence: i32::try_from(sequence).map_err(decode_error)?,
        approver_ids,
        condition,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<PolicyRule>, StoreError> {
        Ok(self.rules_for(company_id).await?)
    }

    async fn find_by_id(
        &self,
        company_id: &CompanyId,
        rule_id: &RuleId,
    ) -> Result<Option<PolicyRule>, StoreError> {
        Ok(self.fetch_one(company_id, rule_id).await?)
    }

    async fn save(&self, rule: PolicyRule) -> Result<(), StoreError> {
        Ok(self.upsert(&rule).await?)
    }

    async fn delete(&self, company_id: &CompanyId, rule_id: &RuleId) -> Result<bool, StoreError> {
        Ok(self.remove(company_id, rule_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use reimburse_core::domain::employee::{CompanyId, EmployeeId};
    use reimburse_core::domain::policy::{ApprovalCondition, PolicyRule, RuleId};
    use reimburse_core::store::{PolicyRepository, StoreError};

    use super::SqlPolicyRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query("INSERT INTO company (id, name, base_currency) VALUES ('acme', 'Acme', 'USD')")
            .execute(&pool)
            .await
            .expect("company");
        pool
    }

    fn rule(id: &str, sequence: i32, condition: ApprovalCondition) -> PolicyRule {
        PolicyRule {
            id: RuleId(id.to_string()),
            company_id: CompanyId("acme".to_string()),
            name: format!("{id} rule"),
            sequence,
            approver_ids: vec![EmployeeId("fin-1".to_string()), EmployeeId("cfo".to_string())],
            condition,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rules_list_in_insertion_order_and_survive_updates() {
        let repo = SqlPolicyRepository::new(setup_pool().await);
        let acme = CompanyId("acme".to_string());

        repo.save(rule("second", 2, ApprovalCondition::Unanimous)).await.expect("second");
        repo.save(rule(
            "first",
            1,
            ApprovalCondition::Hybrid {
                threshold: Decimal::new(50, 0),
                approver_id: EmployeeId("cfo".to_string()),
            },
        ))
        .await
        .expect("first");
        repo.save(rule("second", 3, ApprovalCondition::Unanimous)).await.expect("update");

        let rules = repo.list_for_company(&acme).await.expect("list");
        assert_eq!(rules.iter().map(|r| r.id.0.as_str()).collect::<Vec<_>>(), ["second", "first"]);
        assert_eq!(rules[0].sequence, 3);
        assert_eq!(rules[1].condition.designated_approver().map(|id| id.0.as_str()), Some("cfo"));
    }

    #[tokio::test]
    async fn delete_reports_whether_a_rule_was_removed() {
        let repo = SqlPolicyRepository::new(setup_pool().await);
        let acme = CompanyId("acme".to_string());
        let id = RuleId("finance".to_string());
        repo.save(rule("finance", 1, ApprovalCondition::Unanimous)).await.expect("save");

        assert!(repo.delete(&acme, &id).await.expect("delete"));
        assert!(!repo.delete(&acme, &id).await.expect("delete again"));
        assert!(repo.find_by_id(&acme, &id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn rules_for_unknown_company_are_refused_by_the_schema() {
        let repo = SqlPolicyRepository::new(setup_pool().await);
        let mut orphan = rule("orphan", 1, ApprovalCondition::Unanimous);
        orphan.company_id = CompanyId("nowhere".to_string());

        let error = repo.save(orphan).await.expect_err("foreign key");
        assert!(matches!(error, StoreError::Backend(_)));
    }
}

use sqlx::Executor;

use reimburse_core::domain::employee::CompanyId;

use crate::connection::DbPool;
use crate::repositories::policy::SqlPolicyRepository;
use crate::repositories::RepositoryError;

const SEED_COMPANIES: &[SeedCompany] = &[
    SeedCompany { id: "acme", base_currency: "USD" },
    SeedCompany { id: "globex", base_currency: "EUR" },
];

const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee { id: "acme-admin", company_id: "acme", role: "admin", manager_id: None },
    SeedEmployee { id: "acme-mgr", company_id: "acme", role: "manager", manager_id: None },
    SeedEmployee {
        id: "acme-emp-1",
        company_id: "acme",
        role: "employee",
        manager_id: Some("acme-mgr"),
    },
    SeedEmployee {
        id: "acme-emp-2",
        company_id: "acme",
        role: "employee",
        manager_id: Some("acme-mgr"),
    },
    SeedEmployee { id: "acme-fin-1", company_id: "acme", role: "manager", manager_id: None },
    SeedEmployee { id: "acme-fin-2", company_id: "acme", role: "manager", manager_id: None },
    SeedEmployee { id: "acme-fin-3", company_id: "acme", role: "manager", manager_id: None },
    SeedEmployee { id: "acme-cfo", company_id: "acme", role: "manager", manager_id: None },
    SeedEmployee { id: "globex-admin", company_id: "globex", role: "admin", manager_id: None },
    SeedEmployee { id: "globex-mgr", company_id: "globex", role: "manager", manager_id: None },
    SeedEmployee {
        id: "globex-emp-1",
        company_id: "globex",
        role: "employee",
        manager_id: Some("globex-mgr"),
    },
];

const SEED_RULES: &[SeedRule] = &[
    SeedRule {
        company_id: "acme",
        id: "finance-review",
        sequence: 1,
        rule_type: "percentage",
        approver_count: 3,
    },
    SeedRule {
        company_id: "acme",
        id: "cfo-signoff",
        sequence: 2,
        rule_type: "designated",
        approver_count: 2,
    },
    SeedRule {
        company_id: "globex",
        id: "board-review",
        sequence: 1,
        rule_type: "unanimous",
        approver_count: 2,
    },
];

/// Demo organisation: two companies, their staff, and one policy chain each.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            companies: SEED_COMPANIES.iter().map(|company| company.id).collect(),
            employees: SEED_EMPLOYEES.len(),
            rules: SEED_RULES.len(),
        })
    }

    /// Checks the seeded rows against the fixture contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for company in SEED_COMPANIES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM company WHERE id = ?1 AND base_currency = ?2)",
            )
            .bind(company.id)
            .bind(company.base_currency)
            .fetch_one(pool)
            .await?;
            checks.push((company.id, exists == 1));
        }

        for employee in SEED_EMPLOYEES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM employee
                 WHERE id = ?1 AND company_id = ?2 AND role = ?3 AND manager_id IS ?4)",
            )
            .bind(employee.id)
            .bind(employee.company_id)
            .bind(employee.role)
            .bind(employee.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((employee.id, exists == 1));
        }

        let rules = SqlPolicyRepository::new(pool.clone());
        for company in SEED_COMPANIES {
            let stored = rules.rules_for(&CompanyId(company.id.to_string())).await?;
            for expected in SEED_RULES.iter().filter(|rule| rule.company_id == company.id) {
                let matches = stored.iter().any(|rule| {
                    rule.id.0 == expected.id
                        && rule.sequence == expected.sequence
                        && rule.rule_type().as_str() == expected.rule_type
                        && rule.approver_ids.len() == expected.approver_count
                        && rule.validate().is_ok()
                });
                checks.push((expected.id, matches));
            }
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo organisation, including any expenses filed against it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        let companies = sql_array_from_ids(&SEED_COMPANIES.iter().map(|c| c.id).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM expense WHERE company_id IN {companies}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM policy_rule WHERE company_id IN {companies}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM employee WHERE company_id IN {companies}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM company WHERE id IN {companies}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedCompany {
    id: &'static str,
    base_currency: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct SeedEmployee {
    id: &'static str,
    company_id: &'static str,
    role: &'static str,
    manager_id: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct SeedRule {
    company_id: &'static str,
    id: &'static str,
    sequence: i32,
    rule_type: &'static str,
    approver_count: usize,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub companies: Vec<&'static str>,
    pub employees: usize,
    pub rules: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_mentions_every_seeded_id() {
        for id in SEED_EMPLOYEES.iter().map(|e| e.id).chain(SEED_RULES.iter().map(|r| r.id)) {
            assert!(DemoSeedDataset::SQL.contains(&format!("'{id}'")), "fixture is missing `{id}`");
        }
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.companies, ["acme", "globex"]);

        let second = DemoSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify seed");
        assert!(second_verification.all_present);
        assert_eq!(second.rules, 3);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_the_demo_organisation() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoSeedDataset::load(&pool).await.expect("load");

        DemoSeedDataset::clean(&pool).await.expect("clean");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }
}

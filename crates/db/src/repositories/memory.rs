use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use reimburse_core::domain::employee::{Company, CompanyId, Employee, EmployeeId};
use reimburse_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use reimburse_core::domain::policy::{PolicyRule, RuleId};
use reimburse_core::store::{EmployeeDirectory, ExpenseRepository, PolicyRepository, StoreError};

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    /// Keyed by expense id; the sequence breaks ties between equal submission times.
    expenses: RwLock<HashMap<String, (u64, Expense)>>,
    next_seq: AtomicU64,
}

impl InMemoryExpenseRepository {
    async fn collect<F>(&self, keep: F, newest_first: bool) -> Vec<Expense>
    where
        F: Fn(&Expense) -> bool,
    {
        let expenses = self.expenses.read().await;
        let mut found: Vec<_> = expenses.values().filter(|(_, e)| keep(e)).cloned().collect();
        found.sort_by(|(a_seq, a), (b_seq, b)| {
            a.submitted_at.cmp(&b.submitted_at).then(a_seq.cmp(b_seq))
        });
        if newest_first {
            found.reverse();
        }
        found.into_iter().map(|(_, expense)| expense).collect()
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).map(|(_, expense)| expense.clone()))
    }

    async fn save(&self, expense: Expense) -> Result<(), StoreError> {
        let mut expenses = self.expenses.write().await;
        let seq = match expenses.get(&expense.id.0) {
            Some((seq, _)) => *seq,
            None => self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        expenses.insert(expense.id.0.clone(), (seq, expense));
        Ok(())
    }

    async fn list_by_submitter(
        &self,
        submitter_id: &EmployeeId,
    ) -> Result<Vec<Expense>, StoreError> {
        Ok(self.collect(|expense| &expense.submitter_id == submitter_id, true).await)
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError> {
        Ok(self.collect(|expense| &expense.company_id == company_id, true).await)
    }

    async fn list_pending(&self) -> Result<Vec<Expense>, StoreError> {
        Ok(self.collect(|expense| expense.status == ExpenseStatus::Pending, false).await)
    }
}

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    rules: RwLock<Vec<PolicyRule>>,
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<PolicyRule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|rule| &rule.company_id == company_id).cloned().collect())
    }

    async fn find_by_id(
        &self,
        company_id: &CompanyId,
        rule_id: &RuleId,
    ) -> Result<Option<PolicyRule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().find(|rule| &rule.company_id == company_id && &rule.id == rule_id).cloned())
    }

    async fn save(&self, rule: PolicyRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        match rules
            .iter_mut()
            .find(|existing| existing.company_id == rule.company_id && existing.id == rule.id)
        {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    async fn delete(&self, company_id: &CompanyId, rule_id: &RuleId) -> Result<bool, StoreError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| !(&rule.company_id == company_id && &rule.id == rule_id));
        Ok(rules.len() != before)
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<String, Employee>>,
    companies: RwLock<HashMap<String, Company>>,
}

#[async_trait::async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), StoreError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn save_company(&self, company: Company) -> Result<(), StoreError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use reimburse_core::domain::employee::{CompanyId, EmployeeId};
    use reimburse_core::domain::expense::{ConversionStatus, Expense, ExpenseId, ExpenseStatus};
    use reimburse_core::domain::policy::{ApprovalCondition, PolicyRule, RuleId};
    use reimburse_core::store::{ExpenseRepository, PolicyRepository};

    use crate::repositories::{InMemoryExpenseRepository, InMemoryPolicyRepository};

    fn expense(id: &str, status: ExpenseStatus, minutes_ago: i64) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            company_id: CompanyId("acme".to_string()),
            submitter_id: EmployeeId("emp-1".to_string()),
            amount: Decimal::new(1999, 2),
            currency: "USD".to_string(),
            converted_amount: Decimal::new(1999, 2),
            base_currency: "USD".to_string(),
            conversion: ConversionStatus::Converted,
            category: "software".to_string(),
            description: "Plugin licence".to_string(),
            merchant: None,
            expense_date: NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date"),
            status,
            flow: Vec::new(),
            current_index: 0,
            decisions: Vec::new(),
            comments: Vec::new(),
            submitted_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn in_memory_expense_listings_are_ordered() {
        let repo = InMemoryExpenseRepository::default();
        repo.save(expense("EXP-A", ExpenseStatus::Pending, 20)).await.expect("a");
        repo.save(expense("EXP-B", ExpenseStatus::Approved, 10)).await.expect("b");
        repo.save(expense("EXP-C", ExpenseStatus::Pending, 1)).await.expect("c");

        let mine = repo.list_by_submitter(&EmployeeId("emp-1".to_string())).await.expect("mine");
        assert_eq!(
            mine.iter().map(|e| e.id.0.as_str()).collect::<Vec<_>>(),
            ["EXP-C", "EXP-B", "EXP-A"]
        );

        let pending = repo.list_pending().await.expect("pending");
        assert_eq!(pending.iter().map(|e| e.id.0.as_str()).collect::<Vec<_>>(), ["EXP-A", "EXP-C"]);
    }

    #[tokio::test]
    async fn in_memory_policy_repo_keeps_insertion_order_on_update() {
        let repo = InMemoryPolicyRepository::default();
        let acme = CompanyId("acme".to_string());
        let rule = |id: &str, sequence: i32| PolicyRule {
            id: RuleId(id.to_string()),
            company_id: acme.clone(),
            name: id.to_string(),
            sequence,
            approver_ids: vec![EmployeeId("fin-1".to_string())],
            condition: ApprovalCondition::Unanimous,
            updated_at: Utc::now(),
        };

        repo.save(rule("b", 2)).await.expect("b");
        repo.save(rule("a", 1)).await.expect("a");
        repo.save(rule("b", 5)).await.expect("b again");

        let rules = repo.list_for_company(&acme).await.expect("list");
        assert_eq!(rules.iter().map(|r| r.id.0.as_str()).collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(rules[0].sequence, 5);
        assert!(repo.delete(&acme, &RuleId("a".to_string())).await.expect("delete"));
    }
}

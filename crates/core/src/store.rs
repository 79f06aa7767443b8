use async_trait::async_trait;
use thiserror::Error;

use crate::domain::employee::{Company, CompanyId, Employee, EmployeeId};
use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::policy::{PolicyRule, RuleId};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Backend(_) => Self::Persistence(value.to_string()),
            StoreError::Decode(message) => Self::CorruptRecord(message),
        }
    }
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError>;
    async fn save(&self, expense: Expense) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_by_submitter(&self, submitter_id: &EmployeeId)
        -> Result<Vec<Expense>, StoreError>;
    /// Newest first.
    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError>;
    /// Oldest first, so queues drain in submission order.
    async fn list_pending(&self) -> Result<Vec<Expense>, StoreError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Returns a consistent copy of the company's rules in insertion order.
    async fn list_for_company(&self, company_id: &CompanyId)
        -> Result<Vec<PolicyRule>, StoreError>;
    async fn find_by_id(
        &self,
        company_id: &CompanyId,
        rule_id: &RuleId,
    ) -> Result<Option<PolicyRule>, StoreError>;
    async fn save(&self, rule: PolicyRule) -> Result<(), StoreError>;
    async fn delete(&self, company_id: &CompanyId, rule_id: &RuleId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError>;
    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError>;
    async fn save_employee(&self, employee: Employee) -> Result<(), StoreError>;
    async fn save_company(&self, company: Company) -> Result<(), StoreError>;
}

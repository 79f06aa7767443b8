pub mod audit;
pub mod config;
pub mod currency;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod flows;
pub mod store;
pub mod views;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use currency::{CurrencyConverter, IdentityConverter, StaticRateConverter};
pub use domain::employee::{Company, CompanyId, Employee, EmployeeId, EmployeeRole};
pub use domain::expense::{
    ApprovalDecision, ApprovalStep, ConversionStatus, Expense, ExpenseId, ExpenseStatus, StepKind,
};
pub use domain::policy::{ApprovalCondition, PolicyRule, RuleId, RuleType};
pub use engine::{ApprovalEngine, EngineSettings, RequestContext, SubmitExpense};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use store::{EmployeeDirectory, ExpenseRepository, PolicyRepository, StoreError};

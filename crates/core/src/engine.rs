use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::currency::{convert_or_degrade, is_valid_code, normalize_code, CurrencyConverter};
use crate::domain::employee::{CompanyId, Employee, EmployeeId};
use crate::domain::expense::{ConversionStatus, Expense, ExpenseId, ExpenseStatus};
use crate::domain::policy::{PolicyRule, RuleId};
use crate::errors::{ApplicationError, DomainError, EntityKind};
use crate::flows::{build_flow, record_approval, record_rejection, Decision, DecisionOutcome};
use crate::store::{EmployeeDirectory, ExpenseRepository, PolicyRepository};
use crate::views;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Reject decisions from actors the active step does not name.
    pub enforce_approver_eligibility: bool,
    pub conversion_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { enforce_approver_eligibility: false, conversion_timeout: Duration::from_secs(5) }
    }
}

/// Identity and correlation for one caller request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: EmployeeId,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(actor_id: EmployeeId) -> Self {
        Self { actor_id, correlation_id: Uuid::new_v4().to_string() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    fn audit(&self) -> AuditContext {
        AuditContext::new(self.correlation_id.clone(), self.actor_id.0.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitExpense {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub merchant: Option<String>,
    pub expense_date: NaiveDate,
}

impl SubmitExpense {
    fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvalidExpense("amount must be greater than zero".to_string()));
        }
        if !is_valid_code(&self.currency) {
            return Err(DomainError::InvalidExpense(format!(
                "currency `{}` must be a three-letter code",
                self.currency
            )));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::InvalidExpense("category is required".to_string()));
        }
        Ok(())
    }
}

/// Per-expense mutual exclusion. Unrelated expenses never share a lock.
#[derive(Default)]
pub struct ExpenseLocks {
    locks: DashMap<ExpenseId, Arc<Mutex<()>>>,
}

impl ExpenseLocks {
    pub async fn acquire(&self, expense_id: &ExpenseId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(expense_id.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Unlocks and drops the entry once no other task holds or awaits it.
    pub fn release(&self, expense_id: &ExpenseId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.remove_if(expense_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.len()
    }
}

#[derive(Clone, Copy, Debug)]
enum DecisionKind {
    Approve,
    Reject,
}

impl DecisionKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Approve => "expense.approval_recorded",
            Self::Reject => "expense.rejection_recorded",
        }
    }
}

pub struct ApprovalEngine {
    expenses: Arc<dyn ExpenseRepository>,
    policies: Arc<dyn PolicyRepository>,
    directory: Arc<dyn EmployeeDirectory>,
    converter: Arc<dyn CurrencyConverter>,
    audit: Arc<dyn AuditSink>,
    locks: ExpenseLocks,
    settings: EngineSettings,
}

impl ApprovalEngine {
    pub fn new(
        expenses: Arc<dyn ExpenseRepository>,
        policies: Arc<dyn PolicyRepository>,
        directory: Arc<dyn EmployeeDirectory>,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            expenses,
            policies,
            directory,
            converter,
            audit: Arc::new(TracingAuditSink),
            locks: ExpenseLocks::default(),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn submit(
        &self,
        ctx: &RequestContext,
        input: SubmitExpense,
    ) -> Result<Expense, ApplicationError> {
        let submitter = self.resolve_employee(&ctx.actor_id).await?;
        input.validate()?;

        let company = self
            .directory
            .find_company(&submitter.company_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Company, &submitter.company_id))?;

        let expense_id = ExpenseId(format!("EXP-{}", Uuid::new_v4().simple()));
        let currency = normalize_code(&input.currency);
        let base_currency = normalize_code(&company.base_currency);

        // Runs before the expense exists, so no lock is held while the provider is slow.
        let converted = convert_or_degrade(
            self.converter.as_ref(),
            input.amount,
            &currency,
            &base_currency,
            self.settings.conversion_timeout,
        )
        .await;
        if let Some(failure) = &converted.failure {
            warn!(
                event_name = "expense.conversion_degraded",
                correlation_id = %ctx.correlation_id,
                expense_id = %expense_id,
                from = %currency,
                to = %base_currency,
                error = %failure,
                "currency conversion failed; keeping original amount"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(expense_id.clone()),
                    &ctx.audit(),
                    "expense.conversion_degraded",
                    AuditCategory::Conversion,
                    AuditOutcome::Degraded,
                )
                .with_metadata("from", currency.clone())
                .with_metadata("to", base_currency.clone())
                .with_metadata("error", failure.clone()),
            );
        }

        let manager = match submitter.approving_manager_id() {
            Some(manager_id) => {
                let manager = self.directory.find_employee(manager_id).await?;
                if manager.is_none() {
                    warn!(
                        event_name = "expense.manager_unresolved",
                        correlation_id = %ctx.correlation_id,
                        expense_id = %expense_id,
                        manager_id = %manager_id,
                        "submitter manager could not be resolved; skipping manager step"
                    );
                }
                manager
            }
            None => None,
        };

        let rules = self.policies.list_for_company(&company.id).await?;
        let flow = build_flow(&submitter, manager.as_ref(), &rules);
        let status = if flow.is_empty() { ExpenseStatus::Approved } else { ExpenseStatus::Pending };

        let expense = Expense {
            id: expense_id,
            company_id: company.id.clone(),
            submitter_id: submitter.id.clone(),
            amount: input.amount,
            currency,
            converted_amount: converted.amount,
            base_currency,
            conversion: converted.status,
            category: input.category.trim().to_string(),
            description: input.description.trim().to_string(),
            merchant: input.merchant.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            expense_date: input.expense_date,
            status,
            flow,
            current_index: 0,
            decisions: Vec::new(),
            comments: Vec::new(),
            submitted_at: Utc::now(),
        };

        self.expenses.save(expense.clone()).await?;

        info!(
            event_name = "expense.submitted",
            correlation_id = %ctx.correlation_id,
            expense_id = %expense.id,
            company_id = %expense.company_id,
            steps = expense.flow.len(),
            status = expense.status.as_str(),
            "expense submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                &ctx.audit(),
                "expense.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("steps", expense.flow.len().to_string())
            .with_metadata("status", expense.status.as_str())
            .with_metadata("converted", (expense.conversion == ConversionStatus::Converted).to_string()),
        );

        Ok(expense)
    }

    pub async fn approve(
        &self,
        ctx: &RequestContext,
        expense_id: &ExpenseId,
        comment: Option<String>,
    ) -> Result<Expense, ApplicationError> {
        self.decide(ctx, expense_id, comment, DecisionKind::Approve).await
    }

    pub async fn reject(
        &self,
        ctx: &RequestContext,
        expense_id: &ExpenseId,
        comment: Option<String>,
    ) -> Result<Expense, ApplicationError> {
        self.decide(ctx, expense_id, comment, DecisionKind::Reject).await
    }

    pub async fn expense(&self, expense_id: &ExpenseId) -> Result<Expense, ApplicationError> {
        self.expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Expense, expense_id))
    }

    pub async fn my_submissions(&self, ctx: &RequestContext) -> Result<Vec<Expense>, ApplicationError> {
        Ok(self.expenses.list_by_submitter(&ctx.actor_id).await?)
    }

    pub async fn pending_for(&self, ctx: &RequestContext) -> Result<Vec<Expense>, ApplicationError> {
        let pending = self.expenses.list_pending().await?;
        Ok(views::pending_queue(pending, &ctx.actor_id))
    }

    pub async fn company_ledger(
        &self,
        ctx: &RequestContext,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, ApplicationError> {
        self.require_admin(ctx, company_id, "view the company ledger").await?;
        Ok(self.expenses.list_by_company(company_id).await?)
    }

    /// Company rules in flow order.
    pub async fn list_rules(&self, company_id: &CompanyId) -> Result<Vec<PolicyRule>, ApplicationError> {
        if self.directory.find_company(company_id).await?.is_none() {
            return Err(ApplicationError::not_found(EntityKind::Company, company_id));
        }
        let mut rules = self.policies.list_for_company(company_id).await?;
        rules.sort_by_key(|rule| rule.sequence);
        Ok(rules)
    }

    pub async fn save_rule(
        &self,
        ctx: &RequestContext,
        mut rule: PolicyRule,
    ) -> Result<PolicyRule, ApplicationError> {
        self.require_admin(ctx, &rule.company_id, "edit approval rules").await?;
        rule.validate()?;
        rule.updated_at = Utc::now();

        let existing = self.policies.find_by_id(&rule.company_id, &rule.id).await?;
        let change = if existing.is_some() { "updated" } else { "created" };

        self.policies.save(rule.clone()).await?;

        info!(
            event_name = "policy.rule_saved",
            correlation_id = %ctx.correlation_id,
            company_id = %rule.company_id,
            rule_id = %rule.id,
            rule_type = rule.rule_type().as_str(),
            change,
            "policy rule saved"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                &ctx.audit(),
                "policy.rule_saved",
                AuditCategory::Policy,
                AuditOutcome::Success,
            )
            .with_metadata("company_id", rule.company_id.0.clone())
            .with_metadata("rule_id", rule.id.0.clone())
            .with_metadata("rule_type", rule.rule_type().as_str())
            .with_metadata("change", change),
        );

        Ok(rule)
    }

    pub async fn delete_rule(
        &self,
        ctx: &RequestContext,
        company_id: &CompanyId,
        rule_id: &RuleId,
    ) -> Result<(), ApplicationError> {
        self.require_admin(ctx, company_id, "edit approval rules").await?;

        if !self.policies.delete(company_id, rule_id).await? {
            return Err(ApplicationError::not_found(EntityKind::PolicyRule, rule_id));
        }

        info!(
            event_name = "policy.rule_deleted",
            correlation_id = %ctx.correlation_id,
            company_id = %company_id,
            rule_id = %rule_id,
            "policy rule deleted"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                &ctx.audit(),
                "policy.rule_deleted",
                AuditCategory::Policy,
                AuditOutcome::Success,
            )
            .with_metadata("company_id", company_id.0.clone())
            .with_metadata("rule_id", rule_id.0.clone()),
        );

        Ok(())
    }

    async fn decide(
        &self,
        ctx: &RequestContext,
        expense_id: &ExpenseId,
        comment: Option<String>,
        kind: DecisionKind,
    ) -> Result<Expense, ApplicationError> {
        let actor = self.resolve_employee(&ctx.actor_id).await?;

        let guard = self.locks.acquire(expense_id).await;
        let applied = self.decide_locked(ctx, expense_id, &actor, comment, kind).await;
        self.locks.release(expense_id, guard);
        let (expense, outcome) = applied?;

        self.emit_decision_applied(ctx, &expense, kind, &outcome);
        Ok(expense)
    }

    async fn decide_locked(
        &self,
        ctx: &RequestContext,
        expense_id: &ExpenseId,
        actor: &Employee,
        comment: Option<String>,
        kind: DecisionKind,
    ) -> Result<(Expense, DecisionOutcome), ApplicationError> {
        let mut expense = self
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Expense, expense_id))?;

        if self.settings.enforce_approver_eligibility {
            if let Some(step) = expense.active_step() {
                if !step.names_approver(&actor.id) {
                    let action = format!("decide step {} of expense `{}`", step.sequence, expense.id);
                    self.emit_decision_refused(ctx, expense_id, kind, &action);
                    return Err(ApplicationError::unauthorized(&actor.id, action));
                }
            }
        }

        let decision = Decision::new(actor.id.clone(), comment);
        let applied = match kind {
            DecisionKind::Approve => record_approval(&mut expense, decision),
            DecisionKind::Reject => record_rejection(&mut expense, decision),
        };
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(error) => {
                self.emit_decision_refused(ctx, expense_id, kind, &error.to_string());
                return Err(error.into());
            }
        };

        self.expenses.save(expense.clone()).await?;
        Ok((expense, outcome))
    }

    async fn resolve_employee(&self, id: &EmployeeId) -> Result<Employee, ApplicationError> {
        self.directory
            .find_employee(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Employee, id))
    }

    async fn require_admin(
        &self,
        ctx: &RequestContext,
        company_id: &CompanyId,
        action: &str,
    ) -> Result<Employee, ApplicationError> {
        let actor = self.resolve_employee(&ctx.actor_id).await?;
        if !actor.is_admin_of(company_id) {
            warn!(
                event_name = "access.denied",
                correlation_id = %ctx.correlation_id,
                actor_id = %actor.id,
                company_id = %company_id,
                action,
                "administrator capability required"
            );
            return Err(ApplicationError::unauthorized(&actor.id, action));
        }
        if self.directory.find_company(company_id).await?.is_none() {
            return Err(ApplicationError::not_found(EntityKind::Company, company_id));
        }
        Ok(actor)
    }

    fn emit_decision_applied(
        &self,
        ctx: &RequestContext,
        expense: &Expense,
        kind: DecisionKind,
        outcome: &DecisionOutcome,
    ) {
        info!(
            event_name = kind.event_type(),
            correlation_id = %ctx.correlation_id,
            expense_id = %expense.id,
            actor_id = %ctx.actor_id,
            step_sequence = outcome.step_sequence,
            step_completed = outcome.step_completed,
            current_index = outcome.current_index,
            status = outcome.status.as_str(),
            "approval decision applied"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                &ctx.audit(),
                kind.event_type(),
                AuditCategory::Decision,
                AuditOutcome::Success,
            )
            .with_metadata("step_sequence", outcome.step_sequence.to_string())
            .with_metadata("step_completed", outcome.step_completed.to_string())
            .with_metadata("status", outcome.status.as_str()),
        );
    }

    fn emit_decision_refused(
        &self,
        ctx: &RequestContext,
        expense_id: &ExpenseId,
        kind: DecisionKind,
        reason: &str,
    ) {
        warn!(
            event_name = "expense.decision_refused",
            correlation_id = %ctx.correlation_id,
            expense_id = %expense_id,
            actor_id = %ctx.actor_id,
            reason,
            "approval decision refused"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(expense_id.clone()),
                &ctx.audit(),
                kind.event_type(),
                AuditCategory::Decision,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", reason),
        );
    }
}

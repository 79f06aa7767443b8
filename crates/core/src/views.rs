use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::expense::{ConversionStatus, Expense, ExpenseStatus};

/// Expenses currently waiting on `actor_id`, preserving input order.
pub fn pending_queue(expenses: Vec<Expense>, actor_id: &EmployeeId) -> Vec<Expense> {
    expenses
        .into_iter()
        .filter(|expense| expense.status == ExpenseStatus::Pending)
        .filter(|expense| expense.awaits_decision_from(actor_id))
        .collect()
}

/// Status counts shown alongside a company ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub unconverted: usize,
}

pub fn summarize(expenses: &[Expense]) -> LedgerSummary {
    expenses.iter().fold(LedgerSummary::default(), |mut summary, expense| {
        summary.total += 1;
        match expense.status {
            ExpenseStatus::Pending => summary.pending += 1,
            ExpenseStatus::Approved => summary.approved += 1,
            ExpenseStatus::Rejected => summary.rejected += 1,
        }
        if expense.conversion == ConversionStatus::Unconverted {
            summary.unconverted += 1;
        }
        summary
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{pending_queue, summarize};
    use crate::domain::employee::{CompanyId, EmployeeId};
    use crate::domain::expense::{
        ApprovalStep, ConversionStatus, Expense, ExpenseId, ExpenseStatus, RuleStep, StepKind,
        StepStatus,
    };
    use crate::domain::policy::{ApprovalCondition, RuleId};

    fn expense(id: &str, company: &str, submitter: &str, status: ExpenseStatus) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            company_id: CompanyId(company.to_string()),
            submitter_id: EmployeeId(submitter.to_string()),
            amount: Decimal::new(100, 0),
            currency: "USD".to_string(),
            converted_amount: Decimal::new(100, 0),
            base_currency: "USD".to_string(),
            conversion: ConversionStatus::Converted,
            category: "supplies".to_string(),
            description: "Printer paper".to_string(),
            merchant: None,
            expense_date: NaiveDate::from_ymd_opt(2026, 1, 9).expect("valid date"),
            status,
            flow: vec![
                ApprovalStep {
                    sequence: 1,
                    status: StepStatus::Pending,
                    kind: StepKind::Direct { approver_id: EmployeeId("mgr-1".to_string()) },
                },
                ApprovalStep {
                    sequence: 2,
                    status: StepStatus::Pending,
                    kind: StepKind::Rule(RuleStep {
                        rule_id: RuleId("finance".to_string()),
                        rule_name: "Finance".to_string(),
                        approver_ids: vec![
                            EmployeeId("fin-1".to_string()),
                            EmployeeId("fin-2".to_string()),
                        ],
                        condition: ApprovalCondition::Unanimous,
                        approval_count: 0,
                        required_approvals: 2,
                    }),
                },
            ],
            current_index: 0,
            decisions: Vec::new(),
            comments: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn pending_queue_matches_direct_and_rule_approvers_of_active_step() {
        let waiting_on_manager = expense("EXP-1", "acme", "emp-1", ExpenseStatus::Pending);
        let mut waiting_on_finance = expense("EXP-2", "acme", "emp-2", ExpenseStatus::Pending);
        waiting_on_finance.current_index = 1;
        let rejected = expense("EXP-3", "acme", "emp-3", ExpenseStatus::Rejected);

        let expenses = vec![waiting_on_manager, waiting_on_finance, rejected];

        let manager_queue = pending_queue(expenses.clone(), &EmployeeId("mgr-1".to_string()));
        let finance_queue = pending_queue(expenses, &EmployeeId("fin-2".to_string()));

        assert_eq!(manager_queue.iter().map(|e| e.id.0.as_str()).collect::<Vec<_>>(), ["EXP-1"]);
        assert_eq!(finance_queue.iter().map(|e| e.id.0.as_str()).collect::<Vec<_>>(), ["EXP-2"]);
    }

    #[test]
    fn ledger_summary_counts_statuses() {
        let mut unconverted = expense("EXP-4", "acme", "emp-1", ExpenseStatus::Pending);
        unconverted.conversion = ConversionStatus::Unconverted;
        let expenses = vec![
            expense("EXP-1", "acme", "emp-1", ExpenseStatus::Pending),
            expense("EXP-2", "acme", "emp-1", ExpenseStatus::Approved),
            expense("EXP-3", "acme", "emp-2", ExpenseStatus::Rejected),
            unconverted,
        ];

        let summary = summarize(&expenses);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.unconverted, 1);
    }
}

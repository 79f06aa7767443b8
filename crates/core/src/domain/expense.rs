use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::{CompanyId, EmployeeId};
use crate::domain::policy::{ApprovalCondition, RuleId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Converted,
    Unconverted,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Unconverted => "unconverted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "converted" => Some(Self::Converted),
            "unconverted" => Some(Self::Unconverted),
            _ => None,
        }
    }
}

/// Snapshot of a policy rule taken when the expense was submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStep {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub approver_ids: Vec<EmployeeId>,
    pub condition: ApprovalCondition,
    pub approval_count: u32,
    pub required_approvals: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Direct { approver_id: EmployeeId },
    Rule(RuleStep),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub sequence: u32,
    pub status: StepStatus,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl ApprovalStep {
    pub fn names_approver(&self, actor_id: &EmployeeId) -> bool {
        match &self.kind {
            StepKind::Direct { approver_id } => approver_id == actor_id,
            StepKind::Rule(rule) => rule.approver_ids.iter().any(|id| id == actor_id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub actor_id: EmployeeId,
    pub action: DecisionAction,
    pub comment: Option<String>,
    pub step_sequence: u32,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseComment {
    pub author_id: EmployeeId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub company_id: CompanyId,
    pub submitter_id: EmployeeId,
    pub amount: Decimal,
    pub currency: String,
    pub converted_amount: Decimal,
    pub base_currency: String,
    pub conversion: ConversionStatus,
    pub category: String,
    pub description: String,
    pub merchant: Option<String>,
    pub expense_date: NaiveDate,
    pub status: ExpenseStatus,
    pub flow: Vec<ApprovalStep>,
    pub current_index: usize,
    pub decisions: Vec<ApprovalDecision>,
    pub comments: Vec<ExpenseComment>,
    pub submitted_at: DateTime<Utc>,
}

impl Expense {
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        if self.status.is_terminal() {
            return None;
        }
        self.flow.get(self.current_index)
    }

    pub fn active_step_mut(&mut self) -> Option<&mut ApprovalStep> {
        if self.status.is_terminal() {
            return None;
        }
        self.flow.get_mut(self.current_index)
    }

    pub fn is_flow_complete(&self) -> bool {
        self.current_index == self.flow.len()
    }

    /// Whether the active step is waiting on this actor.
    pub fn awaits_decision_from(&self, actor_id: &EmployeeId) -> bool {
        self.active_step().map(|step| step.names_approver(actor_id)).unwrap_or(false)
    }
}

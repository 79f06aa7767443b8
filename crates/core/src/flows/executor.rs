use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::expense::{
    ApprovalDecision, DecisionAction, Expense, ExpenseComment, ExpenseStatus, StepKind, StepStatus,
};
use crate::errors::DomainError;
use crate::flows::conditions::is_satisfied;

/// A single approve or reject event against one expense.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub actor_id: EmployeeId,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(actor_id: EmployeeId, comment: Option<String>) -> Self {
        let comment = comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        Self { actor_id, comment, decided_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub step_sequence: u32,
    pub step_completed: bool,
    pub current_index: usize,
    pub status: ExpenseStatus,
}

/// Records an approval and advances the flow when the active step is satisfied.
pub fn record_approval(
    expense: &mut Expense,
    decision: Decision,
) -> Result<DecisionOutcome, DomainError> {
    let step_sequence = pending_step_sequence(expense)?;

    expense.decisions.push(ApprovalDecision {
        actor_id: decision.actor_id.clone(),
        action: DecisionAction::Approved,
        comment: decision.comment.clone(),
        step_sequence,
        decided_at: decision.decided_at,
    });

    let step_completed = match expense.active_step_mut() {
        Some(step) => {
            let satisfied = match &mut step.kind {
                StepKind::Direct { .. } => true,
                StepKind::Rule(rule) => {
                    rule.approval_count = rule.approval_count.saturating_add(1);
                    is_satisfied(rule, &decision.actor_id)
                }
            };
            if satisfied {
                step.status = StepStatus::Approved;
            }
            satisfied
        }
        None => false,
    };

    if step_completed {
        expense.current_index += 1;
    }
    if expense.is_flow_complete() {
        expense.status = ExpenseStatus::Approved;
    }

    append_comment(expense, &decision);

    Ok(DecisionOutcome {
        step_sequence,
        step_completed,
        current_index: expense.current_index,
        status: expense.status,
    })
}

/// Rejects the expense outright; earlier approvals on the active step carry no weight.
pub fn record_rejection(
    expense: &mut Expense,
    decision: Decision,
) -> Result<DecisionOutcome, DomainError> {
    let step_sequence = pending_step_sequence(expense)?;

    expense.decisions.push(ApprovalDecision {
        actor_id: decision.actor_id.clone(),
        action: DecisionAction::Rejected,
        comment: decision.comment.clone(),
        step_sequence,
        decided_at: decision.decided_at,
    });

    if let Some(step) = expense.active_step_mut() {
        step.status = StepStatus::Rejected;
    }
    expense.status = ExpenseStatus::Rejected;

    append_comment(expense, &decision);

    Ok(DecisionOutcome {
        step_sequence,
        step_completed: false,
        current_index: expense.current_index,
        status: expense.status,
    })
}

fn pending_step_sequence(expense: &Expense) -> Result<u32, DomainError> {
    expense
        .active_step()
        .map(|step| step.sequence)
        .ok_or_else(|| DomainError::NoPendingStep { expense_id: expense.id.clone() })
}

fn append_comment(expense: &mut Expense, decision: &Decision) {
    if let Some(body) = &decision.comment {
        expense.comments.push(ExpenseComment {
            author_id: decision.actor_id.clone(),
            body: body.clone(),
            created_at: decision.decided_at,
        });
    }
}

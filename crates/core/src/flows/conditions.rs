use rust_decimal::Decimal;

use crate::domain::employee::EmployeeId;
use crate::domain::expense::RuleStep;
use crate::domain::policy::ApprovalCondition;

/// Evaluates a rule step after its counter already includes `actor_id`'s approval.
pub fn is_satisfied(step: &RuleStep, actor_id: &EmployeeId) -> bool {
    let approver_count = step.approver_ids.len();
    match &step.condition {
        ApprovalCondition::Unanimous => step.approval_count as usize >= approver_count,
        ApprovalCondition::Percentage { threshold } => {
            percentage_met(step.approval_count, approver_count, *threshold)
        }
        ApprovalCondition::Designated { approver_id } => approver_id == actor_id,
        ApprovalCondition::Hybrid { threshold, approver_id } => {
            approver_id == actor_id
                || percentage_met(step.approval_count, approver_count, *threshold)
        }
    }
}

// count / approvers * 100 >= threshold, cross-multiplied so zero approvers cannot divide.
fn percentage_met(approval_count: u32, approver_count: usize, threshold: Decimal) -> bool {
    let approver_count = Decimal::from(u64::try_from(approver_count).unwrap_or(u64::MAX));
    Decimal::from(approval_count) * Decimal::ONE_HUNDRED >= threshold * approver_count
}

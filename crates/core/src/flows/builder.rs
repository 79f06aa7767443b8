use crate::domain::employee::Employee;
use crate::domain::expense::{ApprovalStep, RuleStep, StepKind, StepStatus};
use crate::domain::policy::PolicyRule;

/// Builds the ordered approval steps for a new expense.
///
/// `manager` is the resolved record for `submitter.manager_id`; when it is missing the
/// manager step is skipped rather than failing the submission. Rules are ordered by their
/// configured sequence with ties kept in the order the store returned them.
pub fn build_flow(
    submitter: &Employee,
    manager: Option<&Employee>,
    company_rules: &[PolicyRule],
) -> Vec<ApprovalStep> {
    let mut steps = Vec::with_capacity(company_rules.len() + 1);

    let manager_step = submitter
        .approving_manager_id()
        .and_then(|manager_id| manager.filter(|manager| &manager.id == manager_id));
    if let Some(manager) = manager_step {
        steps.push(ApprovalStep {
            sequence: 1,
            status: StepStatus::Pending,
            kind: StepKind::Direct { approver_id: manager.id.clone() },
        });
    }

    let mut ordered: Vec<&PolicyRule> = company_rules.iter().collect();
    ordered.sort_by_key(|rule| rule.sequence);

    for rule in ordered {
        let sequence = next_sequence(&steps);
        steps.push(ApprovalStep {
            sequence,
            status: StepStatus::Pending,
            kind: StepKind::Rule(RuleStep {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                approver_ids: rule.approver_ids.clone(),
                condition: rule.condition.clone(),
                approval_count: 0,
                required_approvals: rule.required_approvals(),
            }),
        });
    }

    steps
}

fn next_sequence(steps: &[ApprovalStep]) -> u32 {
    u32::try_from(steps.len()).unwrap_or(u32::MAX).saturating_add(1)
}

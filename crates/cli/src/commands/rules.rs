use std::sync::Arc;

use reimburse_core::currency::IdentityConverter;
use reimburse_core::domain::employee::CompanyId;
use reimburse_core::domain::policy::PolicyRule;
use reimburse_core::engine::ApprovalEngine;
use reimburse_core::errors::ApplicationError;
use reimburse_db::repositories::{SqlEmployeeDirectory, SqlExpenseRepository, SqlPolicyRepository};

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run(company: &str) -> CommandResult {
    let company_id = CompanyId(company.trim().to_string());

    let result = with_migrated_pool("rules", |pool| async move {
        let engine = ApprovalEngine::new(
            Arc::new(SqlExpenseRepository::new(pool.clone())),
            Arc::new(SqlPolicyRepository::new(pool.clone())),
            Arc::new(SqlEmployeeDirectory::new(pool.clone())),
            Arc::new(IdentityConverter),
        );
        let rules = engine.list_rules(&company_id).await.map_err(|error| match error {
            ApplicationError::NotFound { .. } => ("not_found", error.to_string(), 7u8),
            other => ("persistence", other.to_string(), 6u8),
        })?;
        Ok((company_id, rules))
    });

    match result {
        Ok((company_id, rules)) => CommandResult::success("rules", render(&company_id, &rules)),
        Err(failure) => failure,
    }
}

fn render(company_id: &CompanyId, rules: &[PolicyRule]) -> String {
    if rules.is_empty() {
        return format!("company `{company_id}` has no approval rules");
    }

    let mut lines = vec![format!("approval rules for `{company_id}` in flow order:")];
    lines.extend(rules.iter().map(|rule| {
        let designated = rule
            .condition
            .designated_approver()
            .map(|id| format!(", designated {id}"))
            .unwrap_or_default();
        format!(
            "  - {} {} ({}, {} approvers, {} required{designated})",
            rule.sequence,
            rule.id,
            rule.rule_type().as_str(),
            rule.approver_ids.len(),
            rule.required_approvals(),
        )
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use reimburse_core::domain::employee::{CompanyId, EmployeeId};
    use reimburse_core::domain::policy::{ApprovalCondition, PolicyRule, RuleId};

    use super::render;

    #[test]
    fn render_describes_each_rule() {
        let rule = PolicyRule {
            id: RuleId("finance-review".to_string()),
            company_id: CompanyId("acme".to_string()),
            name: "Finance review".to_string(),
            sequence: 1,
            approver_ids: vec![
                EmployeeId("fin-1".to_string()),
                EmployeeId("fin-2".to_string()),
                EmployeeId("fin-3".to_string()),
            ],
            condition: ApprovalCondition::Percentage { threshold: Decimal::new(60, 0) },
            updated_at: Utc::now(),
        };

        let rendered = render(&CompanyId("acme".to_string()), &[rule]);

        assert!(rendered.contains("  - 1 finance-review (percentage, 3 approvers, 2 required)"));
    }

    #[test]
    fn render_reports_empty_policy() {
        assert_eq!(
            render(&CompanyId("acme".to_string()), &[]),
            "company `acme` has no approval rules"
        );
    }
}

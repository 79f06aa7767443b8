use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::{CompanyId, EmployeeId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Unanimous,
    Percentage,
    Designated,
    Hybrid,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanimous => "unanimous",
            Self::Percentage => "percentage",
            Self::Designated => "designated",
            Self::Hybrid => "hybrid",
        }
    }
}

/// When a rule step has gathered enough approvals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalCondition {
    Unanimous,
    Percentage { threshold: Decimal },
    Designated { approver_id: EmployeeId },
    Hybrid { threshold: Decimal, approver_id: EmployeeId },
}

impl ApprovalCondition {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Unanimous => RuleType::Unanimous,
            Self::Percentage { .. } => RuleType::Percentage,
            Self::Designated { .. } => RuleType::Designated,
            Self::Hybrid { .. } => RuleType::Hybrid,
        }
    }

    pub fn threshold(&self) -> Option<Decimal> {
        match self {
            Self::Percentage { threshold } | Self::Hybrid { threshold, .. } => Some(*threshold),
            Self::Unanimous | Self::Designated { .. } => None,
        }
    }

    pub fn designated_approver(&self) -> Option<&EmployeeId> {
        match self {
            Self::Designated { approver_id } | Self::Hybrid { approver_id, .. } => Some(approver_id),
            Self::Unanimous | Self::Percentage { .. } => None,
        }
    }

    /// Approvals needed before the count alone satisfies the step.
    pub fn required_approvals(&self, approver_count: usize) -> u32 {
        let approver_count = u32::try_from(approver_count).unwrap_or(u32::MAX);
        match self.threshold() {
            Some(threshold) => (Decimal::from(approver_count) * threshold / Decimal::ONE_HUNDRED)
                .ceil()
                .to_u32()
                .unwrap_or(approver_count),
            None => approver_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: RuleId,
    pub company_id: CompanyId,
    pub name: String,
    pub sequence: i32,
    pub approver_ids: Vec<EmployeeId>,
    pub condition: ApprovalCondition,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRule {
    pub fn rule_type(&self) -> RuleType {
        self.condition.rule_type()
    }

    pub fn required_approvals(&self) -> u32 {
        self.condition.required_approvals(self.approver_ids.len())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvalidRule("rule id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidRule(format!("rule `{}` must have a name", self.id)));
        }
        if self.approver_ids.is_empty() {
            return Err(DomainError::InvalidRule(format!(
                "rule `{}` must list at least one approver",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.approver_ids.iter().find(|id| !seen.insert(*id)) {
            return Err(DomainError::InvalidRule(format!(
                "rule `{}` lists approver `{duplicate}` more than once",
                self.id
            )));
        }

        if let Some(threshold) = self.condition.threshold() {
            if threshold <= Decimal::ZERO || threshold > Decimal::ONE_HUNDRED {
                return Err(DomainError::InvalidRule(format!(
                    "rule `{}` percentage threshold {threshold} must be in range (0, 100]",
                    self.id
                )));
            }
        }

        if let Some(approver_id) = self.condition.designated_approver() {
            if approver_id.0.trim().is_empty() {
                return Err(DomainError::InvalidRule(format!(
                    "rule `{}` designated approver must not be empty",
                    self.id
                )));
            }
            if !self.approver_ids.contains(approver_id) {
                return Err(DomainError::InvalidRule(format!(
                    "rule `{}` designated approver `{approver_id}` must be one of its approvers",
                    self.id
                )));
            }
        }

        Ok(())
    }
}

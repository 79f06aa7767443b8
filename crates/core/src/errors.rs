use std::fmt;

use thiserror::Error;

use crate::domain::expense::ExpenseId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("expense `{expense_id}` has no pending approval step")]
    NoPendingStep { expense_id: ExpenseId },
    #[error("invalid policy rule: {0}")]
    InvalidRule(String),
    #[error("invalid expense: {0}")]
    InvalidExpense(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Expense,
    Employee,
    Company,
    PolicyRule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expense => "expense",
            Self::Employee => "employee",
            Self::Company => "company",
            Self::PolicyRule => "policy rule",
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("actor `{actor}` is not allowed to {action}")]
    Unauthorized { actor: String, action: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),
}

impl ApplicationError {
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn unauthorized(actor: impl fmt::Display, action: impl Into<String>) -> Self {
        Self::Unauthorized { actor: actor.to_string(), action: action.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => "The expense is no longer awaiting a decision.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::NoPendingStep { .. }) => {
                Self::Conflict { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::InvalidRule(_))
            | ApplicationError::Domain(DomainError::InvalidExpense(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::NotFound { .. } => Self::NotFound { message, correlation_id },
            ApplicationError::Unauthorized { .. } => Self::Forbidden { message, correlation_id },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::CorruptRecord(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::expense::ExpenseId;
    use crate::errors::{ApplicationError, DomainError, EntityKind, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn invalid_rule_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::InvalidRule("missing approvers".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn no_pending_step_maps_to_conflict() {
        let interface = ApplicationError::from(DomainError::NoPendingStep {
            expense_id: ExpenseId("EXP-9".to_owned()),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { ref message, .. } if message.contains("EXP-9")));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn not_found_and_unauthorized_keep_their_meaning() {
        let missing = ApplicationError::not_found(EntityKind::Employee, "emp-404");
        assert_eq!(missing.to_string(), "employee `emp-404` not found");
        assert!(matches!(missing.into_interface("req-3"), InterfaceError::NotFound { .. }));

        let denied = ApplicationError::unauthorized("emp-7", "edit approval rules");
        assert_eq!(denied.to_string(), "actor `emp-7` is not allowed to edit approval rules");
        assert!(matches!(denied.into_interface("req-4"), InterfaceError::Forbidden { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(StoreError::Backend("database lock timeout".to_owned()))
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn undecodable_record_maps_to_internal() {
        let interface = ApplicationError::from(StoreError::Decode("bad flow_json".to_owned()))
            .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}

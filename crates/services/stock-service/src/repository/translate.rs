//! Persistence failure translation.

use common::InfrastructureError;
use domain::DomainError;

/// Turn a persistence failure into its domain meaning.
///
/// `entity` names the aggregate being accessed (e.g. `"Stock"`).
pub fn translate(entity: &str, err: InfrastructureError) -> DomainError {
    match err {
        InfrastructureError::ConstraintViolation { key, .. } => {
            DomainError::conflict(format!("{entity} {key}"))
        }
        InfrastructureError::RowNotFound { key, .. } => {
            DomainError::not_found(format!("{entity} {key}"))
        }
        InfrastructureError::TransactionClosed(tx) => {
            DomainError::invalid_state(format!("transaction {tx} is no longer open"))
        }
        other => {
            tracing::warn!(entity, error = %other, "persistence failure");
            DomainError::internal(format!("{entity} storage failed: {other}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_becomes_conflict() {
        let err = translate(
            "Stock",
            InfrastructureError::ConstraintViolation {
                table: "stocks".into(),
                key: "AAPL".into(),
            },
        );
        assert_eq!(err, DomainError::conflict("Stock AAPL"));
        assert_eq!(err.to_string(), "Stock AAPL already exists");
    }

    #[test]
    fn test_missing_row_becomes_not_found() {
        let err = translate(
            "Portfolio",
            InfrastructureError::RowNotFound {
                table: "portfolios".into(),
                key: "p-1".into(),
            },
        );
        assert_eq!(err, DomainError::not_found("Portfolio p-1"));
    }

    #[test]
    fn test_other_failures_are_internal() {
        let err = translate("Stock", InfrastructureError::Unavailable("timeout".into()));
        assert!(matches!(err, DomainError::Internal(_)));
    }
}

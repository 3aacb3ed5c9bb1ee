//! Reconciliation of failed bulk operations.
//!
//! Bulk endpoints do not report per-id results, so a failed batch cannot be
//! split into applied and rejected ids. [`BulkFailurePolicy`] decides what
//! the assigned set should look like after such a failure.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Direction of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkDirection {
    Add,
    Remove,
}

/// What to do with the targeted ids after a failed bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Apply every targeted id as if the request had succeeded.
    AssumeApplied,
    /// Leave the assigned set unchanged.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFailurePolicy {
    /// A 409 on bulk add means some or all ids were already assigned; a 404
    /// on bulk remove means some or all were already absent. Either way the
    /// whole batch is treated as applied.
    #[default]
    ConflictImpliesAlreadyApplied,
    /// Every failure leaves the assigned set unchanged.
    Strict,
}

impl BulkFailurePolicy {
    pub fn reconcile(&self, direction: BulkDirection, error: &TransportError) -> Reconciliation {
        match self {
            Self::Strict => Reconciliation::Unchanged,
            Self::ConflictImpliesAlreadyApplied => {
                let already_applied = match direction {
                    BulkDirection::Add => error.is_conflict(),
                    BulkDirection::Remove => error.is_not_found(),
                };
                if already_applied {
                    Reconciliation::AssumeApplied
                } else {
                    Reconciliation::Unchanged
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> TransportError {
        TransportError::from_status(code, String::new())
    }

    #[test]
    fn test_conflict_on_add_is_applied() {
        let policy = BulkFailurePolicy::ConflictImpliesAlreadyApplied;
        assert_eq!(
            policy.reconcile(BulkDirection::Add, &status(409)),
            Reconciliation::AssumeApplied
        );
        assert_eq!(
            policy.reconcile(BulkDirection::Add, &status(404)),
            Reconciliation::Unchanged
        );
    }

    #[test]
    fn test_not_found_on_remove_is_applied() {
        let policy = BulkFailurePolicy::default();
        assert_eq!(
            policy.reconcile(BulkDirection::Remove, &status(404)),
            Reconciliation::AssumeApplied
        );
        assert_eq!(
            policy.reconcile(BulkDirection::Remove, &status(409)),
            Reconciliation::Unchanged
        );
        assert_eq!(
            policy.reconcile(BulkDirection::Remove, &status(500)),
            Reconciliation::Unchanged
        );
    }

    #[test]
    fn test_strict_never_applies() {
        let policy = BulkFailurePolicy::Strict;
        assert_eq!(
            policy.reconcile(BulkDirection::Add, &status(409)),
            Reconciliation::Unchanged
        );
        assert_eq!(
            policy.reconcile(BulkDirection::Remove, &status(404)),
            Reconciliation::Unchanged
        );
    }

    #[test]
    fn test_policy_parses_from_config_names() {
        let policy: BulkFailurePolicy =
            serde_json::from_str(r#""conflict_implies_already_applied""#).unwrap();
        assert_eq!(policy, BulkFailurePolicy::ConflictImpliesAlreadyApplied);
        let policy: BulkFailurePolicy = serde_json::from_str(r#""strict""#).unwrap();
        assert_eq!(policy, BulkFailurePolicy::Strict);
    }
}

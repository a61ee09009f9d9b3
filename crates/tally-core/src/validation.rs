//! Homogeneity checks run before any group or statement mutation.
//!
//! Every function here is pure: it inspects the slice it is given and
//! never touches the store.

use tally_domain::{Activity, Transaction, TransactionKind};

use crate::{CoreError, CoreResult};

/// Returns the single kind shared by `transactions`, or `None` when empty.
pub fn same_kind(transactions: &[&Transaction]) -> CoreResult<Option<TransactionKind>> {
    let mut iter = transactions.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    match iter.find(|txn| txn.kind != first.kind) {
        Some(other) => Err(CoreError::KindMismatch {
            expected: first.kind,
            found: other.kind,
        }),
        None => Ok(Some(first.kind)),
    }
}

/// Returns the single activity shared by `transactions`, or `None` when empty.
pub fn same_activity(transactions: &[&Transaction]) -> CoreResult<Option<Activity>> {
    let mut iter = transactions.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    match iter.find(|txn| txn.activity != first.activity) {
        Some(other) => Err(CoreError::ActivityMismatch {
            expected: first.activity,
            found: other.activity,
        }),
        None => Ok(Some(first.activity)),
    }
}

/// Signed sum of the amounts. Non-finite or negative magnitudes are rejected.
pub fn sum_amounts(transactions: &[&Transaction]) -> CoreResult<f64> {
    transactions.iter().try_fold(0.0, |total, txn| {
        ensure_amount(txn.amount)?;
        Ok(total + txn.signed_amount())
    })
}

/// Validates a stored magnitude.
pub fn ensure_amount(amount: f64) -> CoreResult<()> {
    if !amount.is_finite() {
        return Err(CoreError::InvalidAmount(format!(
            "amount `{amount}` is not a finite number"
        )));
    }
    if amount < 0.0 {
        return Err(CoreError::InvalidAmount(format!(
            "amount `{amount}` must be stored as a magnitude"
        )));
    }
    Ok(())
}

/// Checks kind first, then activity, and returns the shared pair.
pub fn ensure_homogeneous(
    transactions: &[&Transaction],
) -> CoreResult<Option<(TransactionKind, Activity)>> {
    let kind = same_kind(transactions)?;
    let activity = same_activity(transactions)?;
    Ok(kind.zip(activity))
}

/// Checks that `selected` can join a group whose members are `existing`.
///
/// A group without members accepts any classification.
pub fn ensure_compatible(existing: &[&Transaction], selected: &[&Transaction]) -> CoreResult<()> {
    if existing.is_empty() || selected.is_empty() {
        return Ok(());
    }
    let combined: Vec<&Transaction> = existing.iter().chain(selected.iter()).copied().collect();
    ensure_homogeneous(&combined).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn txn(amount: f64, kind: TransactionKind, activity: Activity) -> Transaction {
        Transaction::new(
            Uuid::nil(),
            amount,
            kind,
            activity,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
    }

    #[test]
    fn empty_input_is_accepted() {
        assert_eq!(same_kind(&[]).unwrap(), None);
        assert_eq!(same_activity(&[]).unwrap(), None);
        assert_eq!(sum_amounts(&[]).unwrap(), 0.0);
    }

    #[test]
    fn mixed_kinds_are_rejected() {
        let a = txn(10.0, TransactionKind::Expense, Activity::Operating);
        let b = txn(5.0, TransactionKind::Income, Activity::Operating);
        let err = same_kind(&[&a, &b]).expect_err("mixed kinds");
        assert!(matches!(
            err,
            CoreError::KindMismatch {
                expected: TransactionKind::Expense,
                found: TransactionKind::Income
            }
        ));
    }

    #[test]
    fn mixed_activities_are_rejected() {
        let a = txn(10.0, TransactionKind::Expense, Activity::Operating);
        let b = txn(5.0, TransactionKind::Expense, Activity::Financing);
        let err = ensure_homogeneous(&[&a, &b]).expect_err("mixed activity");
        assert!(matches!(err, CoreError::ActivityMismatch { .. }));
    }

    #[test]
    fn sum_uses_signed_amounts() {
        let a = txn(100.0, TransactionKind::Expense, Activity::Operating);
        let b = txn(50.0, TransactionKind::Expense, Activity::Operating);
        assert_eq!(sum_amounts(&[&a, &b]).unwrap(), -150.0);
    }

    #[test]
    fn sum_rejects_non_finite_amounts() {
        let a = txn(f64::NAN, TransactionKind::Income, Activity::Investing);
        let err = sum_amounts(&[&a]).expect_err("nan");
        assert!(matches!(err, CoreError::InvalidAmount(_)));
    }

    #[test]
    fn compatible_skips_empty_parent() {
        let a = txn(10.0, TransactionKind::Income, Activity::Investing);
        ensure_compatible(&[], &[&a]).expect("empty parent accepts anything");

        let existing = txn(1.0, TransactionKind::Expense, Activity::Investing);
        let err = ensure_compatible(&[&existing], &[&a]).expect_err("kind differs");
        assert!(matches!(err, CoreError::KindMismatch { .. }));
    }
}

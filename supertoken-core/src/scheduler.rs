use crate::address::Address;
use crate::transaction::{AccessIntent, ConflictResult, Transaction};
use std::collections::HashSet;

/// Trait for transaction conflict checking
pub trait ConflictChecker {
    /// Check for potential conflicts with pending transactions
    ///
    /// # Parameters
    /// * `transaction` - The transaction to check for conflicts
    /// * `pending` - Transactions queued ahead of it
    ///
    /// # Returns
    /// A ConflictResult indicating whether conflicts were detected
    fn check_conflicts(&self, transaction: &Transaction, pending: &[Transaction]) -> ConflictResult;

    /// Check if a transaction is read-only
    fn is_read_only(&self, transaction: &Transaction) -> bool {
        transaction
            .call
            .object_intents()
            .iter()
            .all(|(_, intent)| *intent == AccessIntent::Read)
    }

    /// Extract contract addresses with write intent from a transaction
    fn extract_write_objects(&self, transaction: &Transaction) -> HashSet<Address> {
        transaction
            .call
            .object_intents()
            .into_iter()
            .filter(|(_, intent)| *intent == AccessIntent::Write)
            .map(|(address, _)| address)
            .collect()
    }
}

/// Reports pending transactions that write a contract this one also writes
#[derive(Debug, Default)]
pub struct BasicConflictChecker;

impl BasicConflictChecker {
    pub fn new() -> Self {
        Self
    }
}

impl ConflictChecker for BasicConflictChecker {
    fn check_conflicts(&self, transaction: &Transaction, pending: &[Transaction]) -> ConflictResult {
        let write_objects = self.extract_write_objects(transaction);

        // Deployments touch no existing contract
        if write_objects.is_empty() {
            return ConflictResult::ReadOnly;
        }

        let conflicts: Vec<_> = pending
            .iter()
            .filter(|other| other.hash != transaction.hash)
            .filter(|other| {
                other.call.object_intents().iter().any(|(address, intent)| {
                    *intent == AccessIntent::Write && write_objects.contains(address)
                })
            })
            .map(|other| other.hash)
            .collect();

        if conflicts.is_empty() {
            ConflictResult::NoConflict
        } else {
            ConflictResult::Conflict(conflicts)
        }
    }
}

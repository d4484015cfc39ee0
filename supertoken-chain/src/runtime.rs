use supertoken_core::{
    Address, Call, ChainError, ConflictResult, ProxyLifecycle, TokenInfo, Transaction,
    TransactionHash, TransactionReceipt,
};

/// A chain that executes super token transactions.
///
/// Implementations serialize transactions globally; the receipt of a
/// rejected call carries the contract's error instead of an `Err`, which is
/// reserved for infrastructure failures.
pub trait Runtime {
    /// Chain id used to look up per-network configuration
    fn chain_id(&self) -> u64;

    /// The nonce the next transaction of `sender` must carry
    fn next_nonce(&self, sender: &Address) -> u64;

    /// Check for potential conflicts with pending transactions
    ///
    /// # Parameters
    /// * `transaction` - The transaction to check for conflicts
    ///
    /// # Returns
    /// A ConflictResult indicating whether conflicts were detected
    fn check_conflicts(&self, _transaction: &Transaction) -> ConflictResult {
        ConflictResult::NoConflict
    }

    /// Execute a transaction and wait until it is mined
    fn execute_transaction(&mut self, transaction: Transaction) -> Result<TransactionReceipt, ChainError>;

    /// Build a transaction with the sender's next nonce and execute it
    fn send(&mut self, sender: Address, call: Call) -> Result<TransactionReceipt, ChainError> {
        let nonce = self.next_nonce(&sender);
        self.execute_transaction(Transaction::new(sender, nonce, call))
    }

    /// Get a transaction by hash, pending or mined
    fn get_transaction(&self, hash: &TransactionHash) -> Option<Transaction>;

    /// Get the receipt of a mined transaction
    fn get_transaction_receipt(&self, hash: &TransactionHash) -> Option<TransactionReceipt>;

    /// Receipts of transactions that touched `address`, most recent first
    fn receipts_for_contract(&self, address: &Address) -> Vec<TransactionReceipt>;

    /// Ask the host where the super token factory lives
    fn super_token_factory(&self) -> Option<Address>;

    fn proxy_lifecycle(&self, proxy: &Address) -> Option<ProxyLifecycle>;

    fn token_info(&self, proxy: &Address) -> Option<TokenInfo>;
}

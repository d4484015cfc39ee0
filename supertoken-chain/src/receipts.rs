use std::collections::{BTreeMap, HashMap};
use supertoken_core::{Address, BlockNumber, TransactionHash, TransactionReceipt};

/// In-memory receipt storage indexed by transaction hash, by the contracts a
/// transaction touched and by block
#[derive(Debug, Clone, Default)]
pub struct ReceiptStore {
    // Receipts in execution order
    receipts: Vec<TransactionReceipt>,

    // Mapping from transaction hash to position in `receipts`
    by_hash: HashMap<TransactionHash, usize>,

    // Mapping from contract address to the positions of receipts that touched it
    by_contract: HashMap<Address, Vec<usize>>,

    // Mapping from block to the positions of receipts mined in it
    by_block: BTreeMap<BlockNumber, Vec<usize>>,
}

impl ReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a receipt, indexing it under every contract in `touched`
    pub fn store(&mut self, receipt: TransactionReceipt, touched: &[Address]) {
        let position = self.receipts.len();
        self.by_hash.insert(receipt.transaction_hash, position);
        for address in touched {
            let positions = self.by_contract.entry(*address).or_default();
            if positions.last() != Some(&position) {
                positions.push(position);
            }
        }
        self.by_block
            .entry(receipt.block_number)
            .or_default()
            .push(position);
        self.receipts.push(receipt);
    }

    pub fn get(&self, hash: &TransactionHash) -> Option<&TransactionReceipt> {
        self.by_hash.get(hash).map(|position| &self.receipts[*position])
    }

    /// Receipts of transactions that touched `address`, most recent first
    pub fn receipts_for_contract(&self, address: &Address) -> Vec<&TransactionReceipt> {
        self.by_contract
            .get(address)
            .map(|positions| {
                positions
                    .iter()
                    .rev()
                    .map(|position| &self.receipts[*position])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Receipts mined in `block`, in execution order
    pub fn receipts_in_block(&self, block: BlockNumber) -> Vec<&TransactionReceipt> {
        self.by_block
            .get(&block)
            .map(|positions| positions.iter().map(|position| &self.receipts[*position]).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionReceipt> {
        self.receipts.iter()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

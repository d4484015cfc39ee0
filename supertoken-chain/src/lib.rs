pub mod agreements;
pub mod chain;
pub mod deployer;
pub mod framework;
pub mod journal;
pub mod receipts;
pub mod runtime;

// Re-export the main types for convenience
pub use agreements::{
    ConstantFlowAgreement, FlowData, IndexData, InstantDistributionAgreement, SubscriptionData,
};
pub use chain::{ChainConfig, ChainState, LocalChain, MULTI_MINT_INDEX};
pub use deployer::PureSuperTokenDeployer;
pub use framework::{Framework, Host, SuperTokenFactory};
pub use journal::{FileJournal, JournalEntry, MemoryJournal, TransactionJournal};
pub use receipts::ReceiptStore;
pub use runtime::Runtime;

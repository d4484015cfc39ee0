pub mod address;
pub mod error;
pub mod scheduler;
pub mod token;
pub mod transaction;

// Re-export the main types for convenience
pub use address::{packed_salt, Address, AddressParseError};
pub use error::{ChainError, TokenError};
pub use scheduler::{BasicConflictChecker, ConflictChecker};
pub use token::{
    to_wad, Amount, CtorParams, FlowRate, InitParams, ProxyLifecycle, SuperTokenState, Timestamp,
    TokenInfo, TokenKind, TokenMetadata, VariantInit, VariantState, WAD,
};
pub use transaction::{
    AccessIntent, BlockNumber, Call, CommitmentLevel, ConflictResult, Event, FlowOp, IdaOp,
    TokenOp, Transaction, TransactionHash, TransactionReceipt,
};

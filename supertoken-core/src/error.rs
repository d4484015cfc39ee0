use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Reasons a contract call is rejected.
///
/// These are carried inside failed transaction receipts, so they must stay
/// serializable and comparable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenError {
    #[error("proxy {0} is not registered with a super token factory")]
    NotRegistered(Address),

    #[error("proxy {0} is already registered with a super token factory")]
    AlreadyRegistered(Address),

    #[error("proxy {0} is not initialized")]
    NotInitialized(Address),

    #[error("Initializable: contract {0} is already initialized")]
    AlreadyInitialized(Address),

    #[error("proxy registered with factory {registered}, initialize named {given}")]
    FactoryMismatch { registered: Address, given: Address },

    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: Address, action: String },

    #[error("insufficient balance: {account} holds {balance}, needs {needed}")]
    InsufficientBalance {
        account: Address,
        balance: i128,
        needed: u128,
    },

    #[error("supply cap exceeded: cap {cap}, requested total {requested}")]
    SupplyCapExceeded { cap: u128, requested: u128 },

    #[error("mint interval not elapsed, next mint at {next}")]
    MintIntervalNotElapsed { next: u64 },

    #[error("flow from {sender} to {receiver} already exists")]
    FlowExists { sender: Address, receiver: Address },

    #[error("flow from {sender} to {receiver} does not exist")]
    FlowNotFound { sender: Address, receiver: Address },

    #[error("invalid flow: {0}")]
    InvalidFlow(String),

    #[error("index {index_id} of publisher {publisher} already exists")]
    IndexExists { publisher: Address, index_id: u32 },

    #[error("index {index_id} of publisher {publisher} does not exist")]
    IndexNotFound { publisher: Address, index_id: u32 },

    #[error("subscription of {subscriber} to index {index_id} does not exist")]
    SubscriptionNotFound { subscriber: Address, index_id: u32 },

    #[error("index {index_id} has no units issued")]
    NoUnitsIssued { index_id: u32 },

    #[error("no contract at {0}")]
    UnknownContract(Address),

    #[error("contract already exists at {0}")]
    AddressCollision(Address),

    #[error("super token framework is not deployed")]
    FrameworkMissing,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} does not support {operation}")]
    UnsupportedOperation { kind: String, operation: String },

    #[error("arithmetic overflow in {0}")]
    Overflow(String),
}

impl TokenError {
    pub fn unauthorized(caller: Address, action: &str) -> Self {
        TokenError::Unauthorized {
            caller,
            action: action.to_string(),
        }
    }

    pub fn unsupported(kind: impl ToString, operation: &str) -> Self {
        TokenError::UnsupportedOperation {
            kind: kind.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Infrastructure errors of a chain backend, as opposed to contract rejections
#[derive(Error, Debug)]
pub enum ChainError {
    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors that occur while writing or reading the transaction journal
    #[error("Journal error: {0}")]
    Journal(String),

    /// A journaled transaction produced a different outcome on replay
    #[error("Replay diverged at transaction {hash}: {reason}")]
    ReplayDiverged { hash: String, reason: String },

    /// Transaction was not found in the pool or history
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Submitted nonce does not follow the sender's last one
    #[error("Invalid nonce for {sender}: expected {expected}, got {actual}")]
    InvalidNonce {
        sender: String,
        expected: u64,
        actual: u64,
    },

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl From<bincode::Error> for ChainError {
    fn from(err: bincode::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

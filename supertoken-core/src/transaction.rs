use crate::address::Address;
use crate::error::TokenError;
use crate::token::{Amount, CtorParams, FlowRate, InitParams, Timestamp, TokenKind};
use serde::{Deserialize, Serialize};

/// Transaction hash type (32-byte array)
pub type TransactionHash = [u8; 32];

/// Block height of the chain
pub type BlockNumber = u64;

/// The result of a transaction conflict check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    /// No conflicts detected, transaction can proceed
    NoConflict,
    /// Conflicts detected with these transaction hashes
    Conflict(Vec<TransactionHash>),
    /// Read-only transaction, no conflict possible
    ReadOnly,
}

/// Represents the commitment level of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CommitmentLevel {
    /// Transaction is waiting in the pool to be mined
    #[default]
    Processing,
    /// Transaction has been mined and its effects applied
    Committed,
    /// Transaction has been mined and reverted
    Failed,
}

/// The access intent of a call on a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessIntent {
    /// Read-only access to the contract
    Read,
    /// Read-write access to the contract
    Write,
}

/// Operations on an active super token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOp {
    Transfer { to: Address, amount: Amount },
    /// ERC777-style send; behaves as a transfer carrying user data
    Send { to: Address, amount: Amount, data: Vec<u8> },
    Mint { to: Address, amount: Amount, data: Vec<u8> },
    Burn { amount: Amount, data: Vec<u8> },
    TransferOwnership { new_owner: Address },
    Deposit { user: Address, amount: Amount },
    Withdraw { amount: Amount },
    UpdateChildChainManager { new_manager: Address },
    IssueShare { subscriber: Address, units: u128 },
    /// Periodic mint of a multi-mint token; callable by anyone
    MintAndDistribute,
}

impl TokenOp {
    pub fn name(&self) -> &'static str {
        match self {
            TokenOp::Transfer { .. } => "transfer",
            TokenOp::Send { .. } => "send",
            TokenOp::Mint { .. } => "mint",
            TokenOp::Burn { .. } => "burn",
            TokenOp::TransferOwnership { .. } => "transferOwnership",
            TokenOp::Deposit { .. } => "deposit",
            TokenOp::Withdraw { .. } => "withdraw",
            TokenOp::UpdateChildChainManager { .. } => "updateChildChainManager",
            TokenOp::IssueShare { .. } => "issueShare",
            TokenOp::MintAndDistribute => "mint",
        }
    }
}

/// Constant flow agreement operations; the sender is the transaction sender
/// unless stated otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowOp {
    Create { receiver: Address, flow_rate: FlowRate },
    Update { receiver: Address, flow_rate: FlowRate },
    /// Either side of the flow may delete it
    Delete { sender: Address, receiver: Address },
}

/// Instant distribution agreement operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdaOp {
    CreateIndex { index_id: u32 },
    UpdateSubscription { index_id: u32, subscriber: Address, units: u128 },
    ApproveSubscription { publisher: Address, index_id: u32 },
    Distribute { index_id: u32, amount: Amount },
}

/// A single contract call carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Deploy host, factory and agreements
    DeployFramework,
    /// Deploy a custom super token proxy
    DeployToken { kind: TokenKind, ctor: CtorParams },
    /// Factory registration of a deployed proxy
    RegisterCustomSuperToken { factory: Address, proxy: Address },
    /// The proxy's initialize entry point
    Initialize { proxy: Address, params: InitParams },
    Token { token: Address, op: TokenOp },
    Flow { token: Address, op: FlowOp },
    Distribution { token: Address, op: IdaOp },
    /// Deploy a contract that creates pure super tokens in one transaction
    DeployPureDeployer { factory: Address, mintable: bool },
    /// Create a pure super token through a deployer contract. For mintable
    /// deployers `receiver` becomes the owner and `initial_supply` must be 0.
    DeploySuperToken {
        deployer: Address,
        name: String,
        symbol: String,
        receiver: Address,
        initial_supply: Amount,
    },
}

impl Call {
    /// Contracts this call touches and how
    pub fn object_intents(&self) -> Vec<(Address, AccessIntent)> {
        match self {
            Call::DeployFramework | Call::DeployToken { .. } => Vec::new(),
            Call::RegisterCustomSuperToken { factory, proxy } => vec![
                (*factory, AccessIntent::Write),
                (*proxy, AccessIntent::Write),
            ],
            Call::Initialize { proxy, params } => vec![
                (*proxy, AccessIntent::Write),
                (params.factory, AccessIntent::Read),
            ],
            Call::Token { token, .. }
            | Call::Flow { token, .. }
            | Call::Distribution { token, .. } => vec![(*token, AccessIntent::Write)],
            Call::DeployPureDeployer { factory, .. } => vec![(*factory, AccessIntent::Read)],
            Call::DeploySuperToken { deployer, .. } => vec![(*deployer, AccessIntent::Write)],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Call::DeployFramework => "deployFramework",
            Call::DeployToken { .. } => "deploy",
            Call::RegisterCustomSuperToken { .. } => "initializeCustomSuperToken",
            Call::Initialize { .. } => "initialize",
            Call::Token { op, .. } => op.name(),
            Call::Flow { op, .. } => match op {
                FlowOp::Create { .. } => "createFlow",
                FlowOp::Update { .. } => "updateFlow",
                FlowOp::Delete { .. } => "deleteFlow",
            },
            Call::Distribution { op, .. } => match op {
                IdaOp::CreateIndex { .. } => "createIndex",
                IdaOp::UpdateSubscription { .. } => "updateSubscription",
                IdaOp::ApproveSubscription { .. } => "approveSubscription",
                IdaOp::Distribute { .. } => "distribute",
            },
            Call::DeployPureDeployer { .. } => "deployPureDeployer",
            Call::DeploySuperToken { .. } => "deploySuperToken",
        }
    }
}

/// A signed-by-convention call from an account, ordered by its nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub nonce: u64,
    pub call: Call,
    /// The hash of the transaction
    pub hash: TransactionHash,
    /// The commitment level of this transaction
    pub commitment_level: CommitmentLevel,
}

impl Transaction {
    /// Create a new transaction with a Processing commitment level
    pub fn new(sender: Address, nonce: u64, call: Call) -> Self {
        let hash = Self::compute_hash(&sender, nonce, &call);
        Self {
            sender,
            nonce,
            call,
            hash,
            commitment_level: CommitmentLevel::Processing,
        }
    }

    /// BLAKE3 over the bincode encoding of (sender, nonce, call)
    pub fn compute_hash(sender: &Address, nonce: u64, call: &Call) -> TransactionHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(sender.bytes());
        hasher.update(&nonce.to_le_bytes());
        // Encoding an in-memory enum cannot fail
        let encoded = bincode::serialize(call).unwrap_or_default();
        hasher.update(&encoded);
        *hasher.finalize().as_bytes()
    }

    /// Mark the transaction as committed
    pub fn commit(&mut self) {
        self.commitment_level = CommitmentLevel::Committed;
    }

    /// Mark the transaction as failed
    pub fn fail(&mut self) {
        self.commitment_level = CommitmentLevel::Failed;
    }

    pub fn is_pending(&self) -> bool {
        self.commitment_level == CommitmentLevel::Processing
    }

    pub fn hash_hex(&self) -> String {
        hash_hex(&self.hash)
    }
}

pub fn hash_hex(hash: &TransactionHash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Events emitted by successful transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FrameworkDeployed {
        host: Address,
        factory: Address,
        cfa: Address,
        ida: Address,
    },
    ContractDeployed {
        address: Address,
        contract: String,
    },
    CustomSuperTokenCreated {
        token: Address,
    },
    Initialized {
        token: Address,
        name: String,
        symbol: String,
    },
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    OwnershipTransferred {
        token: Address,
        previous_owner: Address,
        new_owner: Address,
    },
    ChildChainManagerChanged {
        token: Address,
        new_manager: Address,
    },
    FlowUpdated {
        token: Address,
        sender: Address,
        receiver: Address,
        flow_rate: FlowRate,
    },
    IndexCreated {
        token: Address,
        publisher: Address,
        index_id: u32,
    },
    IndexUpdated {
        token: Address,
        publisher: Address,
        index_id: u32,
        index_value: u128,
    },
    SubscriptionUnitsUpdated {
        token: Address,
        publisher: Address,
        index_id: u32,
        subscriber: Address,
        units: u128,
    },
    SubscriptionApproved {
        token: Address,
        publisher: Address,
        index_id: u32,
        subscriber: Address,
    },
    SuperTokenCreated {
        token: Address,
    },
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// The hash of the transaction that was executed
    pub transaction_hash: TransactionHash,

    /// The block in which this transaction was mined
    pub block_number: BlockNumber,

    /// Timestamp of that block
    pub timestamp: Timestamp,

    /// Whether the transaction was executed successfully
    pub success: bool,

    /// The commitment level of this transaction
    pub commitment_level: CommitmentLevel,

    /// Why the contract rejected the call (if not successful)
    pub error: Option<TokenError>,

    /// Address of the contract created by this transaction, if any
    pub contract_address: Option<Address>,

    /// Events emitted by the call; empty for failed transactions
    pub events: Vec<Event>,
}

impl TransactionReceipt {
    pub fn success(
        transaction_hash: TransactionHash,
        block_number: BlockNumber,
        timestamp: Timestamp,
        events: Vec<Event>,
    ) -> Self {
        Self {
            transaction_hash,
            block_number,
            timestamp,
            success: true,
            commitment_level: CommitmentLevel::Committed,
            error: None,
            contract_address: None,
            events,
        }
    }

    pub fn failure(
        transaction_hash: TransactionHash,
        block_number: BlockNumber,
        timestamp: Timestamp,
        error: TokenError,
    ) -> Self {
        Self {
            transaction_hash,
            block_number,
            timestamp,
            success: false,
            commitment_level: CommitmentLevel::Failed,
            error: Some(error),
            contract_address: None,
            events: Vec::new(),
        }
    }

    pub fn with_contract_address(mut self, address: Option<Address>) -> Self {
        self.contract_address = address;
        self
    }

    /// Turn a failed receipt back into the rejection it carries
    pub fn into_result(self) -> Result<TransactionReceipt, TokenError> {
        match self.error.clone() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    pub fn hash_hex(&self) -> String {
        hash_hex(&self.transaction_hash)
    }
}

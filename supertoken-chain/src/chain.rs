use crate::agreements::{FlowData, IndexData, SubscriptionData};
use crate::deployer::PureSuperTokenDeployer;
use crate::framework::Framework;
use crate::journal::{JournalEntry, TransactionJournal};
use crate::receipts::ReceiptStore;
use crate::runtime::Runtime;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use supertoken_core::{
    Address, Amount, BasicConflictChecker, BlockNumber, Call, ChainError, ConflictChecker,
    ConflictResult, Event, FlowOp, IdaOp, ProxyLifecycle, SuperTokenState, Timestamp, TokenError,
    TokenInfo, TokenKind, TokenOp, Transaction, TransactionHash, TransactionReceipt, VariantInit,
    VariantState,
};

/// Index a multi-mint token distributes its periodic mints through
pub const MULTI_MINT_INDEX: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Seconds the clock advances with every mined block
    pub block_time_secs: u64,
    /// Timestamp of the first block; the current time when unset
    pub genesis_timestamp: Option<Timestamp>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            block_time_secs: 1,
            genesis_timestamp: None,
        }
    }
}

/// Contract storage of the chain. Cloned before every transaction so a
/// rejected call can be undone as a whole.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    tokens: BTreeMap<Address, SuperTokenState>,
    deployers: BTreeMap<Address, PureSuperTokenDeployer>,
    framework: Option<Framework>,
}

struct Outcome {
    events: Vec<Event>,
    contract_address: Option<Address>,
}

impl Outcome {
    fn events(events: Vec<Event>) -> Self {
        Self {
            events,
            contract_address: None,
        }
    }

    fn deployed(address: Address, events: Vec<Event>) -> Self {
        Self {
            events,
            contract_address: Some(address),
        }
    }
}

impl ChainState {
    pub fn framework(&self) -> Option<&Framework> {
        self.framework.as_ref()
    }

    pub fn token(&self, address: &Address) -> Option<&SuperTokenState> {
        self.tokens.get(address)
    }

    pub fn deployer(&self, address: &Address) -> Option<&PureSuperTokenDeployer> {
        self.deployers.get(address)
    }

    fn is_occupied(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
            || self.deployers.contains_key(address)
            || self
                .framework
                .as_ref()
                .map_or(false, |framework| framework.addresses().contains(address))
    }

    fn claim(&self, address: Address) -> Result<Address, TokenError> {
        if self.is_occupied(&address) {
            Err(TokenError::AddressCollision(address))
        } else {
            Ok(address)
        }
    }

    fn framework_mut(&mut self) -> Result<&mut Framework, TokenError> {
        self.framework.as_mut().ok_or(TokenError::FrameworkMissing)
    }

    fn token_and_framework(
        &mut self,
        token: &Address,
    ) -> Result<(&mut SuperTokenState, Option<&mut Framework>), TokenError> {
        let state = self
            .tokens
            .get_mut(token)
            .ok_or(TokenError::UnknownContract(*token))?;
        Ok((state, self.framework.as_mut()))
    }

    fn apply(&mut self, transaction: &Transaction, now: Timestamp) -> Result<Outcome, TokenError> {
        let sender = &transaction.sender;
        match &transaction.call {
            Call::DeployFramework => {
                if self.framework.is_some() {
                    return Err(TokenError::InvalidArgument(
                        "framework already deployed".to_string(),
                    ));
                }
                let framework = Framework::deploy(sender, transaction.nonce);
                for address in framework.addresses() {
                    self.claim(address)?;
                }
                info!(
                    "Framework deployed: host {} factory {} cfa {} ida {}",
                    framework.host.address, framework.host.factory, framework.host.cfa, framework.host.ida
                );
                let event = framework.event();
                let host = framework.host.address;
                self.framework = Some(framework);
                Ok(Outcome::deployed(host, vec![event]))
            }

            Call::DeployToken { kind, ctor } => {
                let address = self.claim(Address::create(sender, transaction.nonce))?;
                let state = SuperTokenState::deployed(address, *kind, *sender, ctor.clone())?;
                self.tokens.insert(address, state);
                Ok(Outcome::deployed(
                    address,
                    vec![Event::ContractDeployed {
                        address,
                        contract: kind.contract_name().to_string(),
                    }],
                ))
            }

            Call::RegisterCustomSuperToken { factory, proxy } => {
                let (state, framework) = self.token_and_framework(proxy)?;
                let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                if framework.factory.address() != factory {
                    return Err(TokenError::UnknownContract(*factory));
                }
                let event = framework.factory.initialize_custom_super_token(sender, state)?;
                Ok(Outcome::events(vec![event]))
            }

            Call::Initialize { proxy, params } => {
                let (state, framework) = self.token_and_framework(proxy)?;
                state.initialize(sender, params)?;

                let mut events = vec![Event::Initialized {
                    token: *proxy,
                    name: params.name.clone(),
                    symbol: params.symbol.clone(),
                }];
                match &params.variant {
                    VariantInit::Burnable {
                        initial_supply,
                        receiver,
                        ..
                    }
                    | VariantInit::BurnMint {
                        initial_supply,
                        receiver,
                        ..
                    }
                    | VariantInit::Pure {
                        initial_supply,
                        receiver,
                    } if *initial_supply > 0 => {
                        events.push(Event::Transfer {
                            token: *proxy,
                            from: Address::ZERO,
                            to: *receiver,
                            amount: *initial_supply,
                        });
                    }
                    VariantInit::MultiMint { ida, .. } => {
                        let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                        if framework.ida.address() != ida {
                            return Err(TokenError::UnknownContract(*ida));
                        }
                        events.push(framework.ida.create_index(state, proxy, MULTI_MINT_INDEX)?);
                    }
                    VariantInit::StreamFromMint {
                        cfa,
                        receiver,
                        flow_rate,
                    } => {
                        let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                        if framework.cfa.address() != cfa {
                            return Err(TokenError::UnknownContract(*cfa));
                        }
                        events.push(framework.cfa.create_flow(state, proxy, receiver, *flow_rate, now)?);
                    }
                    _ => {}
                }
                Ok(Outcome::events(events))
            }

            Call::Token { token, op } => self
                .apply_token_op(sender, token, op, now)
                .map(Outcome::events),

            Call::Flow { token, op } => {
                let (state, framework) = self.token_and_framework(token)?;
                let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                let cfa = &mut framework.cfa;
                let event = match op {
                    FlowOp::Create {
                        receiver,
                        flow_rate,
                    } => cfa.create_flow(state, sender, receiver, *flow_rate, now)?,
                    FlowOp::Update {
                        receiver,
                        flow_rate,
                    } => cfa.update_flow(state, sender, receiver, *flow_rate, now)?,
                    FlowOp::Delete {
                        sender: flow_sender,
                        receiver,
                    } => cfa.delete_flow(state, sender, flow_sender, receiver, now)?,
                };
                Ok(Outcome::events(vec![event]))
            }

            Call::Distribution { token, op } => {
                let (state, framework) = self.token_and_framework(token)?;
                let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                let event = match op {
                    IdaOp::CreateIndex { index_id } => {
                        framework.ida.create_index(state, sender, *index_id)?
                    }
                    IdaOp::UpdateSubscription {
                        index_id,
                        subscriber,
                        units,
                    } => framework
                        .ida
                        .update_subscription(state, sender, *index_id, subscriber, *units)?,
                    IdaOp::ApproveSubscription {
                        publisher,
                        index_id,
                    } => framework
                        .ida
                        .approve_subscription(state, sender, publisher, *index_id)?,
                    IdaOp::Distribute { index_id, amount } => {
                        framework.cfa.settle(state, sender, now)?;
                        framework.ida.distribute(state, sender, *index_id, *amount)?
                    }
                };
                Ok(Outcome::events(vec![event]))
            }

            Call::DeployPureDeployer { factory, mintable } => {
                let framework_factory = *self.framework_mut()?.factory.address();
                if &framework_factory != factory {
                    return Err(TokenError::UnknownContract(*factory));
                }
                let address = self.claim(Address::create(sender, transaction.nonce))?;
                let deployer = PureSuperTokenDeployer::new(address, *factory, *mintable);
                self.deployers.insert(address, deployer);
                Ok(Outcome::deployed(
                    address,
                    vec![Event::ContractDeployed {
                        address,
                        contract: deployer.contract_name().to_string(),
                    }],
                ))
            }

            Call::DeploySuperToken {
                deployer,
                name,
                symbol,
                receiver,
                initial_supply,
            } => {
                let deployer = *self
                    .deployers
                    .get(deployer)
                    .ok_or(TokenError::UnknownContract(*deployer))?;
                let address = self.claim(deployer.token_address(sender, name, symbol))?;
                let framework = self.framework_mut()?;
                let (state, events) = deployer.deploy_super_token(
                    &mut framework.factory,
                    sender,
                    name,
                    symbol,
                    *receiver,
                    *initial_supply,
                )?;
                self.tokens.insert(address, state);
                Ok(Outcome::deployed(address, events))
            }
        }
    }

    fn apply_token_op(
        &mut self,
        sender: &Address,
        token: &Address,
        op: &TokenOp,
        now: Timestamp,
    ) -> Result<Vec<Event>, TokenError> {
        let (state, mut framework) = self.token_and_framework(token)?;
        state.ensure_active()?;
        let token = *token;
        let kind = state.kind();

        // Static balances must be current before they are spent
        if matches!(
            op,
            TokenOp::Transfer { .. } | TokenOp::Send { .. } | TokenOp::Burn { .. } | TokenOp::Withdraw { .. }
        ) {
            if let Some(framework) = framework.as_mut() {
                framework.cfa.settle(state, sender, now)?;
            }
        }

        let events = match op {
            TokenOp::Transfer { to, amount } | TokenOp::Send { to, amount, .. } => {
                state.transfer(sender, to, *amount)?;
                vec![Event::Transfer {
                    token,
                    from: *sender,
                    to: *to,
                    amount: *amount,
                }]
            }
            TokenOp::Mint { to, amount, .. } => {
                state.mint(sender, to, *amount)?;
                vec![Event::Transfer {
                    token,
                    from: Address::ZERO,
                    to: *to,
                    amount: *amount,
                }]
            }
            TokenOp::Burn { amount, .. } => {
                if !kind.is_burnable() {
                    return Err(TokenError::unsupported(kind, "burn"));
                }
                state.burn(sender, *amount)?;
                vec![Event::Transfer {
                    token,
                    from: *sender,
                    to: Address::ZERO,
                    amount: *amount,
                }]
            }
            TokenOp::TransferOwnership { new_owner } => {
                let previous_owner = state.owner().unwrap_or_default();
                state.transfer_ownership(sender, *new_owner)?;
                vec![Event::OwnershipTransferred {
                    token,
                    previous_owner,
                    new_owner: *new_owner,
                }]
            }
            TokenOp::Deposit { user, amount } => {
                state.deposit(sender, user, *amount)?;
                vec![Event::Transfer {
                    token,
                    from: Address::ZERO,
                    to: *user,
                    amount: *amount,
                }]
            }
            TokenOp::Withdraw { amount } => {
                if kind != TokenKind::MaticBridged {
                    return Err(TokenError::unsupported(kind, "withdraw"));
                }
                state.burn(sender, *amount)?;
                vec![Event::Transfer {
                    token,
                    from: *sender,
                    to: Address::ZERO,
                    amount: *amount,
                }]
            }
            TokenOp::UpdateChildChainManager { new_manager } => {
                state.update_child_chain_manager(sender, *new_manager)?;
                vec![Event::ChildChainManagerChanged {
                    token,
                    new_manager: *new_manager,
                }]
            }
            TokenOp::IssueShare { subscriber, units } => {
                let share_issuer = match state.variant() {
                    Some(VariantState::MultiMint { share_issuer, .. }) => *share_issuer,
                    _ => return Err(TokenError::unsupported(kind, "issue shares")),
                };
                if &share_issuer != sender {
                    return Err(TokenError::unauthorized(*sender, "issue shares"));
                }
                let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                vec![framework
                    .ida
                    .update_subscription(state, &token, MULTI_MINT_INDEX, subscriber, *units)?]
            }
            TokenOp::MintAndDistribute => {
                let (ida, amount) = state.record_periodic_mint(now)?;
                let framework = framework.ok_or(TokenError::FrameworkMissing)?;
                if framework.ida.address() != &ida {
                    return Err(TokenError::UnknownContract(ida));
                }
                state.mint_unchecked(&token, amount)?;
                let distributed = framework
                    .ida
                    .distribute(state, &token, MULTI_MINT_INDEX, amount)?;
                vec![
                    Event::Transfer {
                        token,
                        from: Address::ZERO,
                        to: token,
                        amount,
                    },
                    distributed,
                ]
            }
        };
        Ok(events)
    }
}

/// In-memory chain that serializes every transaction.
///
/// Submitted transactions wait in a pool until [`LocalChain::mine_block`]
/// executes them in submission order, all at the block's timestamp. A call
/// the contracts reject leaves the state exactly as it was but still
/// consumes the sender's nonce.
pub struct LocalChain {
    config: ChainConfig,
    state: ChainState,
    nonces: HashMap<Address, u64>,
    block_number: BlockNumber,
    clock: Timestamp,
    pending: Vec<Transaction>,
    transactions: HashMap<TransactionHash, Transaction>,
    receipts: ReceiptStore,
    journal: Option<Box<dyn TransactionJournal>>,
    checker: BasicConflictChecker,
}

impl LocalChain {
    pub fn new(config: ChainConfig) -> Self {
        let clock = config
            .genesis_timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);
        Self {
            config,
            state: ChainState::default(),
            nonces: HashMap::new(),
            block_number: 0,
            clock,
            pending: Vec::new(),
            transactions: HashMap::new(),
            receipts: ReceiptStore::new(),
            journal: None,
            checker: BasicConflictChecker::new(),
        }
    }

    /// Record every mined transaction to `journal` from now on
    pub fn with_journal(mut self, journal: Box<dyn TransactionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Rebuild a chain by re-executing a journal, then keep recording to it.
    ///
    /// Every transaction must reproduce its recorded outcome; otherwise the
    /// replay stops with [`ChainError::ReplayDiverged`].
    pub fn replay(config: ChainConfig, journal: Box<dyn TransactionJournal>) -> Result<Self, ChainError> {
        let entries = journal
            .iterate_entries()
            .collect::<Result<Vec<JournalEntry>, ChainError>>()?;
        let mut chain = Self::new(config);

        let mut remaining = entries.as_slice();
        while let Some(first) = remaining.first() {
            let block_len = remaining
                .iter()
                .take_while(|entry| entry.block_number == first.block_number)
                .count();
            let (block, rest) = remaining.split_at(block_len);
            remaining = rest;

            chain.block_number = first.block_number.saturating_sub(1);
            chain.clock = first.timestamp;
            for entry in block {
                let mut transaction = entry.transaction.clone();
                transaction.commitment_level = Default::default();
                chain.submit(transaction)?;
            }

            let receipts = chain.mine_block()?;
            for (entry, receipt) in block.iter().zip(receipts.iter()) {
                if entry.success != receipt.success {
                    return Err(ChainError::ReplayDiverged {
                        hash: receipt.hash_hex(),
                        reason: format!(
                            "recorded success={} but replay gave success={}",
                            entry.success, receipt.success
                        ),
                    });
                }
            }
        }

        if !entries.is_empty() {
            info!(
                "Replayed {} transactions up to block {}",
                entries.len(),
                chain.block_number
            );
        }
        chain.journal = Some(journal);
        Ok(chain)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    /// Timestamp the next block will carry
    pub fn timestamp(&self) -> Timestamp {
        self.clock
    }

    /// Advance the clock without mining
    pub fn fast_forward(&mut self, secs: u64) {
        self.clock = self.clock.saturating_add(secs);
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Queue a transaction for the next block
    pub fn submit(&mut self, transaction: Transaction) -> Result<TransactionHash, ChainError> {
        let expected = self.next_nonce(&transaction.sender);
        if transaction.nonce != expected {
            return Err(ChainError::InvalidNonce {
                sender: transaction.sender.to_string(),
                expected,
                actual: transaction.nonce,
            });
        }

        if let ConflictResult::Conflict(others) = self.check_conflicts(&transaction) {
            warn!(
                "Transaction {} ({}) touches the same contracts as {} pending transaction(s); it will run after them",
                transaction.hash_hex(),
                transaction.call.name(),
                others.len()
            );
        }

        self.nonces.insert(transaction.sender, expected + 1);
        let hash = transaction.hash;
        self.pending.push(transaction);
        Ok(hash)
    }

    /// Execute every pending transaction in one block.
    ///
    /// The whole block is executed and its receipts stored even when the
    /// journal rejects an entry; the first journal error is returned once the
    /// block is complete, and later entries of that block are not journaled.
    pub fn mine_block(&mut self) -> Result<Vec<TransactionReceipt>, ChainError> {
        let pending = std::mem::take(&mut self.pending);
        self.block_number += 1;
        let block_number = self.block_number;
        let timestamp = self.clock;

        let mut receipts = Vec::with_capacity(pending.len());
        let mut journal_error = None;
        for mut transaction in pending {
            let submitted = transaction.clone();
            let snapshot = self.state.clone();

            let receipt = match self.state.apply(&transaction, timestamp) {
                Ok(outcome) => {
                    transaction.commit();
                    debug!(
                        "{} {} from {} mined in block {}",
                        transaction.call.name(),
                        transaction.hash_hex(),
                        transaction.sender,
                        block_number
                    );
                    TransactionReceipt::success(transaction.hash, block_number, timestamp, outcome.events)
                        .with_contract_address(outcome.contract_address)
                }
                Err(error) => {
                    self.state = snapshot;
                    transaction.fail();
                    warn!(
                        "{} {} from {} reverted: {}",
                        transaction.call.name(),
                        transaction.hash_hex(),
                        transaction.sender,
                        error
                    );
                    TransactionReceipt::failure(transaction.hash, block_number, timestamp, error)
                }
            };

            let mut touched: Vec<Address> = transaction
                .call
                .object_intents()
                .into_iter()
                .map(|(address, _)| address)
                .collect();
            touched.extend(receipt.contract_address);

            match self.journal.as_mut() {
                Some(journal) if journal_error.is_none() => {
                    let entry = JournalEntry::new(submitted, block_number, timestamp, receipt.success);
                    if let Err(e) = journal.record(&entry) {
                        error!(
                            "Failed to journal {} in block {}: {}",
                            transaction.hash_hex(),
                            block_number,
                            e
                        );
                        journal_error = Some(e);
                    }
                }
                _ => {}
            }
            self.receipts.store(receipt.clone(), &touched);
            self.transactions.insert(transaction.hash, transaction);
            receipts.push(receipt);
        }

        self.clock = self.clock.saturating_add(self.config.block_time_secs);
        match journal_error {
            Some(e) => Err(e),
            None => Ok(receipts),
        }
    }

    pub fn framework(&self) -> Option<&Framework> {
        self.state.framework()
    }

    pub fn token(&self, address: &Address) -> Option<&SuperTokenState> {
        self.state.token(address)
    }

    pub fn receipts(&self) -> &ReceiptStore {
        &self.receipts
    }

    /// Realtime balance at the current clock
    pub fn balance_of(&self, token: &Address, account: &Address) -> i128 {
        let Some(state) = self.state.token(token) else {
            return 0;
        };
        match self.state.framework() {
            Some(framework) => framework.cfa.realtime_balance(state, account, self.clock),
            None => state.static_balance(account),
        }
    }

    /// Minted supply plus whatever a mint source has streamed out so far
    pub fn total_supply(&self, token: &Address) -> Amount {
        let Some(state) = self.state.token(token) else {
            return 0;
        };
        let streamed = if state.is_mint_source(token) {
            let balance = self.balance_of(token, token);
            if balance < 0 {
                balance.unsigned_abs()
            } else {
                0
            }
        } else {
            0
        };
        state.total_supply().saturating_add(streamed)
    }

    pub fn get_flow(&self, token: &Address, sender: &Address, receiver: &Address) -> Option<FlowData> {
        self.framework()?.cfa.get_flow(token, sender, receiver)
    }

    pub fn get_index(&self, token: &Address, publisher: &Address, index_id: u32) -> Option<IndexData> {
        self.framework()?.ida.get_index(token, publisher, index_id)
    }

    pub fn get_subscription(
        &self,
        token: &Address,
        publisher: &Address,
        index_id: u32,
        subscriber: &Address,
    ) -> Option<SubscriptionData> {
        self.framework()?
            .ida
            .get_subscription(token, publisher, index_id, subscriber)
    }
}

impl Runtime for LocalChain {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn next_nonce(&self, sender: &Address) -> u64 {
        self.nonces.get(sender).copied().unwrap_or(0)
    }

    fn check_conflicts(&self, transaction: &Transaction) -> ConflictResult {
        self.checker.check_conflicts(transaction, &self.pending)
    }

    fn execute_transaction(&mut self, transaction: Transaction) -> Result<TransactionReceipt, ChainError> {
        let hash = self.submit(transaction)?;
        self.mine_block()?
            .into_iter()
            .find(|receipt| receipt.transaction_hash == hash)
            .ok_or_else(|| ChainError::TransactionNotFound(supertoken_core::transaction::hash_hex(&hash)))
    }

    fn get_transaction(&self, hash: &TransactionHash) -> Option<Transaction> {
        self.transactions
            .get(hash)
            .or_else(|| self.pending.iter().find(|transaction| &transaction.hash == hash))
            .cloned()
    }

    fn get_transaction_receipt(&self, hash: &TransactionHash) -> Option<TransactionReceipt> {
        self.receipts.get(hash).cloned()
    }

    fn receipts_for_contract(&self, address: &Address) -> Vec<TransactionReceipt> {
        self.receipts
            .receipts_for_contract(address)
            .into_iter()
            .cloned()
            .collect()
    }

    fn super_token_factory(&self) -> Option<Address> {
        self.framework()
            .map(|framework| framework.host.get_super_token_factory())
    }

    fn proxy_lifecycle(&self, proxy: &Address) -> Option<ProxyLifecycle> {
        self.token(proxy).map(|state| state.lifecycle())
    }

    fn token_info(&self, proxy: &Address) -> Option<TokenInfo> {
        let mut info = self.token(proxy)?.info();
        info.total_supply = self.total_supply(proxy);
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{FileJournal, MemoryJournal};
    use supertoken_core::{to_wad, CtorParams, FlowRate, InitParams};
    use tempfile::tempdir;

    const GENESIS: Timestamp = 1_700_000_000;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn carol() -> Address {
        Address::from_label("carol")
    }

    fn config() -> ChainConfig {
        ChainConfig {
            genesis_timestamp: Some(GENESIS),
            ..ChainConfig::default()
        }
    }

    fn chain_with_framework() -> LocalChain {
        let mut chain = LocalChain::new(config());
        assert!(chain.send(alice(), Call::DeployFramework).unwrap().success);
        chain
    }

    fn factory(chain: &LocalChain) -> Address {
        chain.super_token_factory().unwrap()
    }

    fn deploy_and_register(chain: &mut LocalChain, kind: TokenKind, ctor: CtorParams) -> Address {
        let deployed = chain
            .send(alice(), Call::DeployToken { kind, ctor })
            .unwrap();
        let proxy = deployed.contract_address.unwrap();
        let factory = factory(chain);
        let registered = chain
            .send(alice(), Call::RegisterCustomSuperToken { factory, proxy })
            .unwrap();
        assert!(registered.success);
        proxy
    }

    fn burnable_init(chain: &LocalChain, name: &str, symbol: &str, supply: Amount) -> InitParams {
        InitParams::new(
            name,
            symbol,
            factory(chain),
            VariantInit::Burnable {
                initial_supply: supply,
                receiver: alice(),
                user_data: vec![],
            },
        )
    }

    fn token_op(chain: &mut LocalChain, sender: Address, token: Address, op: TokenOp) -> TransactionReceipt {
        chain.send(sender, Call::Token { token, op }).unwrap()
    }

    #[test]
    fn test_activation_and_double_initialization() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);

        let params = burnable_init(&chain, "Super Juicy Token", "SJT", to_wad(1_000));
        let receipt = chain
            .send(alice(), Call::Initialize { proxy, params })
            .unwrap();
        assert!(receipt.success);
        assert_eq!(chain.balance_of(&proxy, &alice()), to_wad(1_000) as i128);
        assert_eq!(chain.total_supply(&proxy), to_wad(1_000));

        let again = burnable_init(&chain, "Not Super Juicy Token", "NSJT", to_wad(1));
        let receipt = chain
            .send(alice(), Call::Initialize { proxy, params: again })
            .unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.error, Some(TokenError::AlreadyInitialized(proxy)));

        let metadata = chain.token(&proxy).unwrap().metadata().unwrap().clone();
        assert_eq!(metadata.name, "Super Juicy Token");
        assert_eq!(metadata.symbol, "SJT");
        assert_eq!(chain.total_supply(&proxy), to_wad(1_000));
    }

    #[test]
    fn test_operations_before_initialization_revert() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);
        let nonce = chain.next_nonce(&alice());

        let receipt = token_op(&mut chain, alice(), proxy, TokenOp::Transfer { to: bob(), amount: 0 });
        assert_eq!(receipt.error, Some(TokenError::NotInitialized(proxy)));

        let receipt = chain
            .send(
                alice(),
                Call::Flow {
                    token: proxy,
                    op: FlowOp::Create {
                        receiver: bob(),
                        flow_rate: 1,
                    },
                },
            )
            .unwrap();
        assert_eq!(receipt.error, Some(TokenError::NotInitialized(proxy)));

        // Failed transactions still consume nonces
        assert_eq!(chain.next_nonce(&alice()), nonce + 2);
    }

    #[test]
    fn test_register_twice_keeps_state() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Mintable, CtorParams::None);
        let before = chain.proxy_lifecycle(&proxy).unwrap();

        let factory = factory(&chain);
        let receipt = chain
            .send(alice(), Call::RegisterCustomSuperToken { factory, proxy })
            .unwrap();
        assert_eq!(receipt.error, Some(TokenError::AlreadyRegistered(proxy)));
        assert_eq!(chain.proxy_lifecycle(&proxy), Some(before));
    }

    #[test]
    fn test_racing_initializers_in_one_block() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);

        let first = Transaction::new(
            alice(),
            chain.next_nonce(&alice()),
            Call::Initialize {
                proxy,
                params: burnable_init(&chain, "First", "ONE", 1),
            },
        );
        chain.submit(first).unwrap();
        let second = Transaction::new(
            alice(),
            chain.next_nonce(&alice()),
            Call::Initialize {
                proxy,
                params: burnable_init(&chain, "Second", "TWO", 2),
            },
        );
        assert!(matches!(chain.check_conflicts(&second), ConflictResult::Conflict(_)));
        chain.submit(second).unwrap();

        let receipts = chain.mine_block().unwrap();
        assert_eq!(receipts.len(), 2);
        assert!(receipts[0].success);
        assert_eq!(receipts[1].error, Some(TokenError::AlreadyInitialized(proxy)));
        assert_eq!(receipts[0].block_number, receipts[1].block_number);
        assert_eq!(chain.token(&proxy).unwrap().metadata().unwrap().name, "First");
    }

    #[test]
    fn test_nonce_must_follow() {
        let mut chain = LocalChain::new(config());
        let result = chain.submit(Transaction::new(alice(), 5, Call::DeployFramework));
        assert!(matches!(
            result,
            Err(ChainError::InvalidNonce {
                expected: 0,
                actual: 5,
                ..
            })
        ));
        assert!(chain.pending().is_empty());
    }

    #[test]
    fn test_stream_from_mint() {
        let mut chain = chain_with_framework();
        let host = chain.framework().unwrap().host;
        let proxy = deploy_and_register(&mut chain, TokenKind::StreamFromMint, CtorParams::None);
        let rate: FlowRate = 1_000_000_000_000_000;

        let params = InitParams::new(
            "Stream",
            "STRM",
            host.factory,
            VariantInit::StreamFromMint {
                cfa: host.cfa,
                receiver: bob(),
                flow_rate: rate,
            },
        );
        assert!(chain
            .send(alice(), Call::Initialize { proxy, params })
            .unwrap()
            .success);
        assert_eq!(chain.get_flow(&proxy, &proxy, &bob()).unwrap().flow_rate, rate);

        // One second passed with the block, 999 more on the clock
        chain.fast_forward(999);
        assert_eq!(chain.balance_of(&proxy, &bob()), to_wad(1) as i128);
        assert_eq!(chain.total_supply(&proxy), to_wad(1));
        assert_eq!(chain.token_info(&proxy).unwrap().total_supply, to_wad(1));
    }

    #[test]
    fn test_multi_mint_distribution() {
        let mut chain = chain_with_framework();
        let host = chain.framework().unwrap().host;
        let proxy = deploy_and_register(&mut chain, TokenKind::MultiMint, CtorParams::None);

        let params = InitParams::new(
            "Multi",
            "MULTI",
            host.factory,
            VariantInit::MultiMint {
                ida: host.ida,
                share_issuer: alice(),
                mint_interval: 86_400,
                mint_amount: to_wad(100),
            },
        );
        assert!(chain
            .send(alice(), Call::Initialize { proxy, params })
            .unwrap()
            .success);
        assert_eq!(
            chain.get_index(&proxy, &proxy, MULTI_MINT_INDEX).unwrap().index_value,
            0
        );

        let receipt = token_op(&mut chain, bob(), proxy, TokenOp::IssueShare { subscriber: bob(), units: 1 });
        assert!(matches!(receipt.error, Some(TokenError::Unauthorized { .. })));
        assert!(token_op(&mut chain, alice(), proxy, TokenOp::IssueShare { subscriber: bob(), units: 1 }).success);
        let approve = Call::Distribution {
            token: proxy,
            op: IdaOp::ApproveSubscription {
                publisher: proxy,
                index_id: MULTI_MINT_INDEX,
            },
        };
        assert!(chain.send(bob(), approve).unwrap().success);

        // Anyone may trigger the periodic mint
        assert!(token_op(&mut chain, carol(), proxy, TokenOp::MintAndDistribute).success);
        assert_eq!(
            chain.get_index(&proxy, &proxy, MULTI_MINT_INDEX).unwrap().index_value,
            to_wad(100)
        );
        assert_eq!(chain.balance_of(&proxy, &bob()), to_wad(100) as i128);

        let receipt = token_op(&mut chain, carol(), proxy, TokenOp::MintAndDistribute);
        assert!(matches!(receipt.error, Some(TokenError::MintIntervalNotElapsed { .. })));

        chain.fast_forward(86_400);
        assert!(token_op(&mut chain, carol(), proxy, TokenOp::MintAndDistribute).success);
        assert_eq!(chain.balance_of(&proxy, &bob()), to_wad(200) as i128);
        assert_eq!(chain.total_supply(&proxy), to_wad(200));
    }

    #[test]
    fn test_rejected_call_is_undone_as_a_whole() {
        let mut chain = chain_with_framework();
        let host = chain.framework().unwrap().host;
        let proxy = deploy_and_register(&mut chain, TokenKind::MultiMint, CtorParams::None);
        let params = InitParams::new(
            "Multi",
            "MULTI",
            host.factory,
            VariantInit::MultiMint {
                ida: host.ida,
                share_issuer: alice(),
                mint_interval: 86_400,
                mint_amount: to_wad(100),
            },
        );
        chain.send(alice(), Call::Initialize { proxy, params }).unwrap();

        // Mint succeeds but distribution has nobody to pay
        let receipt = token_op(&mut chain, alice(), proxy, TokenOp::MintAndDistribute);
        assert_eq!(
            receipt.error,
            Some(TokenError::NoUnitsIssued {
                index_id: MULTI_MINT_INDEX
            })
        );
        assert!(receipt.events.is_empty());
        assert_eq!(chain.total_supply(&proxy), 0);

        // The mint time was not recorded either
        token_op(&mut chain, alice(), proxy, TokenOp::IssueShare { subscriber: bob(), units: 1 });
        assert!(token_op(&mut chain, alice(), proxy, TokenOp::MintAndDistribute).success);

        // Bob never approved, so his share waits at the agreement
        assert_eq!(chain.balance_of(&proxy, &bob()), 0);
        assert_eq!(
            chain
                .get_subscription(&proxy, &proxy, MULTI_MINT_INDEX, &bob())
                .unwrap()
                .pending_distribution,
            to_wad(100)
        );
    }

    #[test]
    fn test_flows_settle_before_transfers() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);
        let params = burnable_init(&chain, "T", "T", to_wad(10));
        chain.send(alice(), Call::Initialize { proxy, params }).unwrap();

        let create = Call::Flow {
            token: proxy,
            op: FlowOp::Create {
                receiver: bob(),
                flow_rate: to_wad(1) as FlowRate,
            },
        };
        assert!(chain.send(alice(), create).unwrap().success);
        chain.fast_forward(4);

        // Five seconds of streaming left alice with 5 tokens
        let receipt = token_op(&mut chain, alice(), proxy, TokenOp::Transfer { to: carol(), amount: to_wad(6) });
        assert!(matches!(receipt.error, Some(TokenError::InsufficientBalance { .. })));
        assert_eq!(chain.balance_of(&proxy, &bob()), to_wad(6) as i128);

        let delete = Call::Flow {
            token: proxy,
            op: FlowOp::Delete {
                sender: alice(),
                receiver: bob(),
            },
        };
        assert!(chain.send(bob(), delete).unwrap().success);
        assert!(chain.get_flow(&proxy, &alice(), &bob()).is_none());
        assert_eq!(
            chain.balance_of(&proxy, &alice()) + chain.balance_of(&proxy, &bob()),
            to_wad(10) as i128
        );
    }

    #[test]
    fn test_exhausted_sender_goes_negative_without_creating_supply() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);
        let params = burnable_init(&chain, "T", "T", 10);
        chain.send(alice(), Call::Initialize { proxy, params }).unwrap();

        let stream = |receiver: Address| Call::Flow {
            token: proxy,
            op: FlowOp::Create {
                receiver,
                flow_rate: 1,
            },
        };
        assert!(chain.send(alice(), stream(bob())).unwrap().success);
        chain.fast_forward(100);

        // No liquidation: the flow keeps running past alice's balance
        assert_eq!(chain.balance_of(&proxy, &alice()), -91);
        assert_eq!(chain.balance_of(&proxy, &bob()), 101);
        assert_eq!(chain.total_supply(&proxy), 10);

        // An insolvent sender can neither transfer nor open another flow
        let receipt = token_op(&mut chain, alice(), proxy, TokenOp::Transfer { to: carol(), amount: 1 });
        assert!(matches!(receipt.error, Some(TokenError::InsufficientBalance { .. })));
        let receipt = chain.send(alice(), stream(carol())).unwrap();
        assert!(matches!(receipt.error, Some(TokenError::InvalidFlow(_))));

        let delete = Call::Flow {
            token: proxy,
            op: FlowOp::Delete {
                sender: alice(),
                receiver: bob(),
            },
        };
        assert!(chain.send(bob(), delete).unwrap().success);
        let alice_after = chain.balance_of(&proxy, &alice());
        chain.fast_forward(50);
        assert_eq!(chain.balance_of(&proxy, &alice()), alice_after);
        assert_eq!(
            chain.balance_of(&proxy, &alice()) + chain.balance_of(&proxy, &bob()),
            chain.total_supply(&proxy) as i128
        );
    }

    #[test]
    fn test_bridged_token_permissions() {
        let mut chain = chain_with_framework();
        let manager = Address::from_label("child chain manager");
        let proxy = deploy_and_register(
            &mut chain,
            TokenKind::MaticBridged,
            CtorParams::ChildChainManager(manager),
        );
        let params = InitParams::new("Bridged", "BRG", factory(&chain), VariantInit::MaticBridged);
        assert!(chain
            .send(alice(), Call::Initialize { proxy, params })
            .unwrap()
            .success);

        let receipt = token_op(&mut chain, bob(), proxy, TokenOp::Deposit { user: bob(), amount: 10 });
        assert!(matches!(receipt.error, Some(TokenError::Unauthorized { .. })));
        assert!(token_op(&mut chain, manager, proxy, TokenOp::Deposit { user: bob(), amount: 10 }).success);

        let receipt = token_op(&mut chain, bob(), proxy, TokenOp::Withdraw { amount: 11 });
        assert!(matches!(receipt.error, Some(TokenError::InsufficientBalance { .. })));
        assert!(token_op(&mut chain, bob(), proxy, TokenOp::Withdraw { amount: 4 }).success);
        assert_eq!(chain.total_supply(&proxy), 6);

        let receipt = token_op(
            &mut chain,
            bob(),
            proxy,
            TokenOp::UpdateChildChainManager { new_manager: bob() },
        );
        assert!(matches!(receipt.error, Some(TokenError::Unauthorized { .. })));
        assert!(token_op(
            &mut chain,
            alice(),
            proxy,
            TokenOp::UpdateChildChainManager { new_manager: bob() }
        )
        .success);
        assert!(token_op(&mut chain, bob(), proxy, TokenOp::Deposit { user: bob(), amount: 1 }).success);
    }

    #[test]
    fn test_burn_needs_a_burnable_token() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Mintable, CtorParams::None);
        let params = InitParams::new("M", "M", factory(&chain), VariantInit::Mintable);
        chain.send(alice(), Call::Initialize { proxy, params }).unwrap();
        token_op(&mut chain, alice(), proxy, TokenOp::Mint { to: alice(), amount: 5, data: vec![] });

        let receipt = token_op(&mut chain, alice(), proxy, TokenOp::Burn { amount: 1, data: vec![] });
        assert!(matches!(receipt.error, Some(TokenError::UnsupportedOperation { .. })));
        assert_eq!(chain.total_supply(&proxy), 5);
    }

    #[test]
    fn test_pure_deployer_collisions() {
        let mut chain = chain_with_framework();
        let factory = factory(&chain);
        let deployer = chain
            .send(alice(), Call::DeployPureDeployer { factory, mintable: false })
            .unwrap()
            .contract_address
            .unwrap();

        let create = |receiver: Address| Call::DeploySuperToken {
            deployer,
            name: "Super Juicy Token".to_string(),
            symbol: "SJT".to_string(),
            receiver,
            initial_supply: to_wad(1_000),
        };

        let receipt = chain.send(alice(), create(alice())).unwrap();
        assert!(receipt.success);
        let token = receipt.contract_address.unwrap();
        assert_eq!(chain.balance_of(&token, &alice()), to_wad(1_000) as i128);
        assert!(receipt
            .events
            .contains(&Event::SuperTokenCreated { token }));
        assert!(chain.proxy_lifecycle(&token).unwrap().is_active());

        // Same name, symbol and sender lands on the same address
        let receipt = chain.send(alice(), create(bob())).unwrap();
        assert_eq!(receipt.error, Some(TokenError::AddressCollision(token)));

        // A different sender is free to use the same name
        let receipt = chain.send(bob(), create(bob())).unwrap();
        assert!(receipt.success);
        assert_ne!(receipt.contract_address, Some(token));
    }

    #[test]
    fn test_mintable_pure_deployer_hands_over_ownership() {
        let mut chain = chain_with_framework();
        let factory = factory(&chain);
        let deployer = chain
            .send(alice(), Call::DeployPureDeployer { factory, mintable: true })
            .unwrap()
            .contract_address
            .unwrap();

        let receipt = chain
            .send(
                alice(),
                Call::DeploySuperToken {
                    deployer,
                    name: "Mint".to_string(),
                    symbol: "MNT".to_string(),
                    receiver: bob(),
                    initial_supply: 0,
                },
            )
            .unwrap();
        let token = receipt.contract_address.unwrap();
        assert_eq!(chain.token_info(&token).unwrap().owner, Some(bob()));
        assert!(token_op(&mut chain, bob(), token, TokenOp::Mint { to: carol(), amount: 3, data: vec![] }).success);
    }

    #[test]
    fn test_receipts_are_indexed() {
        let mut chain = chain_with_framework();
        let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);

        let history = chain.receipts_for_contract(&proxy);
        assert_eq!(history.len(), 2);
        assert!(history[0].block_number > history[1].block_number);
        assert_eq!(history[1].contract_address, Some(proxy));

        let hash = history[0].transaction_hash;
        assert!(chain.get_transaction_receipt(&hash).is_some());
        assert!(matches!(
            chain.get_transaction(&hash).unwrap().call,
            Call::RegisterCustomSuperToken { .. }
        ));
        assert_eq!(chain.receipts().receipts_in_block(chain.block_number()).len(), 1);
    }

    #[test]
    fn test_replay_rebuilds_the_chain() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("chain.journal");

        let (proxy, block, clock) = {
            let journal = FileJournal::open(&path).unwrap();
            let mut chain = LocalChain::new(config()).with_journal(Box::new(journal));
            chain.send(alice(), Call::DeployFramework).unwrap();
            let proxy = deploy_and_register(&mut chain, TokenKind::Burnable, CtorParams::None);
            let params = burnable_init(&chain, "Super Juicy Token", "SJT", 100);
            chain.send(alice(), Call::Initialize { proxy, params }).unwrap();
            token_op(&mut chain, alice(), proxy, TokenOp::Transfer { to: bob(), amount: 40 });
            // A rejected call is journaled too
            token_op(&mut chain, bob(), proxy, TokenOp::Transfer { to: carol(), amount: 41 });
            (proxy, chain.block_number(), chain.timestamp())
        };

        let journal = FileJournal::open(&path).unwrap();
        let mut chain = LocalChain::replay(config(), Box::new(journal)).unwrap();
        assert_eq!(chain.block_number(), block);
        assert_eq!(chain.timestamp(), clock);
        assert_eq!(chain.next_nonce(&alice()), 5);
        assert_eq!(chain.next_nonce(&bob()), 1);
        assert_eq!(chain.balance_of(&proxy, &alice()), 60);
        assert_eq!(chain.balance_of(&proxy, &bob()), 40);
        assert!(chain.proxy_lifecycle(&proxy).unwrap().is_active());

        // The replayed chain keeps journaling
        token_op(&mut chain, bob(), proxy, TokenOp::Transfer { to: carol(), amount: 1 });
        drop(chain);
        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.iterate_entries().count(), 7);
    }

    #[test]
    fn test_replay_detects_divergence() {
        let mut journal = MemoryJournal::new();
        let transaction = Transaction::new(alice(), 0, Call::DeployFramework);
        journal
            .record(&JournalEntry::new(transaction, 1, GENESIS, false))
            .unwrap();

        let result = LocalChain::replay(config(), Box::new(journal));
        assert!(matches!(result, Err(ChainError::ReplayDiverged { .. })));
    }

    struct BrokenJournal;

    impl TransactionJournal for BrokenJournal {
        fn record(&mut self, _entry: &JournalEntry) -> Result<(), ChainError> {
            Err(ChainError::Journal("disk full".to_string()))
        }

        fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, ChainError>> + '_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn test_journal_failure_still_completes_the_block() {
        let mut chain = LocalChain::new(config()).with_journal(Box::new(BrokenJournal));
        chain
            .submit(Transaction::new(alice(), 0, Call::DeployFramework))
            .unwrap();
        let deploy = Transaction::new(
            bob(),
            0,
            Call::DeployToken {
                kind: TokenKind::Pure,
                ctor: CtorParams::None,
            },
        );
        let deploy_hash = deploy.hash;
        chain.submit(deploy).unwrap();

        let clock = chain.timestamp();
        assert!(matches!(chain.mine_block(), Err(ChainError::Journal(_))));

        // Every transaction of the block has its effects and its receipt
        assert!(chain.pending().is_empty());
        let host = chain.framework().unwrap().host.address;
        assert_eq!(chain.receipts_for_contract(&host).len(), 1);
        let receipt = chain.get_transaction_receipt(&deploy_hash).unwrap();
        assert!(receipt.success);
        assert!(chain.token(&receipt.contract_address.unwrap()).is_some());
        assert!(chain.get_transaction(&deploy_hash).is_some());
        assert_eq!(chain.next_nonce(&bob()), 1);
        assert_eq!(chain.timestamp(), clock + 1);
    }
}

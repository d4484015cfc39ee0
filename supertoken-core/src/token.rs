use crate::address::Address;
use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Token amount in base units
pub type Amount = u128;

/// Signed flow rate in base units per second
pub type FlowRate = i128;

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Number of decimals every super token reports
pub const DECIMALS: u8 = 18;

/// One whole token in base units
pub const WAD: Amount = 1_000_000_000_000_000_000;

/// Convert whole tokens to base units
pub fn to_wad(units: u128) -> Amount {
    units.saturating_mul(WAD)
}

/// The contract artifact a proxy was deployed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Burnable,
    Mintable,
    BurnMint,
    Capped,
    MaticBridged,
    MultiMint,
    StreamFromMint,
    Pure,
}

impl TokenKind {
    pub const ALL: [TokenKind; 8] = [
        TokenKind::Burnable,
        TokenKind::Mintable,
        TokenKind::BurnMint,
        TokenKind::Capped,
        TokenKind::MaticBridged,
        TokenKind::MultiMint,
        TokenKind::StreamFromMint,
        TokenKind::Pure,
    ];

    /// Contract name as used by deployment scripts
    pub fn contract_name(&self) -> &'static str {
        match self {
            TokenKind::Burnable => "BurnableSuperToken",
            TokenKind::Mintable => "MintableSuperToken",
            TokenKind::BurnMint => "BurnMintSuperToken",
            TokenKind::Capped => "CappedSuperToken",
            TokenKind::MaticBridged => "MaticBridgedSuperToken",
            TokenKind::MultiMint => "MultiMintToken",
            TokenKind::StreamFromMint => "StreamFromMint",
            TokenKind::Pure => "PureSuperToken",
        }
    }

    /// Whether the owner of this kind of token can mint new supply
    pub fn is_owner_mintable(&self) -> bool {
        matches!(
            self,
            TokenKind::Mintable | TokenKind::BurnMint | TokenKind::Capped
        )
    }

    /// Whether holders of this kind of token can burn their own balance
    pub fn is_burnable(&self) -> bool {
        matches!(self, TokenKind::Burnable | TokenKind::BurnMint)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_name())
    }
}

impl FromStr for TokenKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "MaticBridgedPureSuperTokenProxy" {
            return Ok(TokenKind::MaticBridged);
        }
        TokenKind::ALL
            .iter()
            .find(|kind| kind.contract_name() == s)
            .copied()
            .ok_or_else(|| TokenError::InvalidArgument(format!("unknown contract {}", s)))
    }
}

/// Constructor arguments of a proxy contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtorParams {
    None,
    /// Bridge manager allowed to deposit on behalf of users
    ChildChainManager(Address),
}

/// Variant-specific part of the initialize entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantInit {
    Burnable {
        initial_supply: Amount,
        receiver: Address,
        user_data: Vec<u8>,
    },
    Mintable,
    BurnMint {
        initial_supply: Amount,
        receiver: Address,
        user_data: Vec<u8>,
    },
    Capped {
        max_supply: Amount,
    },
    MaticBridged,
    MultiMint {
        ida: Address,
        share_issuer: Address,
        mint_interval: u64,
        mint_amount: Amount,
    },
    StreamFromMint {
        cfa: Address,
        receiver: Address,
        flow_rate: FlowRate,
    },
    Pure {
        initial_supply: Amount,
        receiver: Address,
    },
}

impl VariantInit {
    pub fn kind(&self) -> TokenKind {
        match self {
            VariantInit::Burnable { .. } => TokenKind::Burnable,
            VariantInit::Mintable => TokenKind::Mintable,
            VariantInit::BurnMint { .. } => TokenKind::BurnMint,
            VariantInit::Capped { .. } => TokenKind::Capped,
            VariantInit::MaticBridged => TokenKind::MaticBridged,
            VariantInit::MultiMint { .. } => TokenKind::MultiMint,
            VariantInit::StreamFromMint { .. } => TokenKind::StreamFromMint,
            VariantInit::Pure { .. } => TokenKind::Pure,
        }
    }
}

/// Arguments of the initialize entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    pub name: String,
    pub symbol: String,
    /// The factory the proxy was registered with
    pub factory: Address,
    pub variant: VariantInit,
}

impl InitParams {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        factory: Address,
        variant: VariantInit,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            factory,
            variant,
        }
    }
}

/// Activation lifecycle of a proxy. There is no way back to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyLifecycle {
    /// Contract exists but is unknown to any factory
    Deployed,
    /// Registered with a factory and bound to its token logic
    Registered { factory: Address, logic: Address },
    /// Initialized; economic operations are allowed
    Active { factory: Address },
}

impl ProxyLifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, ProxyLifecycle::Active { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProxyLifecycle::Deployed => "deployed",
            ProxyLifecycle::Registered { .. } => "registered",
            ProxyLifecycle::Active { .. } => "active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Variant configuration fixed at initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantState {
    Burnable,
    Mintable {
        owner: Address,
    },
    BurnMint {
        owner: Address,
    },
    Capped {
        owner: Address,
        max_supply: Amount,
    },
    MaticBridged {
        child_chain_manager: Address,
        governance: Address,
    },
    MultiMint {
        ida: Address,
        share_issuer: Address,
        mint_interval: u64,
        mint_amount: Amount,
        last_mint: Option<Timestamp>,
    },
    StreamFromMint {
        cfa: Address,
        receiver: Address,
        flow_rate: FlowRate,
    },
    Pure,
}

/// Summary of a token used by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub kind: TokenKind,
    pub deployer: Address,
    pub lifecycle: ProxyLifecycle,
    pub metadata: Option<TokenMetadata>,
    pub total_supply: Amount,
    pub owner: Option<Address>,
}

/// Storage of a custom super token proxy.
///
/// Balances kept here are static balances; flow accruals are settled into
/// them by the agreement that owns the flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperTokenState {
    address: Address,
    kind: TokenKind,
    deployer: Address,
    ctor: CtorParams,
    lifecycle: ProxyLifecycle,
    metadata: Option<TokenMetadata>,
    variant: Option<VariantState>,
    balances: BTreeMap<Address, i128>,
    total_supply: Amount,
}

impl SuperTokenState {
    /// Create the storage of a freshly deployed proxy
    pub fn deployed(
        address: Address,
        kind: TokenKind,
        deployer: Address,
        ctor: CtorParams,
    ) -> Result<Self, TokenError> {
        match (kind, &ctor) {
            (TokenKind::MaticBridged, CtorParams::ChildChainManager(_)) => {}
            (TokenKind::MaticBridged, CtorParams::None) => {
                return Err(TokenError::InvalidArgument(
                    "MaticBridgedSuperToken needs a child chain manager".to_string(),
                ));
            }
            (_, CtorParams::None) => {}
            (kind, CtorParams::ChildChainManager(_)) => {
                return Err(TokenError::InvalidArgument(format!(
                    "{} takes no constructor arguments",
                    kind
                )));
            }
        }

        Ok(Self {
            address,
            kind,
            deployer,
            ctor,
            lifecycle: ProxyLifecycle::Deployed,
            metadata: None,
            variant: None,
            balances: BTreeMap::new(),
            total_supply: 0,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn deployer(&self) -> &Address {
        &self.deployer
    }

    pub fn lifecycle(&self) -> ProxyLifecycle {
        self.lifecycle
    }

    pub fn metadata(&self) -> Option<&TokenMetadata> {
        self.metadata.as_ref()
    }

    pub fn variant(&self) -> Option<&VariantState> {
        self.variant.as_ref()
    }

    /// Minted supply, not counting emission of mint-source flows
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            address: self.address,
            kind: self.kind,
            deployer: self.deployer,
            lifecycle: self.lifecycle,
            metadata: self.metadata.clone(),
            total_supply: self.total_supply,
            owner: self.owner(),
        }
    }

    /// Register the proxy with a factory. Only the deployer may do this, and
    /// only once.
    pub fn register(
        &mut self,
        caller: &Address,
        factory: Address,
        logic: Address,
    ) -> Result<(), TokenError> {
        if self.lifecycle != ProxyLifecycle::Deployed {
            return Err(TokenError::AlreadyRegistered(self.address));
        }
        if caller != &self.deployer {
            return Err(TokenError::unauthorized(*caller, "register this proxy"));
        }

        self.lifecycle = ProxyLifecycle::Registered { factory, logic };
        Ok(())
    }

    /// Initialize the proxy. Succeeds at most once per proxy.
    ///
    /// The already-initialized check runs before anything else so that a
    /// second call fails the same way whatever its arguments or caller.
    pub fn initialize(&mut self, caller: &Address, params: &InitParams) -> Result<(), TokenError> {
        let registered_factory = match self.lifecycle {
            ProxyLifecycle::Active { .. } => {
                return Err(TokenError::AlreadyInitialized(self.address));
            }
            ProxyLifecycle::Deployed => return Err(TokenError::NotRegistered(self.address)),
            ProxyLifecycle::Registered { factory, .. } => factory,
        };

        if params.factory != registered_factory {
            return Err(TokenError::FactoryMismatch {
                registered: registered_factory,
                given: params.factory,
            });
        }
        if caller != &self.deployer {
            return Err(TokenError::unauthorized(*caller, "initialize this proxy"));
        }
        if params.variant.kind() != self.kind {
            return Err(TokenError::InvalidArgument(format!(
                "{} cannot be initialized with {} parameters",
                self.kind,
                params.variant.kind()
            )));
        }
        if params.name.trim().is_empty() || params.symbol.trim().is_empty() {
            return Err(TokenError::InvalidArgument(
                "name and symbol must not be empty".to_string(),
            ));
        }

        let (variant, initial_mint) = match &params.variant {
            VariantInit::Burnable {
                initial_supply,
                receiver,
                ..
            } => (VariantState::Burnable, Some((*receiver, *initial_supply))),
            VariantInit::Mintable => (VariantState::Mintable { owner: *caller }, None),
            VariantInit::BurnMint {
                initial_supply,
                receiver,
                ..
            } => (
                VariantState::BurnMint { owner: *caller },
                Some((*receiver, *initial_supply)),
            ),
            VariantInit::Capped { max_supply } => (
                VariantState::Capped {
                    owner: *caller,
                    max_supply: *max_supply,
                },
                None,
            ),
            VariantInit::MaticBridged => {
                let child_chain_manager = match self.ctor {
                    CtorParams::ChildChainManager(manager) => manager,
                    CtorParams::None => {
                        return Err(TokenError::InvalidArgument(
                            "missing child chain manager".to_string(),
                        ))
                    }
                };
                (
                    VariantState::MaticBridged {
                        child_chain_manager,
                        governance: self.deployer,
                    },
                    None,
                )
            }
            VariantInit::MultiMint {
                ida,
                share_issuer,
                mint_interval,
                mint_amount,
            } => (
                VariantState::MultiMint {
                    ida: *ida,
                    share_issuer: *share_issuer,
                    mint_interval: *mint_interval,
                    mint_amount: *mint_amount,
                    last_mint: None,
                },
                None,
            ),
            VariantInit::StreamFromMint {
                cfa,
                receiver,
                flow_rate,
            } => {
                if *flow_rate <= 0 {
                    return Err(TokenError::InvalidFlow(
                        "mint flow rate must be positive".to_string(),
                    ));
                }
                (
                    VariantState::StreamFromMint {
                        cfa: *cfa,
                        receiver: *receiver,
                        flow_rate: *flow_rate,
                    },
                    None,
                )
            }
            VariantInit::Pure {
                initial_supply,
                receiver,
            } => (VariantState::Pure, Some((*receiver, *initial_supply))),
        };

        self.metadata = Some(TokenMetadata {
            name: params.name.clone(),
            symbol: params.symbol.clone(),
            decimals: DECIMALS,
        });
        self.variant = Some(variant);
        self.lifecycle = ProxyLifecycle::Active {
            factory: registered_factory,
        };

        if let Some((receiver, amount)) = initial_mint {
            if amount > 0 {
                self.mint_unchecked(&receiver, amount)?;
            }
        }

        Ok(())
    }

    /// Reject economic operations until the proxy is initialized
    pub fn ensure_active(&self) -> Result<(), TokenError> {
        if self.lifecycle.is_active() {
            Ok(())
        } else {
            Err(TokenError::NotInitialized(self.address))
        }
    }

    pub fn static_balance(&self, account: &Address) -> i128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Whether `account` may go negative: the token contract of a
    /// stream-from-mint token pays its mint flow out of nothing
    pub fn is_mint_source(&self, account: &Address) -> bool {
        self.kind == TokenKind::StreamFromMint && account == &self.address
    }

    /// Adjust a static balance by a signed delta. Used by agreements when
    /// settling accrued flow amounts.
    pub fn adjust_balance(&mut self, account: &Address, delta: i128) -> Result<(), TokenError> {
        let balance = self.balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(delta)
            .ok_or_else(|| TokenError::Overflow("balance".to_string()))?;
        Ok(())
    }

    pub fn owner(&self) -> Option<Address> {
        match self.variant.as_ref()? {
            VariantState::Mintable { owner }
            | VariantState::BurnMint { owner }
            | VariantState::Capped { owner, .. } => Some(*owner),
            VariantState::MaticBridged { governance, .. } => Some(*governance),
            _ => None,
        }
    }

    /// Mint on behalf of `caller`, enforcing owner permission and supply cap
    pub fn mint(&mut self, caller: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ensure_active()?;
        if !self.kind.is_owner_mintable() {
            return Err(TokenError::unsupported(self.kind, "mint"));
        }
        if self.owner().as_ref() != Some(caller) {
            return Err(TokenError::unauthorized(*caller, "mint"));
        }
        if let Some(VariantState::Capped { max_supply, .. }) = &self.variant {
            let requested = self
                .total_supply
                .checked_add(amount)
                .ok_or_else(|| TokenError::Overflow("total supply".to_string()))?;
            if requested > *max_supply {
                return Err(TokenError::SupplyCapExceeded {
                    cap: *max_supply,
                    requested,
                });
            }
        }
        self.mint_unchecked(to, amount)
    }

    /// Mint without permission checks; callers enforce their own rules
    pub fn mint_unchecked(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let delta = to_signed(amount)?;
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| TokenError::Overflow("total supply".to_string()))?;
        self.adjust_balance(to, delta)
    }

    /// Burn from the static balance of `from`. The caller must settle
    /// flows first so the static balance is current.
    pub fn burn(&mut self, from: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ensure_active()?;
        self.require_balance(from, amount)?;
        let delta = to_signed(amount)?;
        self.total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or_else(|| TokenError::Overflow("total supply".to_string()))?;
        self.adjust_balance(from, -delta)
    }

    /// Move tokens between static balances
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ensure_active()?;
        self.require_balance(from, amount)?;
        let delta = to_signed(amount)?;
        self.adjust_balance(from, -delta)?;
        self.adjust_balance(to, delta)
    }

    fn require_balance(&self, account: &Address, amount: Amount) -> Result<(), TokenError> {
        let balance = self.static_balance(account);
        if self.is_mint_source(account) {
            return Ok(());
        }
        if balance < 0 || (balance as u128) < amount {
            return Err(TokenError::InsufficientBalance {
                account: *account,
                balance,
                needed: amount,
            });
        }
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), TokenError> {
        self.ensure_active()?;
        let kind = self.kind;
        match self.variant.as_mut() {
            Some(VariantState::Mintable { owner })
            | Some(VariantState::BurnMint { owner })
            | Some(VariantState::Capped { owner, .. }) => {
                if owner != caller {
                    return Err(TokenError::unauthorized(*caller, "transfer ownership"));
                }
                *owner = new_owner;
                Ok(())
            }
            _ => Err(TokenError::unsupported(kind, "transfer ownership")),
        }
    }

    /// Bridge deposit: only the child chain manager may credit users
    pub fn deposit(&mut self, caller: &Address, user: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ensure_active()?;
        match &self.variant {
            Some(VariantState::MaticBridged {
                child_chain_manager,
                ..
            }) => {
                if child_chain_manager != caller {
                    return Err(TokenError::unauthorized(*caller, "deposit"));
                }
            }
            _ => return Err(TokenError::unsupported(self.kind, "deposit")),
        }
        self.mint_unchecked(user, amount)
    }

    pub fn update_child_chain_manager(
        &mut self,
        caller: &Address,
        new_manager: Address,
    ) -> Result<(), TokenError> {
        self.ensure_active()?;
        let kind = self.kind;
        match self.variant.as_mut() {
            Some(VariantState::MaticBridged {
                child_chain_manager,
                governance,
            }) => {
                if governance != caller {
                    return Err(TokenError::unauthorized(*caller, "update the child chain manager"));
                }
                *child_chain_manager = new_manager;
                Ok(())
            }
            _ => Err(TokenError::unsupported(kind, "update the child chain manager")),
        }
    }

    /// Check that the multi-mint interval has elapsed and record a mint at `now`.
    /// Returns the amount to mint and distribute.
    pub fn record_periodic_mint(&mut self, now: Timestamp) -> Result<(Address, Amount), TokenError> {
        self.ensure_active()?;
        let kind = self.kind;
        match self.variant.as_mut() {
            Some(VariantState::MultiMint {
                ida,
                mint_interval,
                mint_amount,
                last_mint,
                ..
            }) => {
                if let Some(last) = last_mint {
                    let next = last.saturating_add(*mint_interval);
                    if now < next {
                        return Err(TokenError::MintIntervalNotElapsed { next });
                    }
                }
                *last_mint = Some(now);
                Ok((*ida, *mint_amount))
            }
            _ => Err(TokenError::unsupported(kind, "periodic mint")),
        }
    }
}

/// Convert an unsigned amount to a signed balance delta
pub fn to_signed(amount: Amount) -> Result<i128, TokenError> {
    i128::try_from(amount).map_err(|_| TokenError::Overflow("amount".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn factory() -> Address {
        Address::from_label("factory")
    }

    fn registered(kind: TokenKind, ctor: CtorParams) -> SuperTokenState {
        let mut token =
            SuperTokenState::deployed(Address::create(&alice(), 0), kind, alice(), ctor).unwrap();
        token
            .register(&alice(), factory(), Address::from_label("logic"))
            .unwrap();
        token
    }

    fn burnable_params(name: &str, symbol: &str, supply: Amount) -> InitParams {
        InitParams::new(
            name,
            symbol,
            factory(),
            VariantInit::Burnable {
                initial_supply: supply,
                receiver: alice(),
                user_data: vec![],
            },
        )
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in TokenKind::ALL {
            assert_eq!(kind.contract_name().parse::<TokenKind>().unwrap(), kind);
        }
        assert_eq!(
            "MaticBridgedPureSuperTokenProxy".parse::<TokenKind>().unwrap(),
            TokenKind::MaticBridged
        );
        assert!("ERC20".parse::<TokenKind>().is_err());
    }

    #[test]
    fn test_ctor_params_are_checked() {
        let address = Address::create(&alice(), 0);
        assert!(SuperTokenState::deployed(address, TokenKind::MaticBridged, alice(), CtorParams::None).is_err());
        assert!(SuperTokenState::deployed(
            address,
            TokenKind::Mintable,
            alice(),
            CtorParams::ChildChainManager(bob())
        )
        .is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut token = SuperTokenState::deployed(
            Address::create(&alice(), 0),
            TokenKind::Burnable,
            alice(),
            CtorParams::None,
        )
        .unwrap();
        assert_eq!(token.lifecycle(), ProxyLifecycle::Deployed);

        // Initialize before registration is rejected
        assert_eq!(
            token.initialize(&alice(), &burnable_params("Token", "TKN", 10)),
            Err(TokenError::NotRegistered(*token.address()))
        );

        token
            .register(&alice(), factory(), Address::from_label("logic"))
            .unwrap();
        let registered = token.lifecycle();

        // Second registration leaves the state as it was
        assert_eq!(
            token.register(&alice(), Address::from_label("other"), Address::ZERO),
            Err(TokenError::AlreadyRegistered(*token.address()))
        );
        assert_eq!(token.lifecycle(), registered);

        token
            .initialize(&alice(), &burnable_params("Token", "TKN", 10))
            .unwrap();
        assert_eq!(token.lifecycle(), ProxyLifecycle::Active { factory: factory() });
        assert_eq!(token.static_balance(&alice()), 10);
        assert_eq!(token.total_supply(), 10);
    }

    #[test]
    fn test_only_deployer_registers() {
        let mut token = SuperTokenState::deployed(
            Address::create(&alice(), 0),
            TokenKind::Mintable,
            alice(),
            CtorParams::None,
        )
        .unwrap();
        assert!(matches!(
            token.register(&bob(), factory(), Address::ZERO),
            Err(TokenError::Unauthorized { .. })
        ));
        assert_eq!(token.lifecycle(), ProxyLifecycle::Deployed);
    }

    #[test]
    fn test_second_initialize_fails_and_keeps_metadata() {
        let mut token = registered(TokenKind::Burnable, CtorParams::None);
        token
            .initialize(&alice(), &burnable_params("Super Juicy Token", "SJT", 100))
            .unwrap();

        // Different parameters and a different caller fail the same way
        let again = burnable_params("Not Super Juicy Token", "NSJT", 1);
        assert_eq!(
            token.initialize(&alice(), &again),
            Err(TokenError::AlreadyInitialized(*token.address()))
        );
        assert_eq!(
            token.initialize(&bob(), &again),
            Err(TokenError::AlreadyInitialized(*token.address()))
        );

        let metadata = token.metadata().unwrap();
        assert_eq!(metadata.name, "Super Juicy Token");
        assert_eq!(metadata.symbol, "SJT");
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_initialize_guards() {
        let mut token = registered(TokenKind::Mintable, CtorParams::None);

        let wrong_factory = InitParams::new("T", "T", Address::from_label("other"), VariantInit::Mintable);
        assert!(matches!(
            token.initialize(&alice(), &wrong_factory),
            Err(TokenError::FactoryMismatch { .. })
        ));

        let by_bob = InitParams::new("T", "T", factory(), VariantInit::Mintable);
        assert!(matches!(
            token.initialize(&bob(), &by_bob),
            Err(TokenError::Unauthorized { .. })
        ));

        let wrong_variant = InitParams::new("T", "T", factory(), VariantInit::MaticBridged);
        assert!(matches!(
            token.initialize(&alice(), &wrong_variant),
            Err(TokenError::InvalidArgument(_))
        ));

        let empty_name = InitParams::new(" ", "T", factory(), VariantInit::Mintable);
        assert!(matches!(
            token.initialize(&alice(), &empty_name),
            Err(TokenError::InvalidArgument(_))
        ));

        // None of the failures moved the lifecycle
        assert!(matches!(token.lifecycle(), ProxyLifecycle::Registered { .. }));
    }

    #[test]
    fn test_economic_operations_need_activation() {
        let mut token = registered(TokenKind::Mintable, CtorParams::None);
        let address = *token.address();

        assert_eq!(token.mint(&alice(), &alice(), 1), Err(TokenError::NotInitialized(address)));
        assert_eq!(token.burn(&alice(), 0), Err(TokenError::NotInitialized(address)));
        assert_eq!(
            token.transfer(&alice(), &bob(), 0),
            Err(TokenError::NotInitialized(address))
        );
        assert_eq!(
            token.transfer_ownership(&alice(), bob()),
            Err(TokenError::NotInitialized(address))
        );
    }

    #[test]
    fn test_owner_mint_and_ownership() {
        let mut token = registered(TokenKind::Mintable, CtorParams::None);
        token
            .initialize(&alice(), &InitParams::new("T", "T", factory(), VariantInit::Mintable))
            .unwrap();

        token.mint(&alice(), &bob(), to_wad(100)).unwrap();
        assert_eq!(token.static_balance(&bob()), to_wad(100) as i128);

        assert!(matches!(
            token.mint(&bob(), &bob(), 1),
            Err(TokenError::Unauthorized { .. })
        ));
        assert!(matches!(
            token.transfer_ownership(&bob(), bob()),
            Err(TokenError::Unauthorized { .. })
        ));

        token.transfer_ownership(&alice(), bob()).unwrap();
        assert_eq!(token.owner(), Some(bob()));
        token.mint(&bob(), &bob(), 1).unwrap();
        assert_eq!(token.total_supply(), to_wad(100) + 1);
    }

    #[test]
    fn test_capped_mint() {
        let mut token = registered(TokenKind::Capped, CtorParams::None);
        token
            .initialize(
                &alice(),
                &InitParams::new("T", "T", factory(), VariantInit::Capped { max_supply: 100 }),
            )
            .unwrap();

        token.mint(&alice(), &alice(), 60).unwrap();
        assert_eq!(
            token.mint(&alice(), &bob(), 41),
            Err(TokenError::SupplyCapExceeded {
                cap: 100,
                requested: 101
            })
        );
        token.mint(&alice(), &bob(), 40).unwrap();
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_burn_and_transfer_need_balance() {
        let mut token = registered(TokenKind::Burnable, CtorParams::None);
        token
            .initialize(&alice(), &burnable_params("T", "T", 50))
            .unwrap();

        assert!(matches!(
            token.transfer(&alice(), &bob(), 51),
            Err(TokenError::InsufficientBalance { .. })
        ));
        token.transfer(&alice(), &bob(), 20).unwrap();
        token.burn(&bob(), 20).unwrap();
        assert_eq!(token.static_balance(&bob()), 0);
        assert_eq!(token.total_supply(), 30);
    }

    #[test]
    fn test_bridge_permissions() {
        let manager = Address::from_label("chain manager");
        let mut token = registered(TokenKind::MaticBridged, CtorParams::ChildChainManager(manager));
        token
            .initialize(&alice(), &InitParams::new("MBT", "MBT", factory(), VariantInit::MaticBridged))
            .unwrap();

        assert!(matches!(
            token.deposit(&bob(), &bob(), 3),
            Err(TokenError::Unauthorized { .. })
        ));
        token.deposit(&manager, &bob(), 3).unwrap();
        assert_eq!(token.static_balance(&bob()), 3);

        assert!(matches!(
            token.update_child_chain_manager(&bob(), bob()),
            Err(TokenError::Unauthorized { .. })
        ));
        token.update_child_chain_manager(&alice(), bob()).unwrap();
        token.deposit(&bob(), &bob(), 1).unwrap();
        assert_eq!(token.total_supply(), 4);
    }

    #[test]
    fn test_periodic_mint_interval() {
        let mut token = registered(TokenKind::MultiMint, CtorParams::None);
        let ida = Address::from_label("ida");
        token
            .initialize(
                &alice(),
                &InitParams::new(
                    "T",
                    "T",
                    factory(),
                    VariantInit::MultiMint {
                        ida,
                        share_issuer: alice(),
                        mint_interval: 86_400,
                        mint_amount: 100,
                    },
                ),
            )
            .unwrap();

        assert_eq!(token.record_periodic_mint(1_000).unwrap(), (ida, 100));
        assert_eq!(
            token.record_periodic_mint(2_000),
            Err(TokenError::MintIntervalNotElapsed { next: 87_400 })
        );
        assert!(token.record_periodic_mint(87_400).is_ok());
    }
}

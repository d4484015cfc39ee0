use crate::args::{build_ctor_params, parse_init_args};
use crate::config::DeployConfig;
use crate::error::DeployError;
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use supertoken_chain::Runtime;
use supertoken_core::{
    Address, Amount, BlockNumber, Call, ChainError, CtorParams, InitParams, ProxyLifecycle,
    Timestamp, TokenError, TokenKind, TokenMetadata, TransactionReceipt, VariantInit,
};

/// One transaction of the activation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStep {
    Deploy,
    Register,
    Initialize,
}

impl fmt::Display for ActivationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActivationStep::Deploy => "deploy",
            ActivationStep::Register => "register",
            ActivationStep::Initialize => "initialize",
        })
    }
}

/// Where a proxy stands in the activation sequence, as seen by the deployer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActivationState {
    Uninitialized,
    Deployed { proxy: Address },
    Registered { proxy: Address },
    Active { proxy: Address },
}

impl ActivationState {
    pub fn proxy(&self) -> Option<Address> {
        match self {
            ActivationState::Uninitialized => None,
            ActivationState::Deployed { proxy }
            | ActivationState::Registered { proxy }
            | ActivationState::Active { proxy } => Some(*proxy),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivationState::Uninitialized => "uninitialized",
            ActivationState::Deployed { .. } => "deployed",
            ActivationState::Registered { .. } => "registered",
            ActivationState::Active { .. } => "active",
        }
    }

    /// The state after `step` completed for `proxy`. Steps must come in
    /// order and all concern the proxy the deploy step created.
    pub fn advance(self, step: ActivationStep, proxy: Address) -> Result<Self, DeployError> {
        match (self, step) {
            (ActivationState::Uninitialized, ActivationStep::Deploy) => {
                Ok(ActivationState::Deployed { proxy })
            }
            (ActivationState::Deployed { proxy: current }, ActivationStep::Register)
                if current == proxy =>
            {
                Ok(ActivationState::Registered { proxy })
            }
            (ActivationState::Registered { proxy: current }, ActivationStep::Initialize)
                if current == proxy =>
            {
                Ok(ActivationState::Active { proxy })
            }
            (state, step) => Err(DeployError::OutOfOrder {
                step,
                state: state.label().to_string(),
            }),
        }
    }

    pub fn from_lifecycle(proxy: Address, lifecycle: ProxyLifecycle) -> Self {
        match lifecycle {
            ProxyLifecycle::Deployed => ActivationState::Deployed { proxy },
            ProxyLifecycle::Registered { .. } => ActivationState::Registered { proxy },
            ProxyLifecycle::Active { .. } => ActivationState::Active { proxy },
        }
    }
}

/// What to deploy and how to initialize it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPlan {
    pub kind: TokenKind,
    pub ctor: CtorParams,
    pub name: String,
    pub symbol: String,
    pub variant: VariantInit,
}

impl ActivationPlan {
    /// Build a plan from already split constructor and initializer arguments
    pub fn from_args(
        kind: TokenKind,
        ctor_args: &[String],
        init_args: &[String],
    ) -> Result<Self, DeployError> {
        let ctor = build_ctor_params(kind, ctor_args)?;
        let (name, symbol, variant) = parse_init_args(kind, init_args)?;
        Ok(Self {
            kind,
            ctor,
            name,
            symbol,
            variant,
        })
    }

    pub fn init_params(&self, factory: Address) -> InitParams {
        InitParams::new(self.name.clone(), self.symbol.clone(), factory, self.variant.clone())
    }
}

/// A mined step of the sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReceipt {
    pub step: ActivationStep,
    pub transaction_hash: String,
    pub block_number: BlockNumber,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub chain_id: u64,
    pub contract: TokenKind,
    pub proxy: Address,
    pub factory: Address,
    pub state: ActivationState,
    pub steps: Vec<StepReceipt>,
}

/// A past transaction that touched a proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub transaction_hash: String,
    pub call: String,
    pub block_number: BlockNumber,
    pub timestamp: Timestamp,
    pub success: bool,
    pub error: Option<String>,
}

/// Everything the chain knows about a proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub proxy: Address,
    pub contract: TokenKind,
    pub deployer: Address,
    pub state: ActivationState,
    pub factory: Option<Address>,
    pub metadata: Option<TokenMetadata>,
    pub total_supply: Amount,
    pub owner: Option<Address>,
    pub history: Vec<HistoryEntry>,
}

/// Look up a proxy and its transaction history
pub fn proxy_status<R: Runtime>(runtime: &R, proxy: &Address) -> Option<ProxyStatus> {
    let info = runtime.token_info(proxy)?;
    let factory = match info.lifecycle {
        ProxyLifecycle::Deployed => None,
        ProxyLifecycle::Registered { factory, .. } | ProxyLifecycle::Active { factory } => Some(factory),
    };
    let history = runtime
        .receipts_for_contract(proxy)
        .into_iter()
        .map(|receipt| HistoryEntry {
            transaction_hash: receipt.hash_hex(),
            call: runtime
                .get_transaction(&receipt.transaction_hash)
                .map(|transaction| transaction.call.name().to_string())
                .unwrap_or_default(),
            block_number: receipt.block_number,
            timestamp: receipt.timestamp,
            success: receipt.success,
            error: receipt.error.map(|error| error.to_string()),
        })
        .collect();

    Some(ProxyStatus {
        proxy: *proxy,
        contract: info.kind,
        deployer: info.deployer,
        state: ActivationState::from_lifecycle(*proxy, info.lifecycle),
        factory,
        metadata: info.metadata,
        total_supply: info.total_supply,
        owner: info.owner,
        history,
    })
}

/// Drives a proxy through deploy, register and initialize.
///
/// Every step waits for its transaction to be mined before the next one is
/// sent. A rejected step stops the sequence; earlier steps stay on chain.
pub struct ActivationSequencer<R: Runtime> {
    runtime: R,
    deployer: Address,
    factory: Option<Address>,
}

impl<R: Runtime> ActivationSequencer<R> {
    pub fn new(runtime: R, deployer: Address) -> Self {
        Self {
            runtime,
            deployer,
            factory: None,
        }
    }

    /// Use this factory instead of looking one up
    pub fn with_factory(mut self, factory: Address) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn deployer(&self) -> &Address {
        &self.deployer
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn into_runtime(self) -> R {
        self.runtime
    }

    /// Explicit factory, then the configured one for this chain, then the
    /// host's answer
    pub fn resolve_factory(&self, config: &DeployConfig) -> Result<Address, DeployError> {
        if let Some(factory) = self.factory {
            return Ok(factory);
        }
        let chain_id = self.runtime.chain_id();
        if let Some(factory) = config.factory_for(chain_id) {
            return Ok(factory);
        }
        self.runtime.super_token_factory().ok_or_else(|| {
            DeployError::PreconditionFailure(format!(
                "No SuperTokenFactory address provided or found for chain {}",
                chain_id
            ))
        })
    }

    pub fn activate(
        &mut self,
        config: &DeployConfig,
        plan: &ActivationPlan,
    ) -> Result<ActivationReport, DeployError> {
        let factory = self.resolve_factory(config)?;
        info!("SuperTokenFactory address {}", factory);

        let mut state = ActivationState::Uninitialized;
        let mut steps = Vec::with_capacity(3);

        let receipt = self.step(
            ActivationStep::Deploy,
            Call::DeployToken {
                kind: plan.kind,
                ctor: plan.ctor.clone(),
            },
        )?;
        let proxy = receipt.contract_address.ok_or_else(|| {
            ChainError::Context(anyhow::anyhow!(
                "deploy transaction {} created no contract",
                receipt.hash_hex()
            ))
        })?;
        info!("Proxy deployed at: {}", proxy);
        state = state.advance(ActivationStep::Deploy, proxy)?;
        steps.push(step_receipt(ActivationStep::Deploy, &receipt));

        let receipt = self.step(
            ActivationStep::Register,
            Call::RegisterCustomSuperToken { factory, proxy },
        )?;
        state = state.advance(ActivationStep::Register, proxy)?;
        steps.push(step_receipt(ActivationStep::Register, &receipt));

        let receipt = self.step(
            ActivationStep::Initialize,
            Call::Initialize {
                proxy,
                params: plan.init_params(factory),
            },
        )?;
        state = state.advance(ActivationStep::Initialize, proxy)?;
        steps.push(step_receipt(ActivationStep::Initialize, &receipt));

        info!("All done, token deployed and initialized at: {}", proxy);
        Ok(ActivationReport {
            chain_id: self.runtime.chain_id(),
            contract: plan.kind,
            proxy,
            factory,
            state,
            steps,
        })
    }

    /// Call initialize on a proxy that may already be active. An active
    /// proxy rejects it with [`DeployError::DoubleInitialization`].
    pub fn initialize_again(
        &mut self,
        proxy: Address,
        params: InitParams,
    ) -> Result<TransactionReceipt, DeployError> {
        if self.runtime.proxy_lifecycle(&proxy).is_none() {
            return Err(DeployError::PreconditionFailure(format!(
                "No proxy deployed at {}",
                proxy
            )));
        }
        self.step(ActivationStep::Initialize, Call::Initialize { proxy, params })
    }

    fn step(&mut self, step: ActivationStep, call: Call) -> Result<TransactionReceipt, DeployError> {
        let receipt = self.runtime.send(self.deployer, call)?;
        match &receipt.error {
            None => {
                info!(
                    "{} mined in block {} ({})",
                    step,
                    receipt.block_number,
                    receipt.hash_hex()
                );
                Ok(receipt)
            }
            Some(error) => {
                warn!("{} reverted in {}: {}", step, receipt.hash_hex(), error);
                match error {
                    TokenError::AlreadyInitialized(proxy) => {
                        Err(DeployError::DoubleInitialization(*proxy))
                    }
                    source => Err(DeployError::StepFailed {
                        step,
                        source: source.clone(),
                    }),
                }
            }
        }
    }
}

fn step_receipt(step: ActivationStep, receipt: &TransactionReceipt) -> StepReceipt {
    StepReceipt {
        step,
        transaction_hash: receipt.hash_hex(),
        block_number: receipt.block_number,
        timestamp: receipt.timestamp,
    }
}

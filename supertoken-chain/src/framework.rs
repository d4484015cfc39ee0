use crate::agreements::{ConstantFlowAgreement, InstantDistributionAgreement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use supertoken_core::{Address, Event, SuperTokenState, TokenError};

/// Registrar that binds custom super token proxies to the shared token logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperTokenFactory {
    address: Address,
    logic: Address,
    host: Address,
    registered: BTreeSet<Address>,
}

impl SuperTokenFactory {
    pub fn new(address: Address, logic: Address, host: Address) -> Self {
        Self {
            address,
            logic,
            host,
            registered: BTreeSet::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn host(&self) -> &Address {
        &self.host
    }

    pub fn get_super_token_logic(&self) -> Address {
        self.logic
    }

    pub fn is_registered(&self, proxy: &Address) -> bool {
        self.registered.contains(proxy)
    }

    /// Register a deployed proxy. Only the proxy's deployer may do this and
    /// a proxy can only be registered once; a rejected call changes nothing.
    pub fn initialize_custom_super_token(
        &mut self,
        caller: &Address,
        proxy: &mut SuperTokenState,
    ) -> Result<Event, TokenError> {
        if self.is_registered(proxy.address()) {
            return Err(TokenError::AlreadyRegistered(*proxy.address()));
        }
        proxy.register(caller, self.address, self.logic)?;
        self.registered.insert(*proxy.address());

        Ok(Event::CustomSuperTokenCreated {
            token: *proxy.address(),
        })
    }
}

/// Entry point of the framework; knows where the factory and agreements live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub address: Address,
    pub factory: Address,
    pub cfa: Address,
    pub ida: Address,
    pub governance: Address,
}

impl Host {
    pub fn get_super_token_factory(&self) -> Address {
        self.factory
    }
}

/// Host, factory and both agreements as deployed by one transaction
#[derive(Debug, Clone)]
pub struct Framework {
    pub host: Host,
    pub factory: SuperTokenFactory,
    pub cfa: ConstantFlowAgreement,
    pub ida: InstantDistributionAgreement,
}

impl Framework {
    /// Lay out the framework contracts the way a deployment by `admin` at
    /// `nonce` would create them: the host first, then everything it creates.
    pub fn deploy(admin: &Address, nonce: u64) -> Self {
        let host_address = Address::create(admin, nonce);
        let factory_address = Address::create(&host_address, 0);
        let logic = Address::create(&factory_address, 0);
        let cfa_address = Address::create(&host_address, 1);
        let ida_address = Address::create(&host_address, 2);

        Self {
            host: Host {
                address: host_address,
                factory: factory_address,
                cfa: cfa_address,
                ida: ida_address,
                governance: *admin,
            },
            factory: SuperTokenFactory::new(factory_address, logic, host_address),
            cfa: ConstantFlowAgreement::new(cfa_address),
            ida: InstantDistributionAgreement::new(ida_address),
        }
    }

    /// Every address the framework occupies
    pub fn addresses(&self) -> [Address; 5] {
        [
            self.host.address,
            self.host.factory,
            self.factory.get_super_token_logic(),
            self.host.cfa,
            self.host.ida,
        ]
    }

    pub fn event(&self) -> Event {
        Event::FrameworkDeployed {
            host: self.host.address,
            factory: self.host.factory,
            cfa: self.host.cfa,
            ida: self.host.ida,
        }
    }
}

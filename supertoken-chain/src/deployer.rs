use crate::framework::SuperTokenFactory;
use supertoken_core::{
    packed_salt, Address, Amount, CtorParams, Event, InitParams, SuperTokenState, TokenError,
    TokenKind, VariantInit,
};

/// Contract that deploys, registers and initializes a pure super token in a
/// single call.
///
/// Tokens land at `create2(deployer, sha256(name . sender . symbol))`, so the
/// same sender cannot create the same name and symbol twice. A mintable
/// deployer creates owner-mintable tokens and hands ownership to the
/// receiver instead of minting an initial supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PureSuperTokenDeployer {
    pub address: Address,
    pub factory: Address,
    pub mintable: bool,
}

impl PureSuperTokenDeployer {
    pub fn new(address: Address, factory: Address, mintable: bool) -> Self {
        Self {
            address,
            factory,
            mintable,
        }
    }

    pub fn contract_name(&self) -> &'static str {
        if self.mintable {
            "MintablePureSuperTokenDeployer"
        } else {
            "PureSuperTokenDeployer"
        }
    }

    /// Where a token created by `sender` with this name and symbol lands
    pub fn token_address(&self, sender: &Address, name: &str, symbol: &str) -> Address {
        Address::create2(&self.address, &packed_salt(name, sender, symbol))
    }

    /// Build the fully initialized token. The caller checks that the target
    /// address is free and stores the result.
    pub fn deploy_super_token(
        &self,
        factory: &mut SuperTokenFactory,
        sender: &Address,
        name: &str,
        symbol: &str,
        receiver: Address,
        initial_supply: Amount,
    ) -> Result<(SuperTokenState, Vec<Event>), TokenError> {
        if factory.address() != &self.factory {
            return Err(TokenError::FactoryMismatch {
                registered: self.factory,
                given: *factory.address(),
            });
        }
        if self.mintable && initial_supply != 0 {
            return Err(TokenError::InvalidArgument(
                "mintable tokens start without supply".to_string(),
            ));
        }

        let address = self.token_address(sender, name, symbol);
        let (kind, variant) = if self.mintable {
            (TokenKind::Mintable, VariantInit::Mintable)
        } else {
            (
                TokenKind::Pure,
                VariantInit::Pure {
                    initial_supply,
                    receiver,
                },
            )
        };

        let mut token = SuperTokenState::deployed(address, kind, self.address, CtorParams::None)?;
        let mut events = vec![factory.initialize_custom_super_token(&self.address, &mut token)?];
        token.initialize(
            &self.address,
            &InitParams::new(name, symbol, self.factory, variant),
        )?;
        events.push(Event::Initialized {
            token: address,
            name: name.to_string(),
            symbol: symbol.to_string(),
        });

        if self.mintable {
            token.transfer_ownership(&self.address, receiver)?;
            events.push(Event::OwnershipTransferred {
                token: address,
                previous_owner: self.address,
                new_owner: receiver,
            });
        } else if initial_supply > 0 {
            events.push(Event::Transfer {
                token: address,
                from: Address::ZERO,
                to: receiver,
                amount: initial_supply,
            });
        }
        events.push(Event::SuperTokenCreated { token: address });

        Ok((token, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supertoken_core::{to_wad, ProxyLifecycle};

    fn factory() -> SuperTokenFactory {
        let host = Address::from_label("host");
        SuperTokenFactory::new(Address::create(&host, 0), Address::from_label("logic"), host)
    }

    #[test]
    fn test_pure_deploy() {
        let mut factory = factory();
        let deployer = PureSuperTokenDeployer::new(Address::from_label("deployer"), *factory.address(), false);
        let alice = Address::from_label("alice");

        let (token, events) = deployer
            .deploy_super_token(&mut factory, &alice, "Super Juicy Token", "SJT", alice, to_wad(1_000))
            .unwrap();

        assert_eq!(token.address(), &deployer.token_address(&alice, "Super Juicy Token", "SJT"));
        assert_eq!(token.static_balance(&alice), to_wad(1_000) as i128);
        assert!(matches!(token.lifecycle(), ProxyLifecycle::Active { .. }));
        assert!(factory.is_registered(token.address()));
        assert_eq!(
            events.last(),
            Some(&Event::SuperTokenCreated {
                token: *token.address()
            })
        );
    }

    #[test]
    fn test_mintable_deploy_hands_over_ownership() {
        let mut factory = factory();
        let deployer = PureSuperTokenDeployer::new(Address::from_label("deployer"), *factory.address(), true);
        let alice = Address::from_label("alice");

        assert!(matches!(
            deployer.deploy_super_token(&mut factory, &alice, "Mint", "MNT", alice, 1),
            Err(TokenError::InvalidArgument(_))
        ));

        let (token, _) = deployer
            .deploy_super_token(&mut factory, &alice, "Mint", "MNT", alice, 0)
            .unwrap();
        assert_eq!(token.owner(), Some(alice));
        assert_eq!(token.total_supply(), 0);
    }

    #[test]
    fn test_wrong_factory_is_rejected() {
        let mut factory = factory();
        let deployer =
            PureSuperTokenDeployer::new(Address::from_label("deployer"), Address::from_label("elsewhere"), false);
        let alice = Address::from_label("alice");

        assert!(matches!(
            deployer.deploy_super_token(&mut factory, &alice, "T", "T", alice, 0),
            Err(TokenError::FactoryMismatch { .. })
        ));
    }
}

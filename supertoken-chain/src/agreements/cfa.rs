use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use supertoken_core::{Address, Event, FlowRate, SuperTokenState, Timestamp, TokenError};

/// A constant flow between two accounts of one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowData {
    pub flow_rate: FlowRate,
    /// When the flow was last created or updated
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AccountFlowState {
    net_flow: FlowRate,
    settled_at: Timestamp,
}

/// Constant flow agreement.
///
/// Flows never touch token balances directly. Each account carries a net
/// flow rate and the time it was last settled; its realtime balance is the
/// static balance plus `net_flow * (now - settled_at)`. Both parties are
/// settled into their static balances before any flow involving them changes.
#[derive(Debug, Clone)]
pub struct ConstantFlowAgreement {
    address: Address,
    flows: BTreeMap<(Address, Address, Address), FlowData>,
    accounts: BTreeMap<(Address, Address), AccountFlowState>,
}

impl ConstantFlowAgreement {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            flows: BTreeMap::new(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn get_flow(&self, token: &Address, sender: &Address, receiver: &Address) -> Option<FlowData> {
        self.flows.get(&(*token, *sender, *receiver)).copied()
    }

    pub fn net_flow(&self, token: &Address, account: &Address) -> FlowRate {
        self.accounts
            .get(&(*token, *account))
            .map(|state| state.net_flow)
            .unwrap_or(0)
    }

    /// Amount accrued by `account` since it was last settled
    pub fn accrued(&self, token: &Address, account: &Address, now: Timestamp) -> i128 {
        match self.accounts.get(&(*token, *account)) {
            Some(state) => {
                let elapsed = now.saturating_sub(state.settled_at) as i128;
                state.net_flow.saturating_mul(elapsed)
            }
            None => 0,
        }
    }

    pub fn realtime_balance(&self, state: &SuperTokenState, account: &Address, now: Timestamp) -> i128 {
        state
            .static_balance(account)
            .saturating_add(self.accrued(state.address(), account, now))
    }

    /// Move the accrued amount of `account` into its static balance
    pub fn settle(
        &mut self,
        state: &mut SuperTokenState,
        account: &Address,
        now: Timestamp,
    ) -> Result<(), TokenError> {
        let accrued = self.accrued(state.address(), account, now);
        if accrued != 0 {
            state.adjust_balance(account, accrued)?;
        }
        if let Some(account_state) = self.accounts.get_mut(&(*state.address(), *account)) {
            account_state.settled_at = now;
        }
        Ok(())
    }

    pub fn create_flow(
        &mut self,
        state: &mut SuperTokenState,
        sender: &Address,
        receiver: &Address,
        flow_rate: FlowRate,
        now: Timestamp,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        if flow_rate <= 0 {
            return Err(TokenError::InvalidFlow("flow rate must be positive".to_string()));
        }
        if sender == receiver {
            return Err(TokenError::InvalidFlow("sender and receiver are the same".to_string()));
        }
        if receiver.is_zero() {
            return Err(TokenError::InvalidFlow("receiver is the zero address".to_string()));
        }
        let token = *state.address();
        if self.flows.contains_key(&(token, *sender, *receiver)) {
            return Err(TokenError::FlowExists {
                sender: *sender,
                receiver: *receiver,
            });
        }
        if !state.is_mint_source(sender) && self.realtime_balance(state, sender, now) <= 0 {
            return Err(TokenError::InvalidFlow("sender has no balance to stream".to_string()));
        }

        self.settle(state, sender, now)?;
        self.settle(state, receiver, now)?;
        self.flows.insert(
            (token, *sender, *receiver),
            FlowData {
                flow_rate,
                updated_at: now,
            },
        );
        self.shift_net_flows(&token, sender, receiver, flow_rate, now)?;

        Ok(Event::FlowUpdated {
            token,
            sender: *sender,
            receiver: *receiver,
            flow_rate,
        })
    }

    pub fn update_flow(
        &mut self,
        state: &mut SuperTokenState,
        sender: &Address,
        receiver: &Address,
        flow_rate: FlowRate,
        now: Timestamp,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        if flow_rate <= 0 {
            return Err(TokenError::InvalidFlow("flow rate must be positive".to_string()));
        }
        let token = *state.address();
        let previous = self
            .get_flow(&token, sender, receiver)
            .ok_or(TokenError::FlowNotFound {
                sender: *sender,
                receiver: *receiver,
            })?;

        self.settle(state, sender, now)?;
        self.settle(state, receiver, now)?;
        self.flows.insert(
            (token, *sender, *receiver),
            FlowData {
                flow_rate,
                updated_at: now,
            },
        );
        self.shift_net_flows(&token, sender, receiver, flow_rate - previous.flow_rate, now)?;

        Ok(Event::FlowUpdated {
            token,
            sender: *sender,
            receiver: *receiver,
            flow_rate,
        })
    }

    /// Close a flow. Either party may do so.
    pub fn delete_flow(
        &mut self,
        state: &mut SuperTokenState,
        caller: &Address,
        sender: &Address,
        receiver: &Address,
        now: Timestamp,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        if caller != sender && caller != receiver {
            return Err(TokenError::unauthorized(*caller, "delete this flow"));
        }
        let token = *state.address();
        let previous = self
            .get_flow(&token, sender, receiver)
            .ok_or(TokenError::FlowNotFound {
                sender: *sender,
                receiver: *receiver,
            })?;

        self.settle(state, sender, now)?;
        self.settle(state, receiver, now)?;
        self.flows.remove(&(token, *sender, *receiver));
        self.shift_net_flows(&token, sender, receiver, -previous.flow_rate, now)?;

        Ok(Event::FlowUpdated {
            token,
            sender: *sender,
            receiver: *receiver,
            flow_rate: 0,
        })
    }

    // Both accounts must already be settled at `now`
    fn shift_net_flows(
        &mut self,
        token: &Address,
        sender: &Address,
        receiver: &Address,
        delta: FlowRate,
        now: Timestamp,
    ) -> Result<(), TokenError> {
        for (account, signed) in [(sender, -delta), (receiver, delta)] {
            let entry = self
                .accounts
                .entry((*token, *account))
                .or_insert(AccountFlowState {
                    net_flow: 0,
                    settled_at: now,
                });
            entry.net_flow = entry
                .net_flow
                .checked_add(signed)
                .ok_or_else(|| TokenError::Overflow("net flow".to_string()))?;
            entry.settled_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supertoken_core::{to_wad, CtorParams, InitParams, TokenKind, VariantInit};

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn carol() -> Address {
        Address::from_label("carol")
    }

    fn active_token(supply: u128) -> SuperTokenState {
        let factory = Address::from_label("factory");
        let mut token = SuperTokenState::deployed(
            Address::create(&alice(), 0),
            TokenKind::Burnable,
            alice(),
            CtorParams::None,
        )
        .unwrap();
        token.register(&alice(), factory, Address::ZERO).unwrap();
        token
            .initialize(
                &alice(),
                &InitParams::new(
                    "Super Juicy Token",
                    "SJT",
                    factory,
                    VariantInit::Burnable {
                        initial_supply: supply,
                        receiver: alice(),
                        user_data: vec![],
                    },
                ),
            )
            .unwrap();
        token
    }

    #[test]
    fn test_flow_accrues_over_time() {
        let mut token = active_token(to_wad(1_000));
        let mut cfa = ConstantFlowAgreement::new(Address::from_label("cfa"));
        let rate: FlowRate = 1_000_000_000_000_000; // 0.001 per second

        cfa.create_flow(&mut token, &alice(), &bob(), rate, 100).unwrap();
        assert_eq!(cfa.get_flow(token.address(), &alice(), &bob()).unwrap().flow_rate, rate);
        assert_eq!(cfa.net_flow(token.address(), &alice()), -rate);

        let streamed = rate * 1_000;
        assert_eq!(cfa.realtime_balance(&token, &bob(), 1_100), streamed);
        assert_eq!(
            cfa.realtime_balance(&token, &alice(), 1_100),
            to_wad(1_000) as i128 - streamed
        );

        cfa.delete_flow(&mut token, &bob(), &alice(), &bob(), 1_100).unwrap();
        assert!(cfa.get_flow(token.address(), &alice(), &bob()).is_none());

        // Deleting settled everything into static balances
        assert_eq!(token.static_balance(&bob()), streamed);
        assert_eq!(cfa.realtime_balance(&token, &bob(), 5_000), streamed);
    }

    #[test]
    fn test_update_flow_settles_first() {
        let mut token = active_token(to_wad(10));
        let mut cfa = ConstantFlowAgreement::new(Address::from_label("cfa"));

        cfa.create_flow(&mut token, &alice(), &bob(), 10, 0).unwrap();
        cfa.update_flow(&mut token, &alice(), &bob(), 30, 100).unwrap();

        // 100s at 10/s then 100s at 30/s
        assert_eq!(cfa.realtime_balance(&token, &bob(), 200), 1_000 + 3_000);
        assert_eq!(cfa.net_flow(token.address(), &bob()), 30);
    }

    #[test]
    fn test_flow_validation() {
        let mut token = active_token(to_wad(10));
        let mut cfa = ConstantFlowAgreement::new(Address::from_label("cfa"));

        assert!(matches!(
            cfa.create_flow(&mut token, &alice(), &bob(), 0, 0),
            Err(TokenError::InvalidFlow(_))
        ));
        assert!(matches!(
            cfa.create_flow(&mut token, &alice(), &alice(), 1, 0),
            Err(TokenError::InvalidFlow(_))
        ));
        // Carol holds nothing
        assert!(matches!(
            cfa.create_flow(&mut token, &carol(), &bob(), 1, 0),
            Err(TokenError::InvalidFlow(_))
        ));

        cfa.create_flow(&mut token, &alice(), &bob(), 1, 0).unwrap();
        assert!(matches!(
            cfa.create_flow(&mut token, &alice(), &bob(), 1, 0),
            Err(TokenError::FlowExists { .. })
        ));
        assert!(matches!(
            cfa.delete_flow(&mut token, &carol(), &alice(), &bob(), 10),
            Err(TokenError::Unauthorized { .. })
        ));
        assert!(matches!(
            cfa.update_flow(&mut token, &bob(), &alice(), 5, 10),
            Err(TokenError::FlowNotFound { .. })
        ));
    }

    #[test]
    fn test_flows_need_an_active_token() {
        let mut token = SuperTokenState::deployed(
            Address::create(&alice(), 0),
            TokenKind::Mintable,
            alice(),
            CtorParams::None,
        )
        .unwrap();
        let mut cfa = ConstantFlowAgreement::new(Address::from_label("cfa"));

        assert_eq!(
            cfa.create_flow(&mut token, &alice(), &bob(), 1, 0),
            Err(TokenError::NotInitialized(*token.address()))
        );
    }
}

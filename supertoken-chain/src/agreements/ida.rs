use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use supertoken_core::{Address, Amount, Event, SuperTokenState, TokenError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexData {
    /// Cumulative amount distributed per unit
    pub index_value: u128,
    pub total_units_approved: u128,
    pub total_units_pending: u128,
}

impl IndexData {
    pub fn total_units(&self) -> Result<u128, TokenError> {
        self.total_units_approved
            .checked_add(self.total_units_pending)
            .ok_or_else(|| TokenError::Overflow("index units".to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub units: u128,
    pub approved: bool,
    /// Distributed to this subscription but held until it is approved
    pub pending_distribution: Amount,
}

type IndexKey = (Address, Address, u32);
type SubscriptionKey = (Address, Address, u32, Address);

/// Instant distribution agreement.
///
/// A publisher distributes an amount over the units of an index in one
/// step. Approved subscribers are paid immediately; shares of pending
/// subscribers are held in escrow by the agreement until they approve.
#[derive(Debug, Clone)]
pub struct InstantDistributionAgreement {
    address: Address,
    indices: BTreeMap<IndexKey, IndexData>,
    subscriptions: BTreeMap<SubscriptionKey, SubscriptionData>,
}

impl InstantDistributionAgreement {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            indices: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn get_index(&self, token: &Address, publisher: &Address, index_id: u32) -> Option<IndexData> {
        self.indices.get(&(*token, *publisher, index_id)).copied()
    }

    pub fn get_subscription(
        &self,
        token: &Address,
        publisher: &Address,
        index_id: u32,
        subscriber: &Address,
    ) -> Option<SubscriptionData> {
        self.subscriptions
            .get(&(*token, *publisher, index_id, *subscriber))
            .copied()
    }

    pub fn create_index(
        &mut self,
        state: &SuperTokenState,
        publisher: &Address,
        index_id: u32,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        let key = (*state.address(), *publisher, index_id);
        if self.indices.contains_key(&key) {
            return Err(TokenError::IndexExists {
                publisher: *publisher,
                index_id,
            });
        }
        self.indices.insert(key, IndexData::default());

        Ok(Event::IndexCreated {
            token: *state.address(),
            publisher: *publisher,
            index_id,
        })
    }

    /// Set the units of a subscriber. The index is keyed by `publisher`, so
    /// passing the sender as publisher limits it to its own indexes. The
    /// total units of an index always fit in a `u128`.
    pub fn update_subscription(
        &mut self,
        state: &SuperTokenState,
        publisher: &Address,
        index_id: u32,
        subscriber: &Address,
        units: u128,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        let token = *state.address();
        let index_key = (token, *publisher, index_id);
        let subscription_key = (token, *publisher, index_id, *subscriber);
        let mut index = self.indices.get(&index_key).copied().ok_or(TokenError::IndexNotFound {
            publisher: *publisher,
            index_id,
        })?;
        let mut subscription = self
            .subscriptions
            .get(&subscription_key)
            .copied()
            .unwrap_or_default();

        let total = if subscription.approved {
            &mut index.total_units_approved
        } else {
            &mut index.total_units_pending
        };
        *total = (*total - subscription.units)
            .checked_add(units)
            .ok_or_else(|| TokenError::Overflow("index units".to_string()))?;
        index.total_units()?;
        subscription.units = units;

        self.indices.insert(index_key, index);
        self.subscriptions.insert(subscription_key, subscription);

        Ok(Event::SubscriptionUnitsUpdated {
            token,
            publisher: *publisher,
            index_id,
            subscriber: *subscriber,
            units,
        })
    }

    /// Approve a subscription, releasing anything held for it. A
    /// subscription may be approved before it has any units.
    pub fn approve_subscription(
        &mut self,
        state: &mut SuperTokenState,
        subscriber: &Address,
        publisher: &Address,
        index_id: u32,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        let token = *state.address();
        let index = self
            .indices
            .get_mut(&(token, *publisher, index_id))
            .ok_or(TokenError::IndexNotFound {
                publisher: *publisher,
                index_id,
            })?;
        let subscription = self
            .subscriptions
            .entry((token, *publisher, index_id, *subscriber))
            .or_default();
        if subscription.approved {
            return Err(TokenError::InvalidArgument(
                "subscription already approved".to_string(),
            ));
        }

        if subscription.pending_distribution > 0 {
            state.transfer(&self.address, subscriber, subscription.pending_distribution)?;
        }
        index.total_units_pending -= subscription.units;
        index.total_units_approved = index
            .total_units_approved
            .checked_add(subscription.units)
            .ok_or_else(|| TokenError::Overflow("index units".to_string()))?;
        subscription.approved = true;
        subscription.pending_distribution = 0;

        Ok(Event::SubscriptionApproved {
            token,
            publisher: *publisher,
            index_id,
            subscriber: *subscriber,
        })
    }

    /// Distribute up to `amount` from the publisher's static balance. The
    /// amount actually moved is rounded down to a multiple of the total units.
    pub fn distribute(
        &mut self,
        state: &mut SuperTokenState,
        publisher: &Address,
        index_id: u32,
        amount: Amount,
    ) -> Result<Event, TokenError> {
        state.ensure_active()?;
        let token = *state.address();
        let key = (token, *publisher, index_id);
        let index = self.indices.get(&key).copied().ok_or(TokenError::IndexNotFound {
            publisher: *publisher,
            index_id,
        })?;
        let total_units = index.total_units()?;
        if total_units == 0 {
            return Err(TokenError::NoUnitsIssued { index_id });
        }

        let per_unit = amount / total_units;
        let escrow = self.address;
        for ((t, p, i, subscriber), subscription) in self.subscriptions.iter_mut() {
            if *t != token || p != publisher || *i != index_id || subscription.units == 0 {
                continue;
            }
            let share = per_unit
                .checked_mul(subscription.units)
                .ok_or_else(|| TokenError::Overflow("distribution".to_string()))?;
            if subscription.approved {
                state.transfer(publisher, subscriber, share)?;
            } else {
                state.transfer(publisher, &escrow, share)?;
                subscription.pending_distribution = subscription
                    .pending_distribution
                    .checked_add(share)
                    .ok_or_else(|| TokenError::Overflow("pending distribution".to_string()))?;
            }
        }

        let index_value = index
            .index_value
            .checked_add(per_unit)
            .ok_or_else(|| TokenError::Overflow("index value".to_string()))?;
        if let Some(stored) = self.indices.get_mut(&key) {
            stored.index_value = index_value;
        }

        Ok(Event::IndexUpdated {
            token,
            publisher: *publisher,
            index_id,
            index_value,
        })
    }
}

//! Agreements that move super token balances without per-transfer calls
pub mod cfa;
pub mod ida;

pub use cfa::{ConstantFlowAgreement, FlowData};
pub use ida::{IndexData, InstantDistributionAgreement, SubscriptionData};

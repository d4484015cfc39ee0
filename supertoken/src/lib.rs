//! Custom Super Tokens
//!
//! This crate re-exports the core types, the local chain and the activation
//! sequencer.

pub use supertoken_chain::*;
pub use supertoken_core::*;
pub use supertoken_deploy::*;

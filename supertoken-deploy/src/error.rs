use crate::sequencer::ActivationStep;
use supertoken_core::{Address, ChainError, TokenError};
use thiserror::Error;

/// Failures of a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    /// Something the sequence depends on is missing; nothing was sent
    #[error("Precondition failed: {0}")]
    PreconditionFailure(String),

    /// The proxy rejected a second initialization
    #[error("Proxy {0} is already initialized")]
    DoubleInitialization(Address),

    /// A step was mined but the contract rejected it
    #[error("{step} step failed: {source}")]
    StepFailed {
        step: ActivationStep,
        #[source]
        source: TokenError,
    },

    /// A step was attempted from a state that does not allow it
    #[error("Cannot {step} a proxy that is {state}")]
    OutOfOrder { step: ActivationStep, state: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub mod args;
pub mod config;
pub mod error;
pub mod sequencer;

// Re-export the main types for convenience
pub use args::{build_ctor_params, build_init_params, init_arg_names, parse_init_args, split_args};
pub use config::{DeployConfig, NetworkConfig};
pub use error::DeployError;
pub use sequencer::{
    proxy_status, ActivationPlan, ActivationReport, ActivationSequencer, ActivationState,
    ActivationStep, HistoryEntry, ProxyStatus, StepReceipt,
};

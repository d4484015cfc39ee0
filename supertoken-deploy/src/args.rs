//! Comma-delimited constructor and initializer arguments.
//!
//! Initializer arguments never include the factory; it is resolved
//! separately and passed first to the initialize entry point.

use crate::error::DeployError;
use supertoken_core::{
    Address, Amount, CtorParams, FlowRate, InitParams, TokenKind, VariantInit,
};

/// Split a comma-delimited argument list, trimming every element.
/// Unset or empty input yields no arguments.
pub fn split_args(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => {
            raw.split(',').map(|arg| arg.trim().to_string()).collect()
        }
        _ => Vec::new(),
    }
}

pub fn parse_address(field: &str, value: &str) -> Result<Address, DeployError> {
    value
        .parse()
        .map_err(|e| DeployError::Arguments(format!("{}: {}", field, e)))
}

pub fn parse_amount(field: &str, value: &str) -> Result<Amount, DeployError> {
    value
        .parse()
        .map_err(|_| DeployError::Arguments(format!("{}: '{}' is not an amount", field, value)))
}

pub fn parse_flow_rate(field: &str, value: &str) -> Result<FlowRate, DeployError> {
    value
        .parse()
        .map_err(|_| DeployError::Arguments(format!("{}: '{}' is not a flow rate", field, value)))
}

pub fn parse_seconds(field: &str, value: &str) -> Result<u64, DeployError> {
    value
        .parse()
        .map_err(|_| DeployError::Arguments(format!("{}: '{}' is not a number of seconds", field, value)))
}

/// Hex-encoded bytes with an optional `0x` prefix; `0x` alone is empty
pub fn parse_bytes(field: &str, value: &str) -> Result<Vec<u8>, DeployError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| DeployError::Arguments(format!("{}: {}", field, e)))
}

/// Argument names of the initializer of `kind`, excluding the factory.
/// Names in brackets are optional.
pub fn init_arg_names(kind: TokenKind) -> &'static [&'static str] {
    match kind {
        TokenKind::Burnable | TokenKind::BurnMint => {
            &["name", "symbol", "initial_supply", "receiver", "[user_data]"]
        }
        TokenKind::Mintable | TokenKind::MaticBridged => &["name", "symbol"],
        TokenKind::Capped => &["name", "symbol", "max_supply"],
        TokenKind::MultiMint => &[
            "name",
            "symbol",
            "ida",
            "share_issuer",
            "mint_interval",
            "mint_amount",
        ],
        TokenKind::StreamFromMint => &["name", "symbol", "cfa", "receiver", "flow_rate"],
        TokenKind::Pure => &["name", "symbol", "initial_supply", "receiver"],
    }
}

fn check_count(kind: TokenKind, args: &[String]) -> Result<(), DeployError> {
    let names = init_arg_names(kind);
    let required = names.iter().filter(|name| !name.starts_with('[')).count();
    if args.len() < required || args.len() > names.len() {
        return Err(DeployError::Arguments(format!(
            "{} initializer takes ({}), got {} argument(s)",
            kind,
            names.join(", "),
            args.len()
        )));
    }
    Ok(())
}

pub fn build_ctor_params(kind: TokenKind, args: &[String]) -> Result<CtorParams, DeployError> {
    match (kind, args) {
        (TokenKind::MaticBridged, [manager]) => Ok(CtorParams::ChildChainManager(parse_address(
            "child_chain_manager",
            manager,
        )?)),
        (TokenKind::MaticBridged, _) => Err(DeployError::Arguments(format!(
            "{} constructor takes (child_chain_manager), got {} argument(s)",
            kind,
            args.len()
        ))),
        (_, []) => Ok(CtorParams::None),
        (_, _) => Err(DeployError::Arguments(format!(
            "{} constructor takes no arguments, got {}",
            kind,
            args.len()
        ))),
    }
}

/// Parse initializer arguments into name, symbol and the variant part
pub fn parse_init_args(
    kind: TokenKind,
    args: &[String],
) -> Result<(String, String, VariantInit), DeployError> {
    check_count(kind, args)?;
    let name = args[0].clone();
    let symbol = args[1].clone();

    let variant = match kind {
        TokenKind::Burnable | TokenKind::BurnMint => {
            let initial_supply = parse_amount("initial_supply", &args[2])?;
            let receiver = parse_address("receiver", &args[3])?;
            let user_data = match args.get(4) {
                Some(data) => parse_bytes("user_data", data)?,
                None => Vec::new(),
            };
            if kind == TokenKind::Burnable {
                VariantInit::Burnable {
                    initial_supply,
                    receiver,
                    user_data,
                }
            } else {
                VariantInit::BurnMint {
                    initial_supply,
                    receiver,
                    user_data,
                }
            }
        }
        TokenKind::Mintable => VariantInit::Mintable,
        TokenKind::MaticBridged => VariantInit::MaticBridged,
        TokenKind::Capped => VariantInit::Capped {
            max_supply: parse_amount("max_supply", &args[2])?,
        },
        TokenKind::MultiMint => VariantInit::MultiMint {
            ida: parse_address("ida", &args[2])?,
            share_issuer: parse_address("share_issuer", &args[3])?,
            mint_interval: parse_seconds("mint_interval", &args[4])?,
            mint_amount: parse_amount("mint_amount", &args[5])?,
        },
        TokenKind::StreamFromMint => VariantInit::StreamFromMint {
            cfa: parse_address("cfa", &args[2])?,
            receiver: parse_address("receiver", &args[3])?,
            flow_rate: parse_flow_rate("flow_rate", &args[4])?,
        },
        TokenKind::Pure => VariantInit::Pure {
            initial_supply: parse_amount("initial_supply", &args[2])?,
            receiver: parse_address("receiver", &args[3])?,
        },
    };

    Ok((name, symbol, variant))
}

pub fn build_init_params(
    kind: TokenKind,
    factory: Address,
    args: &[String],
) -> Result<InitParams, DeployError> {
    let (name, symbol, variant) = parse_init_args(kind, args)?;
    Ok(InitParams::new(name, symbol, factory, variant))
}

//! supertoken-deploy: deploy, register and initialize custom Super Token proxies

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use supertoken_chain::{FileJournal, LocalChain, Runtime};
use supertoken_core::{Address, Call, Timestamp, TokenKind};
use supertoken_deploy::{
    proxy_status, split_args, ActivationPlan, ActivationSequencer, DeployConfig, DeployError,
};

#[derive(Parser)]
#[command(name = "supertoken-deploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "SUPERTOKEN_CONFIG", default_value = "supertoken.toml")]
    config: PathBuf,

    /// Transaction journal of the local chain; overrides the config
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Account that sends transactions; defaults to the configured deployer
    #[arg(long, global = true, env = "SUPERTOKEN_FROM")]
    from: Option<Address>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the Super Token framework on the local chain
    Framework,

    /// Deploy a proxy, register it with the factory and initialize it
    Deploy {
        /// Contract to deploy, e.g. BurnableSuperToken
        #[arg(long, env = "CONTRACT")]
        contract: TokenKind,

        /// Comma-delimited constructor arguments
        #[arg(long, env = "CTOR_ARGS")]
        ctor_args: Option<String>,

        /// Comma-delimited initializer arguments, without the factory
        #[arg(long, env = "INIT_ARGS")]
        init_args: Option<String>,

        /// SuperTokenFactory to register with
        #[arg(long, env = "FACTORY")]
        factory: Option<Address>,
    },

    /// Show the activation state and history of a proxy
    Status {
        #[arg(long)]
        proxy: Address,
    },

    /// Write the default configuration
    InitConfig {
        /// Output path; defaults to --config
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        let path = path.as_ref().unwrap_or(&cli.config);
        if path.exists() && !force {
            anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
        }
        DeployConfig::write_default(path).context("Failed to write default config")?;
        return Ok(());
    }

    let config = DeployConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let chain = open_chain(&cli, &config)?;
    let sender = cli.from.unwrap_or(config.deployer);

    match cli.command {
        Commands::Framework => deploy_framework(chain, sender, cli.json),
        Commands::Deploy {
            contract,
            ctor_args,
            init_args,
            factory,
        } => {
            let plan = ActivationPlan::from_args(
                contract,
                &split_args(ctor_args.as_deref()),
                &split_args(init_args.as_deref()),
            )
            .context("Invalid deployment arguments")?;

            let mut sequencer = ActivationSequencer::new(chain, sender);
            if let Some(factory) = factory {
                sequencer = sequencer.with_factory(factory);
            }
            info!("Deploying {} from {}", contract, sender);
            let report = sequencer
                .activate(&config, &plan)
                .with_context(|| format!("Activation of {} failed", contract))?;

            if cli.json {
                print_json(&report)?;
            } else {
                println!("{} proxy {} is {}", report.contract, report.proxy, report.state.label());
                println!("factory: {}", report.factory);
                for step in &report.steps {
                    println!(
                        "  {:<10} block {:>6}  {}  {}",
                        step.step.to_string(),
                        step.block_number,
                        block_time(step.timestamp),
                        step.transaction_hash
                    );
                }
            }
            Ok(())
        }
        Commands::Status { proxy } => {
            let status = proxy_status(&chain, &proxy)
                .ok_or_else(|| DeployError::PreconditionFailure(format!("No proxy deployed at {}", proxy)))?;

            if cli.json {
                print_json(&status)?;
            } else {
                println!("{} proxy {}", status.contract, status.proxy);
                println!("state:        {}", status.state.label());
                println!("deployer:     {}", status.deployer);
                if let Some(factory) = status.factory {
                    println!("factory:      {}", factory);
                }
                if let Some(metadata) = &status.metadata {
                    println!(
                        "token:        {} ({}), {} decimals",
                        metadata.name, metadata.symbol, metadata.decimals
                    );
                }
                if let Some(owner) = status.owner {
                    println!("owner:        {}", owner);
                }
                println!("total supply: {}", status.total_supply);
                println!("history:");
                for entry in &status.history {
                    println!(
                        "  {:<28} block {:>6}  {}  {}{}",
                        entry.call,
                        entry.block_number,
                        block_time(entry.timestamp),
                        entry.transaction_hash,
                        entry
                            .error
                            .as_ref()
                            .map(|error| format!("  reverted: {}", error))
                            .unwrap_or_default()
                    );
                }
            }
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Replay the journal if there is one, otherwise start an ephemeral chain
fn open_chain(cli: &Cli, config: &DeployConfig) -> Result<LocalChain> {
    match cli.journal.as_ref().or(config.journal_path.as_ref()) {
        Some(path) => {
            let journal = FileJournal::open(path)
                .with_context(|| format!("Failed to open journal {}", path.display()))?;
            let chain = LocalChain::replay(config.chain.clone(), Box::new(journal))
                .with_context(|| format!("Failed to replay journal {}", path.display()))?;
            info!(
                "Local chain {} at block {} replayed from {}",
                chain.chain_id(),
                chain.block_number(),
                path.display()
            );
            Ok(chain)
        }
        None => Ok(LocalChain::new(config.chain.clone())),
    }
}

#[derive(Serialize)]
struct FrameworkReport {
    host: Address,
    super_token_factory: Address,
    super_token_logic: Address,
    cfa: Address,
    ida: Address,
}

fn deploy_framework(mut chain: LocalChain, admin: Address, json: bool) -> Result<()> {
    let receipt = chain
        .send(admin, Call::DeployFramework)
        .context("Failed to send framework deployment")?;
    if let Some(error) = receipt.error {
        anyhow::bail!("Framework deployment reverted: {}", error);
    }

    let framework = chain
        .framework()
        .context("Framework missing after deployment")?;
    let report = FrameworkReport {
        host: framework.host.address,
        super_token_factory: framework.host.factory,
        super_token_logic: framework.factory.get_super_token_logic(),
        cfa: framework.host.cfa,
        ida: framework.host.ida,
    };
    info!("Framework deployed in block {}", receipt.block_number);

    if json {
        print_json(&report)?;
    } else {
        println!("host:                {}", report.host);
        println!("super token factory: {}", report.super_token_factory);
        println!("super token logic:   {}", report.super_token_logic);
        println!("cfa:                 {}", report.cfa);
        println!("ida:                 {}", report.ida);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn block_time(timestamp: Timestamp) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

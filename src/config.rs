//! Command-line and environment configuration
//!
//! Every option can be given as a flag or through the environment variable
//! listed next to it.

use crate::balance::BalanceFailurePolicy;
use crate::native_transfer::RecipientBalanceStrategy;
use crate::pacing::PacingPolicy;
use crate::reconciler::ReconcileOptions;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://eth-rpc.gateway.pokt.network/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PacingMode {
    None,
    Fixed,
    TokenBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BalanceFailureMode {
    FailOpen,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecipientStrategyMode {
    Lookback,
    Accumulate,
}

/// Reconcile native and ERC20 balance changes over a window of blocks
#[derive(Debug, Clone, Parser)]
#[command(name = "reconciler")]
#[command(about = "Emit per-account balance change events for a window of Ethereum blocks")]
pub struct Config {
    /// RPC endpoint URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Number of blocks to process
    #[arg(short, long, env = "BLOCK_COUNT", default_value_t = 10)]
    pub blocks: u64,

    /// First block of the window (defaults to the current chain head)
    #[arg(short, long, env = "START_BLOCK")]
    pub start_block: Option<u64>,

    /// Output file for the JSON array of events (defaults to a new file per run)
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Directory for per-run output files when --output is not given
    #[arg(long, env = "OUTPUT_DIR", default_value = "data")]
    pub output_dir: PathBuf,

    /// How to space out block fetches
    #[arg(long, env = "PACING", value_enum, default_value_t = PacingMode::Fixed)]
    pub pacing: PacingMode,

    /// Delay between blocks for fixed pacing
    #[arg(long, env = "BLOCK_DELAY_MS", default_value_t = 5_000)]
    pub block_delay_ms: u64,

    /// Block budget for token-bucket pacing
    #[arg(long, env = "BLOCKS_PER_MINUTE", default_value_t = 12)]
    pub blocks_per_minute: u32,

    /// Maximum RPC requests in flight per batch
    #[arg(long, env = "RPC_CONCURRENCY", default_value_t = 16)]
    pub concurrency: usize,

    /// Currency label written on every event
    #[arg(long, env = "CURRENCY", default_value = "ETH")]
    pub currency: String,

    /// Chain identifier written on every event
    #[arg(long, env = "CHAIN_ID", default_value_t = 2)]
    pub chain_id: u32,

    /// What to do when a balance lookup fails
    #[arg(long, env = "BALANCE_FAILURE", value_enum, default_value_t = BalanceFailureMode::FailOpen)]
    pub balance_failure: BalanceFailureMode,

    /// Where native-transfer recipients' previous balances come from
    #[arg(long, env = "RECIPIENT_STRATEGY", value_enum, default_value_t = RecipientStrategyMode::Lookback)]
    pub recipient_strategy: RecipientStrategyMode,
}

impl Config {
    /// Check values clap cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.blocks == 0 {
            anyhow::bail!("--blocks must be at least 1");
        }
        if self.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        self.pacing_policy()?;
        Ok(())
    }

    pub fn pacing_policy(&self) -> Result<PacingPolicy> {
        Ok(match self.pacing {
            PacingMode::None => PacingPolicy::None,
            PacingMode::Fixed => PacingPolicy::FixedDelay(Duration::from_millis(self.block_delay_ms)),
            PacingMode::TokenBucket => PacingPolicy::TokenBucket(
                NonZeroU32::new(self.blocks_per_minute)
                    .context("--blocks-per-minute must be at least 1")?,
            ),
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            currency: self.currency.clone(),
            chain_id: self.chain_id,
            concurrency: self.concurrency,
            balance_failure: match self.balance_failure {
                BalanceFailureMode::FailOpen => BalanceFailurePolicy::FailOpen,
                BalanceFailureMode::Abort => BalanceFailurePolicy::Abort,
            },
            recipient_strategy: match self.recipient_strategy {
                RecipientStrategyMode::Lookback => RecipientBalanceStrategy::Lookback,
                RecipientStrategyMode::Accumulate => RecipientBalanceStrategy::Accumulate,
            },
        }
    }
}

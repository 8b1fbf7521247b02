use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConsensusError, ConsensusResult};

/// How the execution group agrees on a transaction's effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VotingMode {
    /// Vote, then confirm or challenge the best-ranked vote.
    #[default]
    ConfirmChallenge,
    /// Gossip vote hashes and finalize on a 2/3 super-majority.
    LegacyHash,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub voting_mode: VotingMode,
    /// Quiet period since the last accepted vote before phase 2 opens.
    #[serde(default = "default_vote_quiet_period_ms")]
    pub vote_quiet_period_ms: u64,
    /// Hard limit since the first accepted vote before phase 2 opens.
    #[serde(default = "default_vote_wait_limit_ms")]
    pub vote_wait_limit_ms: u64,
    #[serde(default = "default_rank_delay_step_ms")]
    pub rank_delay_step_ms: u64,
    #[serde(default = "default_rank_delay_cap_ms")]
    pub rank_delay_cap_ms: u64,
    /// Distinct challengers needed before a challenge can finalize a failing receipt.
    #[serde(default = "default_min_unique_challenges")]
    pub min_unique_challenges: usize,
    #[serde(default = "default_robust_query_redundancy")]
    pub robust_query_redundancy: usize,
    #[serde(default = "default_ask_timeout_ms")]
    pub ask_timeout_ms: u64,
    #[serde(default = "default_tx_expire_ms")]
    pub tx_expire_ms: u64,
    #[serde(default = "default_timestamp_cache_cycles")]
    pub timestamp_cache_cycles: u64,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Flip our own transaction result before voting.
    #[serde(default)]
    pub produce_bad_vote: bool,
    /// Challenge the best vote even when it matches ours.
    #[serde(default)]
    pub produce_bad_challenge: bool,
}

/// Settings for the demo binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub node: NodeSettings,
}

fn default_vote_quiet_period_ms() -> u64 {
    1_000
}

fn default_vote_wait_limit_ms() -> u64 {
    5_000
}

fn default_rank_delay_step_ms() -> u64 {
    10
}

fn default_rank_delay_cap_ms() -> u64 {
    500
}

fn default_min_unique_challenges() -> usize {
    1
}

fn default_robust_query_redundancy() -> usize {
    3
}

fn default_ask_timeout_ms() -> u64 {
    2_000
}

fn default_tx_expire_ms() -> u64 {
    30_000
}

fn default_timestamp_cache_cycles() -> u64 {
    3
}

fn default_cluster_size() -> usize {
    5
}

fn default_tick_ms() -> u64 {
    100
}

impl ConsensusConfig {
    /// Delay before a node at `position` (0 = best) in an eligible list shares its message.
    pub fn rank_delay(&self, position: usize) -> Duration {
        let ms = self
            .rank_delay_step_ms
            .saturating_mul(position as u64)
            .min(self.rank_delay_cap_ms);
        Duration::from_millis(ms)
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn validate(&self) -> ConsensusResult<()> {
        if self.robust_query_redundancy == 0 {
            return Err(ConsensusError::Config(
                "robust_query_redundancy must be at least 1".to_string(),
            ));
        }
        if self.min_unique_challenges == 0 {
            return Err(ConsensusError::Config(
                "min_unique_challenges must be at least 1".to_string(),
            ));
        }
        if self.vote_wait_limit_ms < self.vote_quiet_period_ms {
            return Err(ConsensusError::Config(
                "vote_wait_limit_ms must not be shorter than vote_quiet_period_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            voting_mode: VotingMode::default(),
            vote_quiet_period_ms: default_vote_quiet_period_ms(),
            vote_wait_limit_ms: default_vote_wait_limit_ms(),
            rank_delay_step_ms: default_rank_delay_step_ms(),
            rank_delay_cap_ms: default_rank_delay_cap_ms(),
            min_unique_challenges: default_min_unique_challenges(),
            robust_query_redundancy: default_robust_query_redundancy(),
            ask_timeout_ms: default_ask_timeout_ms(),
            tx_expire_ms: default_tx_expire_ms(),
            timestamp_cache_cycles: default_timestamp_cache_cycles(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            cluster_size: default_cluster_size(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConsensusResult<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|err| ConsensusError::Config(format!("unable to parse config: {err}")))?;
        settings.consensus.validate()?;
        Ok(settings)
    }
}

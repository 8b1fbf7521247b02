//! Builders shared by the async tests.

use std::sync::Arc;

use crate::common::config::{ConsensusConfig, VotingMode};
use crate::common::crypto::Digest;
use crate::common::time::ManualClock;
use crate::consensus::vote::{AccountDelta, ExecutionResult, TxId};
use crate::network::local::LocalCluster;

pub const TX: TxId = [7u8; 64];
pub const ACCOUNT: Digest = [9u8; 64];

/// No rank delays, short phase gates, generous expiry.
pub fn config(mode: VotingMode) -> ConsensusConfig {
    ConsensusConfig {
        voting_mode: mode,
        vote_quiet_period_ms: 100,
        vote_wait_limit_ms: 1_000,
        rank_delay_step_ms: 0,
        rank_delay_cap_ms: 0,
        min_unique_challenges: 1,
        robust_query_redundancy: 3,
        ask_timeout_ms: 1_000,
        tx_expire_ms: 60_000,
        ..ConsensusConfig::default()
    }
}

/// Result touching `ACCOUNT` with the given before-state.
pub fn execution(result: bool, before: u8) -> ExecutionResult {
    ExecutionResult {
        tx_id: TX,
        transaction_result: result,
        cant_apply: false,
        accounts: vec![AccountDelta {
            account_id: ACCOUNT,
            hash_before: [before; 64],
            hash_after: [before.wrapping_add(1); 64],
        }],
        app_data_hash: [3u8; 64],
    }
}

/// Cluster with ranks 1..=size (node `size - 1` ranks best) tracking `TX` at time 0.
pub async fn cluster(size: u8, config: ConsensusConfig) -> (LocalCluster, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let cluster = LocalCluster::with_fixed_ranks(size, config, clock.clone()).await;
    for processor in &cluster.processors {
        processor.track_transaction(TX, 0).await;
    }
    (cluster, clock)
}

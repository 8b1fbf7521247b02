use std::collections::HashMap;

use super::vote::{AccountId, TxId};
use crate::common::crypto::{FieldHasher, Pubkey};

/// A node plus its deterministic per-transaction rank.
///
/// Rank comparison is directional per phase: a higher rank wins among voters
/// and confirmers, a lower rank wins among challengers.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NodeWithRank {
    pub node_id: Pubkey,
    pub rank: u64,
}

impl NodeWithRank {
    pub fn outranks_voter(&self, other: &NodeWithRank) -> bool {
        self.rank > other.rank
    }

    pub fn outranks_confirmer(&self, other: &NodeWithRank) -> bool {
        self.rank > other.rank
    }

    pub fn outranks_challenger(&self, other: &NodeWithRank) -> bool {
        self.rank < other.rank
    }
}

/// Shard/partition math, consumed as a pure function of the current cycle.
pub trait Topology: Send + Sync {
    /// Every node that must see the transaction's receipt.
    fn transaction_group(&self, tx_id: &TxId) -> Vec<Pubkey>;
    /// Nodes that execute the transaction and vote on it.
    fn execution_group(&self, tx_id: &TxId) -> Vec<Pubkey>;
    /// Execution group members allowed to share a vote, best-ranked first.
    fn eligible_voters(&self, tx_id: &TxId) -> Vec<Pubkey>;
    /// Execution group members allowed to confirm, best-ranked first.
    fn eligible_confirmers(&self, tx_id: &TxId) -> Vec<Pubkey>;
    fn node_rank(&self, node_id: &Pubkey, tx_id: &TxId) -> Option<NodeWithRank>;
    /// Nodes holding authoritative state for an account.
    fn account_consensus_group(&self, account_id: &AccountId) -> Vec<Pubkey>;
    /// Node that signs the canonical timestamp for a transaction.
    fn timestamp_authority(&self, tx_id: &TxId) -> Option<Pubkey>;
}

/// Groups for one transaction, resolved once when the transaction is tracked.
#[derive(Clone, Debug, Default)]
pub struct TxGroups {
    pub transaction_group: Vec<Pubkey>,
    pub execution_group: Vec<Pubkey>,
    pub eligible_voters: Vec<Pubkey>,
    pub eligible_confirmers: Vec<Pubkey>,
    ranks: HashMap<Pubkey, NodeWithRank>,
}

impl TxGroups {
    pub fn resolve(topology: &dyn Topology, tx_id: &TxId) -> Self {
        let execution_group = topology.execution_group(tx_id);
        let ranks = execution_group
            .iter()
            .filter_map(|node| topology.node_rank(node, tx_id))
            .map(|ranked| (ranked.node_id.clone(), ranked))
            .collect();

        TxGroups {
            transaction_group: topology.transaction_group(tx_id),
            eligible_voters: topology.eligible_voters(tx_id),
            eligible_confirmers: topology.eligible_confirmers(tx_id),
            execution_group,
            ranks,
        }
    }

    pub fn in_execution_group(&self, node_id: &Pubkey) -> bool {
        self.execution_group.contains(node_id)
    }

    pub fn is_eligible_voter(&self, node_id: &Pubkey) -> bool {
        self.eligible_voters.contains(node_id)
    }

    pub fn is_eligible_confirmer(&self, node_id: &Pubkey) -> bool {
        self.eligible_confirmers.contains(node_id)
    }

    pub fn rank_of(&self, node_id: &Pubkey) -> Option<&NodeWithRank> {
        self.ranks.get(node_id)
    }

    pub fn voter_position(&self, node_id: &Pubkey) -> Option<usize> {
        self.eligible_voters.iter().position(|n| n == node_id)
    }

    pub fn confirmer_position(&self, node_id: &Pubkey) -> Option<usize> {
        self.eligible_confirmers.iter().position(|n| n == node_id)
    }

    /// Matching vote hashes must strictly exceed this to finalize in hash-vote mode.
    pub fn super_majority_floor(&self) -> usize {
        self.execution_group.len() * 2 / 3
    }
}

#[derive(Debug, Clone)]
enum RankSource {
    /// Rank derived from `hash(tx_id, node)`, different for every transaction.
    PerTransaction,
    Fixed(HashMap<Pubkey, u64>),
}

/// Flat topology: every member is in every group.
///
/// The eligible voter and confirmer sets are the best-ranked `eligible_count`
/// members.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    pub members: Vec<Pubkey>,
    eligible_count: usize,
    ranks: RankSource,
}

impl StaticTopology {
    pub fn new(members: Vec<Pubkey>) -> Self {
        let eligible_count = members.len();
        StaticTopology {
            members,
            eligible_count,
            ranks: RankSource::PerTransaction,
        }
    }

    pub fn with_fixed_ranks(members: Vec<(Pubkey, u64)>) -> Self {
        let eligible_count = members.len();
        StaticTopology {
            members: members.iter().map(|(node, _)| node.clone()).collect(),
            eligible_count,
            ranks: RankSource::Fixed(members.into_iter().collect()),
        }
    }

    pub fn with_eligible_count(mut self, eligible_count: usize) -> Self {
        self.eligible_count = eligible_count;
        self
    }

    pub fn is_member(&self, pubkey: &Pubkey) -> bool {
        self.members.contains(pubkey)
    }

    fn rank(&self, node_id: &Pubkey, tx_id: &TxId) -> u64 {
        match &self.ranks {
            RankSource::Fixed(ranks) => ranks.get(node_id).copied().unwrap_or_default(),
            RankSource::PerTransaction => {
                let digest = FieldHasher::new("node-rank")
                    .field(tx_id)
                    .field(node_id.as_ref())
                    .finish();
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                u64::from_be_bytes(head)
            }
        }
    }

    fn ranked_best_first(&self, tx_id: &TxId) -> Vec<Pubkey> {
        let mut ranked: Vec<(u64, &Pubkey)> =
            self.members.iter().map(|node| (self.rank(node, tx_id), node)).collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        ranked.into_iter().map(|(_, node)| node.clone()).collect()
    }
}

impl Topology for StaticTopology {
    fn transaction_group(&self, _tx_id: &TxId) -> Vec<Pubkey> {
        self.members.clone()
    }

    fn execution_group(&self, _tx_id: &TxId) -> Vec<Pubkey> {
        self.members.clone()
    }

    fn eligible_voters(&self, tx_id: &TxId) -> Vec<Pubkey> {
        let mut ranked = self.ranked_best_first(tx_id);
        ranked.truncate(self.eligible_count);
        ranked
    }

    fn eligible_confirmers(&self, tx_id: &TxId) -> Vec<Pubkey> {
        self.eligible_voters(tx_id)
    }

    fn node_rank(&self, node_id: &Pubkey, tx_id: &TxId) -> Option<NodeWithRank> {
        self.is_member(node_id).then(|| NodeWithRank {
            node_id: node_id.clone(),
            rank: self.rank(node_id, tx_id),
        })
    }

    fn account_consensus_group(&self, _account_id: &AccountId) -> Vec<Pubkey> {
        self.members.clone()
    }

    fn timestamp_authority(&self, tx_id: &TxId) -> Option<Pubkey> {
        self.ranked_best_first(tx_id).into_iter().next()
    }
}

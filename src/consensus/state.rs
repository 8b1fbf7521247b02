use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::message::ConfirmOrChallengeMessage;
use super::receipt::{AppliedReceipt, AppliedReceipt2};
use super::topology::{NodeWithRank, TxGroups};
use super::vote::{AccountId, AppliedVote, AppliedVoteHash, TxId};
use crate::common::crypto::{Digest, Pubkey, Signature};

/// Consensus state for one in-flight transaction.
///
/// Owned by the node's transaction queue and dropped when the transaction is
/// finalized, expired or archived. Once `applied_receipt2` is set nothing else
/// may be appended.
#[derive(Debug)]
pub struct TxConsensusState {
    pub tx_id: TxId,
    pub timestamp: u64,
    pub groups: TxGroups,

    pub our_vote: Option<AppliedVote>,
    pub our_vote_hash: Option<Digest>,
    /// Before-state hashes this node observed while executing.
    pub observed_before: HashMap<AccountId, Digest>,

    // hash-vote mode
    pub collected_votes: Vec<AppliedVote>,
    pub collected_vote_hashes: Vec<AppliedVoteHash>,

    pub received_best_vote: Option<AppliedVote>,
    pub received_best_vote_hash: Option<Digest>,
    pub received_best_voter: Option<NodeWithRank>,

    pub received_best_confirmation: Option<ConfirmOrChallengeMessage>,
    pub received_best_confirmed_node: Option<NodeWithRank>,

    pub received_best_challenge: Option<ConfirmOrChallengeMessage>,
    pub received_best_challenger: Option<NodeWithRank>,
    pub unique_challenges: HashMap<Pubkey, ConfirmOrChallengeMessage>,
    pub unique_challenges_count: usize,

    pub first_vote_received_timestamp: Option<u64>,
    pub last_vote_received_timestamp: Option<u64>,
    pub first_confirm_or_challenge_timestamp: Option<u64>,
    pub last_confirm_or_challenge_timestamp: Option<u64>,

    pub accept_vote_message: bool,
    pub accept_confirm_or_challenge: bool,
    pub completed_confirmed_or_challenge: bool,
    pub gossiped_receipt: bool,
    /// Held by the confirm/challenge phase while it queries the group.
    pub confirming: AttemptFlag,
    /// Held by a receipt attempt while it queries the group.
    pub producing_receipt: AttemptFlag,
    pub expired: bool,
    /// Set once the receipt has been returned from `tick`.
    pub handed_off: bool,

    pub applied_receipt: Option<AppliedReceipt>,
    pub applied_receipt2: Option<AppliedReceipt2>,
}

impl TxConsensusState {
    pub fn new(tx_id: TxId, timestamp: u64, groups: TxGroups) -> Self {
        TxConsensusState {
            tx_id,
            timestamp,
            groups,
            our_vote: None,
            our_vote_hash: None,
            observed_before: HashMap::new(),
            collected_votes: Vec::new(),
            collected_vote_hashes: Vec::new(),
            received_best_vote: None,
            received_best_vote_hash: None,
            received_best_voter: None,
            received_best_confirmation: None,
            received_best_confirmed_node: None,
            received_best_challenge: None,
            received_best_challenger: None,
            unique_challenges: HashMap::new(),
            unique_challenges_count: 0,
            first_vote_received_timestamp: None,
            last_vote_received_timestamp: None,
            first_confirm_or_challenge_timestamp: None,
            last_confirm_or_challenge_timestamp: None,
            accept_vote_message: true,
            accept_confirm_or_challenge: true,
            completed_confirmed_or_challenge: false,
            gossiped_receipt: false,
            confirming: AttemptFlag::default(),
            producing_receipt: AttemptFlag::default(),
            expired: false,
            handed_off: false,
            applied_receipt: None,
            applied_receipt2: None,
        }
    }

    /// No further mutation once a receipt exists or the transaction expired.
    pub fn is_closed(&self) -> bool {
        self.applied_receipt2.is_some() || self.expired
    }

    pub fn record_vote_timestamp(&mut self, now: u64) {
        self.first_vote_received_timestamp.get_or_insert(now);
        self.last_vote_received_timestamp = Some(now);
    }

    pub fn record_confirm_or_challenge_timestamp(&mut self, now: u64) {
        self.first_confirm_or_challenge_timestamp.get_or_insert(now);
        self.last_confirm_or_challenge_timestamp = Some(now);
    }

    /// Quiet period elapsed since the last accepted vote.
    pub fn has_waited_long_enough(&self, now: u64, quiet_period_ms: u64) -> bool {
        self.last_vote_received_timestamp
            .map_or(false, |last| now.saturating_sub(last) >= quiet_period_ms)
    }

    /// Hard limit elapsed since the first accepted vote.
    pub fn has_wait_limit_reached(&self, now: u64, wait_limit_ms: u64) -> bool {
        self.first_vote_received_timestamp
            .map_or(false, |first| now.saturating_sub(first) >= wait_limit_ms)
    }

    pub fn set_best_vote(&mut self, vote: AppliedVote, vote_hash: Digest, voter: NodeWithRank) {
        let changed = self.received_best_vote_hash != Some(vote_hash);
        self.received_best_vote = Some(vote);
        self.received_best_vote_hash = Some(vote_hash);
        self.received_best_voter = Some(voter);
        if changed {
            self.clear_stale_messages(&vote_hash);
        }
    }

    /// Drops confirms and challenges that were about a vote other than `vote_hash`.
    fn clear_stale_messages(&mut self, vote_hash: &Digest) {
        let stale = |msg: &ConfirmOrChallengeMessage| msg.vote_hash() != *vote_hash;
        if self.received_best_confirmation.as_ref().map_or(false, stale) {
            self.received_best_confirmation = None;
            self.received_best_confirmed_node = None;
        }
        if self.received_best_challenge.as_ref().map_or(false, stale) {
            self.received_best_challenge = None;
            self.received_best_challenger = None;
        }
        self.unique_challenges.retain(|_, msg| !stale(&*msg));
        self.unique_challenges_count = self.unique_challenges.len();
    }

    pub fn challenge_signatures(&self) -> Vec<Signature> {
        let mut sigs: Vec<Signature> =
            self.unique_challenges.values().map(|msg| msg.sig.clone()).collect();
        sigs.sort_by(|a, b| a.signer.cmp(&b.signer));
        sigs
    }

    pub fn finalize(&mut self, receipt2: AppliedReceipt2) {
        self.applied_receipt = Some(receipt2.to_applied_receipt());
        self.applied_receipt2 = Some(receipt2);
        self.accept_vote_message = false;
        self.accept_confirm_or_challenge = false;
    }
}

/// Marks an attempt that runs with the queue lock released.
///
/// The flag lives outside the lock, so the guard clears it on drop even when
/// the future driving the attempt is cancelled mid-query.
#[derive(Debug, Default)]
pub struct AttemptFlag(Arc<AtomicBool>);

impl AttemptFlag {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `None` while another attempt holds the flag.
    pub fn start(&self) -> Option<AttemptGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AttemptGuard(self.0.clone()))
    }
}

#[must_use]
#[derive(Debug)]
pub struct AttemptGuard(Arc<AtomicBool>);

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// All in-flight transactions of this node, keyed by id.
#[derive(Debug, Default)]
pub struct TxQueue {
    entries: HashMap<TxId, TxConsensusState>,
}

impl TxQueue {
    pub fn new() -> Self {
        TxQueue {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, state: TxConsensusState) -> bool {
        if self.entries.contains_key(&state.tx_id) {
            return false;
        }
        self.entries.insert(state.tx_id, state);
        true
    }

    pub fn get(&self, tx_id: &TxId) -> Option<&TxConsensusState> {
        self.entries.get(tx_id)
    }

    pub fn get_mut(&mut self, tx_id: &TxId) -> Option<&mut TxConsensusState> {
        self.entries.get_mut(tx_id)
    }

    pub fn remove(&mut self, tx_id: &TxId) -> Option<TxConsensusState> {
        self.entries.remove(tx_id)
    }

    pub fn tx_ids(&self) -> Vec<TxId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_gates() {
        let mut state = TxConsensusState::new([1u8; 64], 0, TxGroups::default());
        assert!(!state.has_waited_long_enough(10_000, 100));
        assert!(!state.has_wait_limit_reached(10_000, 100));

        state.record_vote_timestamp(1_000);
        state.record_vote_timestamp(1_500);
        assert_eq!(state.first_vote_received_timestamp, Some(1_000));
        assert_eq!(state.last_vote_received_timestamp, Some(1_500));

        assert!(!state.has_waited_long_enough(1_550, 100));
        assert!(state.has_waited_long_enough(1_600, 100));
        assert!(!state.has_wait_limit_reached(1_600, 1_000));
        assert!(state.has_wait_limit_reached(2_000, 1_000));
    }

    #[test]
    fn test_queue_rejects_duplicates() {
        let mut queue = TxQueue::new();
        assert!(queue.insert(TxConsensusState::new([1u8; 64], 0, TxGroups::default())));
        assert!(!queue.insert(TxConsensusState::new([1u8; 64], 5, TxGroups::default())));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&[1u8; 64]).map(|s| s.timestamp), Some(0));
        assert!(queue.remove(&[1u8; 64]).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_attempt_released_on_drop() {
        let flag = AttemptFlag::default();
        let guard = flag.start().unwrap();
        assert!(flag.is_running());
        assert!(flag.start().is_none());

        drop(guard);
        assert!(!flag.is_running());
        assert!(flag.start().is_some());
    }

    #[test]
    fn test_expired_state_is_closed() {
        let mut state = TxConsensusState::new([1u8; 64], 0, TxGroups::default());
        assert!(!state.is_closed());
        state.expired = true;
        assert!(state.is_closed());
    }
}

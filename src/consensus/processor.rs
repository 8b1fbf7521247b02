use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::message::{AppliedVoteQueryResponse, ConfirmOrChallengeQueryResponse, Message};
use super::receipt::AppliedReceipt;
use super::state::{TxConsensusState, TxQueue};
use super::store::AccountState;
use super::timestamp::{TimestampReceipt, TxTimestampCache};
use super::topology::{Topology, TxGroups};
use super::vote::{AppliedVote, AppliedVoteHash, ExecutionResult, Hashable, TxId};
use crate::common::config::{ConsensusConfig, VotingMode};
use crate::common::crypto::{short_digest, Digest, Keypair, Pubkey};
use crate::common::error::{ConsensusError, ConsensusResult, NetworkError, RejectReason};
use crate::common::time::Clock;
use crate::network::{Request, Response, Transport};

/*
    Every handler below runs to completion except at network calls. Guard
    flags on the transaction's state are checked and set while the queue lock
    is held, and the lock is never held across an await, so a re-entrant call
    for the same transaction sees the guard and backs off.
*/

pub struct Collaborators {
    pub topology: Arc<dyn Topology>,
    pub transport: Arc<dyn Transport>,
    pub accounts: Arc<dyn AccountState>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConsensusProcessor {
    pub(crate) id: Pubkey,
    pub(crate) keypair: Keypair,
    pub(crate) config: ConsensusConfig,
    pub(crate) topology: Arc<dyn Topology>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) accounts: Arc<dyn AccountState>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) queue: Mutex<TxQueue>,
    timestamps: Mutex<TxTimestampCache>,
}

impl ConsensusProcessor {
    pub fn new(keypair: Keypair, config: ConsensusConfig, collaborators: Collaborators) -> Self {
        let timestamps = Mutex::new(TxTimestampCache::new(config.timestamp_cache_cycles));
        ConsensusProcessor {
            id: keypair.pubkey(),
            keypair,
            config,
            topology: collaborators.topology,
            transport: collaborators.transport,
            accounts: collaborators.accounts,
            clock: collaborators.clock,
            queue: Mutex::new(TxQueue::new()),
            timestamps,
        }
    }

    pub fn id(&self) -> &Pubkey {
        &self.id
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Starts consensus for a transaction; groups are resolved once, here.
    pub async fn track_transaction(&self, tx_id: TxId, timestamp: u64) -> bool {
        let groups = TxGroups::resolve(self.topology.as_ref(), &tx_id);
        let inserted = self
            .queue
            .lock()
            .await
            .insert(TxConsensusState::new(tx_id, timestamp, groups));
        if inserted {
            debug!(node = %self.id.short(), tx = %short_digest(&tx_id), "tracking transaction");
        }
        inserted
    }

    pub async fn remove_transaction(&self, tx_id: &TxId) -> bool {
        self.queue.lock().await.remove(tx_id).is_some()
    }

    /// Hands the transaction to repair; its state stops accepting anything.
    pub async fn expire(&self, tx_id: &TxId) -> bool {
        let mut queue = self.queue.lock().await;
        match queue.get_mut(tx_id) {
            Some(state) if state.applied_receipt2.is_none() => {
                state.expired = true;
                warn!(node = %self.id.short(), tx = %short_digest(tx_id), "transaction expired without receipt");
                true
            }
            _ => false,
        }
    }

    pub async fn is_expired(&self, tx_id: &TxId) -> bool {
        self.queue
            .lock()
            .await
            .get(tx_id)
            .map_or(false, |state| state.expired)
    }

    pub async fn receipt(&self, tx_id: &TxId) -> Option<AppliedReceipt> {
        self.queue.lock().await.get(tx_id)?.applied_receipt.clone()
    }

    pub async fn inspect<R, F>(&self, tx_id: &TxId, f: F) -> Option<R>
    where
        F: FnOnce(&TxConsensusState) -> R,
    {
        self.queue.lock().await.get(tx_id).map(f)
    }

    /// Marks the state expired once it outlived `tx_expire_ms` without a receipt.
    pub(crate) fn expire_if_stale(&self, state: &mut TxConsensusState, now: u64) -> bool {
        if state.expired {
            return true;
        }
        if state.applied_receipt2.is_none()
            && now.saturating_sub(state.timestamp) > self.config.tx_expire_ms
        {
            state.expired = true;
            warn!(node = %self.id.short(), tx = %short_digest(&state.tx_id), "transaction expired without receipt");
        }
        state.expired
    }

    pub(crate) fn peers_of(&self, group: &[Pubkey]) -> Vec<Pubkey> {
        group.iter().filter(|node| **node != self.id).cloned().collect()
    }

    pub(crate) async fn ask(&self, to: &Pubkey, request: Request) -> Result<Response, NetworkError> {
        let endpoint = request.endpoint();
        match tokio::time::timeout(self.config.ask_timeout(), self.transport.ask(&self.id, to, request)).await {
            Ok(response) => response,
            Err(_) => {
                debug!(node = %self.id.short(), peer = %to.short(), endpoint, "ask timed out");
                Err(NetworkError::Timeout)
            }
        }
    }

    pub(crate) async fn gossip(&self, message: Message, group: &[Pubkey]) {
        trace!(node = %self.id.short(), kind = message.label(), tx = %short_digest(message.tx_id()), "gossip");
        self.transport.gossip(&self.id, message, group).await;
    }

    // ------------------------------------------------------------------
    // Vote collection
    // ------------------------------------------------------------------

    pub async fn create_and_share_vote(&self, mut result: ExecutionResult) -> ConsensusResult<()> {
        let tx_id = result.tx_id;
        if self.config.debug.produce_bad_vote {
            result.transaction_result = !result.transaction_result;
        }
        let vote = AppliedVote::from_execution(&result, &self.keypair);
        if !vote.is_well_formed() {
            error!(
                target: "consensus::invariant",
                node = %self.id.short(),
                tx = %short_digest(&tx_id),
                "execution result lists an account more than once"
            );
            return Err(ConsensusError::InvariantViolation(
                "duplicate account in execution result".to_string(),
            ));
        }
        let vote_hash = vote.hash();

        let position = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(&tx_id) else {
                error!(
                    target: "consensus::invariant",
                    node = %self.id.short(),
                    tx = %short_digest(&tx_id),
                    "execution result for an untracked transaction"
                );
                return Err(ConsensusError::InvariantViolation(
                    "execution result for untracked transaction".to_string(),
                ));
            };
            if state.is_closed() || state.our_vote.is_some() {
                debug!(node = %self.id.short(), tx = %short_digest(&tx_id), "vote already created or transaction closed");
                return Ok(());
            }
            state.our_vote = Some(vote.clone());
            state.our_vote_hash = Some(vote_hash);
            state.observed_before = result
                .accounts
                .iter()
                .map(|account| (account.account_id, account.hash_before))
                .collect();

            match self.config.voting_mode {
                VotingMode::LegacyHash => {
                    if !state.groups.in_execution_group(&self.id) {
                        return Ok(());
                    }
                    None
                }
                VotingMode::ConfirmChallenge => match state.groups.voter_position(&self.id) {
                    Some(position) => Some(position),
                    None => {
                        debug!(node = %self.id.short(), tx = %short_digest(&tx_id), "not eligible to vote, keeping vote locally");
                        return Ok(());
                    }
                },
            }
        };

        let Some(position) = position else {
            return self.share_vote_hash(&tx_id, vote_hash).await;
        };

        let delay = self.config.rank_delay(position);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let now = self.clock.now_ms();
        let execution_group = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(&tx_id) else {
                return Ok(());
            };
            if let (Some(best), Some(me)) = (&state.received_best_voter, state.groups.rank_of(&self.id)) {
                if !me.outranks_voter(best) {
                    debug!(
                        node = %self.id.short(),
                        tx = %short_digest(&tx_id),
                        best = %best.node_id.short(),
                        "better vote already received, not sharing ours"
                    );
                    return Ok(());
                }
            }
            if let Err(reason) = self.append_vote(state, &vote, now) {
                debug!(node = %self.id.short(), tx = %short_digest(&tx_id), %reason, "own vote not appended");
                return Ok(());
            }
            state.groups.execution_group.clone()
        };

        info!(node = %self.id.short(), tx = %short_digest(&tx_id), result = vote.transaction_result, "sharing vote");
        self.gossip(Message::Vote(vote), &execution_group).await;
        Ok(())
    }

    async fn share_vote_hash(&self, tx_id: &TxId, vote_hash: Digest) -> ConsensusResult<()> {
        let announcement = AppliedVoteHash::new(*tx_id, vote_hash, &self.keypair);
        let now = self.clock.now_ms();
        let execution_group = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(tx_id) else {
                return Ok(());
            };
            if let Err(reason) = self.append_vote_hash(state, &announcement, now) {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), %reason, "own vote hash not appended");
                return Ok(());
            }
            state.groups.execution_group.clone()
        };
        info!(node = %self.id.short(), tx = %short_digest(tx_id), "sharing vote hash");
        self.gossip(Message::VoteHash(announcement), &execution_group).await;
        Ok(())
    }

    /// Accepts `vote` if it is valid and better ranked than the stored best vote.
    pub async fn try_append_vote(&self, vote: &AppliedVote) -> bool {
        let now = self.clock.now_ms();
        let mut queue = self.queue.lock().await;
        let outcome = match queue.get_mut(&vote.tx_id) {
            Some(state) => self.append_vote(state, vote, now),
            None => Err(RejectReason::UnknownTransaction),
        };
        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    node = %self.id.short(),
                    tx = %short_digest(&vote.tx_id),
                    voter = %vote.node_id.short(),
                    %reason,
                    "vote rejected"
                );
                false
            }
        }
    }

    pub(crate) fn append_vote(
        &self,
        state: &mut TxConsensusState,
        vote: &AppliedVote,
        now: u64,
    ) -> Result<(), RejectReason> {
        if state.is_closed() {
            return Err(RejectReason::Finalized);
        }
        if !state.accept_vote_message {
            return Err(RejectReason::PhaseClosed);
        }
        if !vote.is_well_formed() {
            return Err(RejectReason::Malformed);
        }
        if !vote.verify() {
            return Err(RejectReason::BadSignature);
        }

        match self.config.voting_mode {
            VotingMode::LegacyHash => {
                if !state.groups.in_execution_group(&vote.node_id) {
                    return Err(RejectReason::Ineligible);
                }
                if state.collected_votes.iter().any(|v| v.node_id == vote.node_id) {
                    return Err(RejectReason::Duplicate);
                }
                state.collected_votes.push(vote.clone());
            }
            VotingMode::ConfirmChallenge => {
                if !state.groups.is_eligible_voter(&vote.node_id) {
                    return Err(RejectReason::Ineligible);
                }
                let voter = state
                    .groups
                    .rank_of(&vote.node_id)
                    .cloned()
                    .ok_or(RejectReason::Ineligible)?;
                let vote_hash = vote.hash();
                if let Some(best) = &state.received_best_voter {
                    if best.node_id == voter.node_id && state.received_best_vote_hash == Some(vote_hash) {
                        return Err(RejectReason::Duplicate);
                    }
                    if !voter.outranks_voter(best) {
                        return Err(RejectReason::NotBetter);
                    }
                }
                state.set_best_vote(vote.clone(), vote_hash, voter);
            }
        }
        state.record_vote_timestamp(now);
        Ok(())
    }

    pub async fn try_append_vote_hash(&self, vote_hash: &AppliedVoteHash) -> bool {
        let now = self.clock.now_ms();
        let mut queue = self.queue.lock().await;
        let outcome = match queue.get_mut(&vote_hash.tx_id) {
            Some(state) => self.append_vote_hash(state, vote_hash, now),
            None => Err(RejectReason::UnknownTransaction),
        };
        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    node = %self.id.short(),
                    tx = %short_digest(&vote_hash.tx_id),
                    voter = %vote_hash.signer().short(),
                    %reason,
                    "vote hash rejected"
                );
                false
            }
        }
    }

    fn append_vote_hash(
        &self,
        state: &mut TxConsensusState,
        vote_hash: &AppliedVoteHash,
        now: u64,
    ) -> Result<(), RejectReason> {
        if state.is_closed() {
            return Err(RejectReason::Finalized);
        }
        if self.config.voting_mode != VotingMode::LegacyHash || !state.accept_vote_message {
            return Err(RejectReason::PhaseClosed);
        }
        if !vote_hash.verify() {
            return Err(RejectReason::BadSignature);
        }
        if !state.groups.in_execution_group(vote_hash.signer()) {
            return Err(RejectReason::Ineligible);
        }
        if state
            .collected_vote_hashes
            .iter()
            .any(|v| v.signer() == vote_hash.signer())
        {
            return Err(RejectReason::Duplicate);
        }
        state.collected_vote_hashes.push(vote_hash.clone());
        state.record_vote_timestamp(now);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Gossip intake; accepted payloads are forwarded to the rest of the group.
    pub async fn handle_gossip(&self, from: &Pubkey, message: Message) {
        trace!(node = %self.id.short(), peer = %from.short(), kind = message.label(), "gossip received");
        match message {
            Message::Vote(vote) => {
                if self.try_append_vote(&vote).await {
                    if let Some(group) = self.execution_group_of(&vote.tx_id).await {
                        self.gossip(Message::Vote(vote), &group).await;
                    }
                }
            }
            Message::VoteHash(vote_hash) => {
                if self.try_append_vote_hash(&vote_hash).await {
                    if let Some(group) = self.execution_group_of(&vote_hash.tx_id).await {
                        self.gossip(Message::VoteHash(vote_hash), &group).await;
                    }
                }
            }
            Message::ConfirmOrChallenge(msg) => {
                if self.try_append_message(&msg).await {
                    if let Some(group) = self.execution_group_of(&msg.applied_vote.tx_id).await {
                        self.gossip(Message::ConfirmOrChallenge(msg), &group).await;
                    }
                }
            }
            Message::Receipt(receipt) => {
                self.handle_receipt(receipt).await;
            }
        }
    }

    async fn execution_group_of(&self, tx_id: &TxId) -> Option<Vec<Pubkey>> {
        self.inspect(tx_id, |state| state.groups.execution_group.clone()).await
    }

    pub async fn handle_request(&self, from: &Pubkey, request: Request) -> Response {
        trace!(node = %self.id.short(), peer = %from.short(), endpoint = request.endpoint(), "request received");
        match request {
            Request::GetAppliedVote { tx_id } => {
                let answer = self
                    .inspect(&tx_id, |state| {
                        let vote = state.received_best_vote.clone()?;
                        let applied_vote_hash = state.received_best_vote_hash?;
                        Some(AppliedVoteQueryResponse { tx_id, applied_vote: vote, applied_vote_hash })
                    })
                    .await
                    .flatten();
                Response::AppliedVote(answer)
            }
            Request::GetConfirmOrChallenge { tx_id } => {
                let answer = self
                    .inspect(&tx_id, |state| self.best_confirm_or_challenge(state))
                    .await
                    .flatten();
                Response::ConfirmOrChallenge(answer)
            }
            Request::GetAppliedReceipt { tx_id } => {
                let answer = self
                    .inspect(&tx_id, |state| state.applied_receipt2.clone())
                    .await
                    .flatten();
                Response::AppliedReceipt(answer)
            }
            Request::GetAccountHash { account_id } => {
                Response::AccountHash(self.accounts.account_hash(&account_id))
            }
            Request::GetTxTimestamp { tx_id, cycle_counter } => {
                Response::TxTimestamp(self.answer_tx_timestamp(&tx_id, cycle_counter).await)
            }
        }
    }

    /// This node's best challenge if it has enough distinct challengers, else its best confirm.
    pub(crate) fn best_confirm_or_challenge(
        &self,
        state: &TxConsensusState,
    ) -> Option<ConfirmOrChallengeQueryResponse> {
        if let Some(challenge) = &state.received_best_challenge {
            if state.unique_challenges_count >= self.config.min_unique_challenges {
                return Some(ConfirmOrChallengeQueryResponse {
                    tx_id: state.tx_id,
                    applied_vote_hash: challenge.vote_hash(),
                    result: challenge.clone(),
                    unique_count: state.unique_challenges_count,
                    signatures: state.challenge_signatures(),
                });
            }
        }
        let confirm = state.received_best_confirmation.as_ref()?;
        Some(ConfirmOrChallengeQueryResponse {
            tx_id: state.tx_id,
            applied_vote_hash: confirm.vote_hash(),
            result: confirm.clone(),
            unique_count: 0,
            signatures: vec![confirm.sig.clone()],
        })
    }

    // ------------------------------------------------------------------
    // Transaction timestamps
    // ------------------------------------------------------------------

    /// Canonical timestamp for `tx_id`, from cache, our own signature, or the authority.
    pub async fn get_tx_timestamp(&self, tx_id: &TxId, cycle_counter: u64) -> ConsensusResult<TimestampReceipt> {
        if let Some(receipt) = self.answer_tx_timestamp(tx_id, cycle_counter).await {
            return Ok(receipt);
        }
        let Some(authority) = self.topology.timestamp_authority(tx_id) else {
            error!(target: "consensus::invariant", tx = %short_digest(tx_id), "no timestamp authority");
            return Err(ConsensusError::InvariantViolation(
                "no timestamp authority for transaction".to_string(),
            ));
        };

        let request = Request::GetTxTimestamp { tx_id: *tx_id, cycle_counter };
        let receipt = match self.ask(&authority, request).await? {
            Response::TxTimestamp(Some(receipt)) => receipt,
            _ => return Err(NetworkError::UnexpectedResponse("get_tx_timestamp").into()),
        };
        if receipt.tx_id != *tx_id
            || receipt.cycle_counter != cycle_counter
            || receipt.sig.signer != authority
            || !receipt.verify()
        {
            warn!(tx = %short_digest(tx_id), authority = %authority.short(), "invalid timestamp receipt");
            return Err(NetworkError::UnexpectedResponse("get_tx_timestamp").into());
        }
        Ok(self.timestamps.lock().await.insert(receipt).clone())
    }

    async fn answer_tx_timestamp(&self, tx_id: &TxId, cycle_counter: u64) -> Option<TimestampReceipt> {
        let mut cache = self.timestamps.lock().await;
        if let Some(receipt) = cache.get(cycle_counter, tx_id) {
            return Some(receipt.clone());
        }
        if self.topology.timestamp_authority(tx_id).as_ref() != Some(&self.id) {
            return None;
        }
        let receipt = TimestampReceipt::new(*tx_id, cycle_counter, self.clock.now_ms(), &self.keypair);
        Some(cache.insert(receipt).clone())
    }

    pub async fn on_cycle_boundary(&self, cycle_counter: u64) {
        let pruned = self.timestamps.lock().await.prune(cycle_counter);
        if pruned > 0 {
            debug!(node = %self.id.short(), cycle = cycle_counter, pruned, "pruned timestamp cache");
        }
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// Advances every in-flight transaction once; returns receipts finalized since the last tick.
    pub async fn tick(&self) -> Vec<AppliedReceipt> {
        let tx_ids = self.queue.lock().await.tx_ids();
        let mut finalized = Vec::new();

        for tx_id in tx_ids {
            let pending = self
                .inspect(&tx_id, |state| !state.handed_off && !state.expired)
                .await
                .unwrap_or(false);
            if !pending {
                continue;
            }
            if let Err(err) = self.confirm_or_challenge(&tx_id).await {
                debug!(node = %self.id.short(), tx = %short_digest(&tx_id), error = %err, "confirm/challenge step failed");
            }
            match self.try_produce_receipt(&tx_id).await {
                Ok(receipt) => {
                    if let Some(state) = self.queue.lock().await.get_mut(&tx_id) {
                        state.handed_off = true;
                    }
                    finalized.push(receipt);
                }
                Err(reason) => {
                    trace!(node = %self.id.short(), tx = %short_digest(&tx_id), %reason, "no receipt yet");
                }
            }
        }
        finalized
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::common::crypto::Keypair;
    use crate::common::time::ManualClock;
    use crate::consensus::topology::StaticTopology;
    use crate::network::local::LocalCluster;
    use crate::testing::{cluster, config, execution, ACCOUNT, TX};

    #[tokio::test]
    async fn test_ineligible_voter_keeps_vote_locally() {
        let keypairs: Vec<Keypair> = (1..=4u8).map(|i| Keypair::from_seed([i; 32])).collect();
        let topology = StaticTopology::with_fixed_ranks(
            keypairs.iter().enumerate().map(|(i, k)| (k.pubkey(), i as u64 + 1)).collect(),
        )
        .with_eligible_count(2);
        let clock = Arc::new(ManualClock::new(0));
        let cluster = LocalCluster::new(keypairs, topology, config(VotingMode::ConfirmChallenge), clock).await;
        let node = cluster.node(0);
        node.track_transaction(TX, 0).await;

        node.create_and_share_vote(execution(true, 1)).await.unwrap();

        let (ours, best) = node
            .inspect(&TX, |s| (s.our_vote.is_some(), s.received_best_vote.is_some()))
            .await
            .unwrap();
        assert!(ours);
        assert!(!best);
        assert_eq!(cluster.network.gossip_sent(), 0);
    }

    #[tokio::test]
    async fn test_better_vote_suppresses_own() {
        let (cluster, _clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        cluster.node(3).create_and_share_vote(execution(true, 1)).await.unwrap();
        let gossip_before = cluster.network.gossip_sent();

        cluster.node(0).create_and_share_vote(execution(true, 1)).await.unwrap();

        assert_eq!(cluster.network.gossip_sent(), gossip_before);
        let voter = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_voter.as_ref().map(|v| v.node_id.clone()))
            .await
            .flatten();
        assert_eq!(voter, Some(cluster.node(3).id().clone()));
    }

    #[tokio::test]
    async fn test_vote_for_untracked_transaction() {
        let (cluster, _clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        let mut result = execution(true, 1);
        result.tx_id = [42u8; 64];

        let err = cluster.node(0).create_and_share_vote(result).await.unwrap_err();
        assert!(matches!(err, ConsensusError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_bad_vote_flag_flips_result() {
        let mut settings = config(VotingMode::ConfirmChallenge);
        settings.debug.produce_bad_vote = true;
        let (cluster, _clock) = cluster(4, settings).await;

        cluster.node(0).create_and_share_vote(execution(true, 1)).await.unwrap();

        let result = cluster
            .node(0)
            .inspect(&TX, |s| s.our_vote.as_ref().map(|v| v.transaction_result))
            .await
            .flatten();
        assert_eq!(result, Some(false));
    }

    #[tokio::test]
    async fn test_answers_peer_queries() {
        let (cluster, _clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        cluster.stores[1].set_account(ACCOUNT, [5u8; 64]);
        let asker = cluster.node(0).id().clone();

        let response = cluster
            .node(1)
            .handle_request(&asker, Request::GetAccountHash { account_id: ACCOUNT })
            .await;
        assert!(matches!(response, Response::AccountHash(Some(hash)) if hash == [5u8; 64]));

        let response = cluster
            .node(1)
            .handle_request(&asker, Request::GetAppliedVote { tx_id: TX })
            .await;
        assert!(matches!(response, Response::AppliedVote(None)));

        cluster.node(2).create_and_share_vote(execution(true, 1)).await.unwrap();
        let response = cluster
            .node(1)
            .handle_request(&asker, Request::GetAppliedVote { tx_id: TX })
            .await;
        match response {
            Response::AppliedVote(Some(answer)) => {
                assert_eq!(answer.applied_vote.node_id, *cluster.node(2).id());
                assert_eq!(answer.applied_vote_hash, answer.applied_vote.hash());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_untracked_gossip_is_dropped() {
        let (cluster, _clock) = cluster(2, config(VotingMode::ConfirmChallenge)).await;
        let mut result = execution(true, 1);
        result.tx_id = [42u8; 64];
        let vote = AppliedVote::from_execution(&result, &Keypair::from_seed([2; 32]));

        assert!(!cluster.node(0).try_append_vote(&vote).await);
        assert!(cluster.node(0).inspect(&[42u8; 64], |_| ()).await.is_none());
    }
}

use tracing::{debug, info, warn};

use super::message::{AppliedVoteQueryResponse, ConfirmOrChallengeMessage, Message, MessageKind};
use super::processor::ConsensusProcessor;
use super::state::TxConsensusState;
use super::vote::{AccountId, AppliedVote, Hashable, TxId};
use crate::common::config::VotingMode;
use crate::common::crypto::{short_digest, Digest};
use crate::common::error::{ConsensusError, ConsensusResult, RejectReason};

/// What this node does once the best vote has settled.
enum Step {
    Confirm { position: usize, vote: AppliedVote },
    Challenge { vote: AppliedVote, disputed: Vec<(AccountId, Digest)> },
}

impl ConsensusProcessor {
    /// Phase two for one transaction. Safe to call on every tick, and a call
    /// that is cancelled midway is resumed by the next one.
    pub async fn confirm_or_challenge(&self, tx_id: &TxId) -> ConsensusResult<()> {
        let now = self.clock.now_ms();
        let (transaction_group, _attempt) = {
            let mut queue = self.queue.lock().await;
            let state = queue.get_mut(tx_id).ok_or(ConsensusError::UnknownTransaction)?;
            if self.expire_if_stale(state, now) {
                return Err(ConsensusError::Expired);
            }
            if self.config.voting_mode == VotingMode::LegacyHash
                || state.is_closed()
                || state.completed_confirmed_or_challenge
                || state.received_best_vote.is_none()
            {
                return Ok(());
            }
            if state.accept_vote_message {
                let quiet = state.has_waited_long_enough(now, self.config.vote_quiet_period_ms);
                let limit = state.has_wait_limit_reached(now, self.config.vote_wait_limit_ms);
                if !quiet && !limit {
                    return Ok(());
                }
            }
            // A closed vote phase with no attempt running means the last one was cancelled.
            let Some(attempt) = state.confirming.start() else {
                return Ok(());
            };
            if state.accept_vote_message {
                state.accept_vote_message = false;
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), "vote phase closed");
            } else {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), "resuming confirm/challenge");
            }
            (state.groups.transaction_group.clone(), attempt)
        };

        let peers = self.peers_of(&transaction_group);
        let robust_vote = self.robust_query_best_vote(tx_id, &peers).await.robust();

        let step = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(tx_id) else {
                return Ok(());
            };
            if state.is_closed() {
                return Ok(());
            }
            if let Some(response) = robust_vote {
                self.adopt_robust_vote(state, response);
            }
            match self.decide_step(state) {
                Some(step) => step,
                None => {
                    state.completed_confirmed_or_challenge = true;
                    return Ok(());
                }
            }
        };

        match step {
            Step::Confirm { position, vote } => self.share_confirm(tx_id, position, vote).await,
            Step::Challenge { vote, disputed } => {
                let holds = self.account_integrity_holds(&disputed).await;
                if !holds {
                    info!(
                        node = %self.id.short(),
                        tx = %short_digest(tx_id),
                        "own account view not confirmed by account groups, not challenging"
                    );
                    self.complete_phase(tx_id).await;
                    return Ok(());
                }
                self.share_challenge(tx_id, vote).await
            }
        }
    }

    fn decide_step(&self, state: &TxConsensusState) -> Option<Step> {
        let best = state.received_best_vote.as_ref()?;
        let best_hash = state.received_best_vote_hash?;
        let Some(our_hash) = state.our_vote_hash else {
            debug!(node = %self.id.short(), tx = %short_digest(&state.tx_id), "no local vote, nothing to confirm or challenge");
            return None;
        };

        if our_hash == best_hash && !self.config.debug.produce_bad_challenge {
            let position = state.groups.confirmer_position(&self.id)?;
            return Some(Step::Confirm { position, vote: best.clone() });
        }

        if !state.groups.in_execution_group(&self.id) {
            return None;
        }
        let disputed = state
            .observed_before
            .iter()
            .filter(|(account_id, ours)| best.hash_before(account_id) != Some(*ours))
            .map(|(account_id, ours)| (*account_id, *ours))
            .collect();
        Some(Step::Challenge { vote: best.clone(), disputed })
    }

    async fn share_confirm(&self, tx_id: &TxId, position: usize, vote: AppliedVote) -> ConsensusResult<()> {
        let delay = self.config.rank_delay(position);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let now = self.clock.now_ms();
        let vote_hash = vote.hash();
        let (confirm, execution_group) = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(tx_id) else {
                return Ok(());
            };
            state.completed_confirmed_or_challenge = true;
            if state.received_best_vote_hash != Some(vote_hash) {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), "best vote moved while waiting, not confirming");
                return Ok(());
            }
            if let (Some(best), Some(me)) = (&state.received_best_confirmed_node, state.groups.rank_of(&self.id)) {
                if !me.outranks_confirmer(best) {
                    debug!(
                        node = %self.id.short(),
                        tx = %short_digest(tx_id),
                        best = %best.node_id.short(),
                        "better confirmation already received, not confirming"
                    );
                    return Ok(());
                }
            }
            let confirm = ConfirmOrChallengeMessage::new(MessageKind::Confirm, vote, &self.keypair);
            if let Err(reason) = self.append_message(state, &confirm, now) {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), %reason, "own confirm not appended");
                return Ok(());
            }
            (confirm, state.groups.execution_group.clone())
        };

        info!(node = %self.id.short(), tx = %short_digest(tx_id), "confirming best vote");
        self.gossip(Message::ConfirmOrChallenge(confirm), &execution_group).await;
        Ok(())
    }

    async fn share_challenge(&self, tx_id: &TxId, vote: AppliedVote) -> ConsensusResult<()> {
        let now = self.clock.now_ms();
        let vote_hash = vote.hash();
        let (challenge, execution_group) = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(tx_id) else {
                return Ok(());
            };
            state.completed_confirmed_or_challenge = true;
            if state.received_best_vote_hash != Some(vote_hash) {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), "best vote moved while checking accounts, not challenging");
                return Ok(());
            }
            let challenge = ConfirmOrChallengeMessage::new(MessageKind::Challenge, vote, &self.keypair);
            if let Err(reason) = self.append_message(state, &challenge, now) {
                debug!(node = %self.id.short(), tx = %short_digest(tx_id), %reason, "own challenge not appended");
                return Ok(());
            }
            (challenge, state.groups.execution_group.clone())
        };

        warn!(
            node = %self.id.short(),
            tx = %short_digest(tx_id),
            voter = %challenge.applied_vote.node_id.short(),
            "challenging best vote"
        );
        self.gossip(Message::ConfirmOrChallenge(challenge), &execution_group).await;
        Ok(())
    }

    async fn complete_phase(&self, tx_id: &TxId) {
        if let Some(state) = self.queue.lock().await.get_mut(tx_id) {
            state.completed_confirmed_or_challenge = true;
        }
    }

    /// True when every disputed account's group robustly agrees with our before-state.
    async fn account_integrity_holds(&self, disputed: &[(AccountId, Digest)]) -> bool {
        for (account_id, ours) in disputed {
            let group = self.peers_of(&self.topology.account_consensus_group(account_id));
            let answer = self.robust_query_account_hash(account_id, &group).await.robust();
            if answer.as_ref() != Some(ours) {
                debug!(
                    node = %self.id.short(),
                    account = %short_digest(account_id),
                    robust = answer.is_some(),
                    "account group does not back our before-state"
                );
                return false;
            }
        }
        true
    }

    /// Replaces the local best vote with a robust answer that outranks it.
    fn adopt_robust_vote(&self, state: &mut TxConsensusState, response: AppliedVoteQueryResponse) {
        let vote = response.applied_vote;
        if response.tx_id != state.tx_id
            || vote.tx_id != state.tx_id
            || !vote.is_well_formed()
            || !vote.verify()
            || vote.hash() != response.applied_vote_hash
            || !state.groups.is_eligible_voter(&vote.node_id)
        {
            warn!(node = %self.id.short(), tx = %short_digest(&state.tx_id), "robust best vote failed validation");
            return;
        }
        let Some(voter) = state.groups.rank_of(&vote.node_id).cloned() else {
            return;
        };
        let better = state
            .received_best_voter
            .as_ref()
            .map_or(true, |best| voter.outranks_voter(best));
        if better {
            debug!(
                node = %self.id.short(),
                tx = %short_digest(&state.tx_id),
                voter = %voter.node_id.short(),
                "adopting robust best vote"
            );
            state.set_best_vote(vote, response.applied_vote_hash, voter);
        }
    }

    pub async fn try_append_message(&self, msg: &ConfirmOrChallengeMessage) -> bool {
        let now = self.clock.now_ms();
        let tx_id = msg.applied_vote.tx_id;
        let mut queue = self.queue.lock().await;
        let outcome = match queue.get_mut(&tx_id) {
            Some(state) => self.append_message(state, msg, now),
            None => Err(RejectReason::UnknownTransaction),
        };
        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    node = %self.id.short(),
                    tx = %short_digest(&tx_id),
                    sender = %msg.node_id.short(),
                    kind = msg.kind.as_str(),
                    %reason,
                    "confirm/challenge rejected"
                );
                false
            }
        }
    }

    pub(crate) fn append_message(
        &self,
        state: &mut TxConsensusState,
        msg: &ConfirmOrChallengeMessage,
        now: u64,
    ) -> Result<(), RejectReason> {
        if state.is_closed() {
            return Err(RejectReason::Finalized);
        }
        if self.config.voting_mode == VotingMode::LegacyHash || !state.accept_confirm_or_challenge {
            return Err(RejectReason::PhaseClosed);
        }
        if !msg.verify() {
            return Err(RejectReason::BadSignature);
        }
        if !state.groups.in_execution_group(&msg.node_id) {
            return Err(RejectReason::Ineligible);
        }
        if msg.is_confirm() && !state.groups.is_eligible_confirmer(&msg.node_id) {
            return Err(RejectReason::Ineligible);
        }
        if state.received_best_vote_hash != Some(msg.vote_hash()) {
            return Err(RejectReason::StaleVote);
        }
        let sender = state
            .groups
            .rank_of(&msg.node_id)
            .cloned()
            .ok_or(RejectReason::Ineligible)?;

        match msg.kind {
            MessageKind::Confirm => {
                if let Some(best) = &state.received_best_confirmed_node {
                    if best.node_id == sender.node_id {
                        return Err(RejectReason::Duplicate);
                    }
                    if !sender.outranks_confirmer(best) {
                        return Err(RejectReason::NotBetter);
                    }
                }
                state.received_best_confirmation = Some(msg.clone());
                state.received_best_confirmed_node = Some(sender);
            }
            MessageKind::Challenge => {
                if state.unique_challenges.contains_key(&msg.node_id) {
                    return Err(RejectReason::Duplicate);
                }
                state.unique_challenges.insert(msg.node_id.clone(), msg.clone());
                state.unique_challenges_count = state.unique_challenges.len();
                let better = state
                    .received_best_challenger
                    .as_ref()
                    .map_or(true, |best| sender.outranks_challenger(best));
                if better {
                    state.received_best_challenge = Some(msg.clone());
                    state.received_best_challenger = Some(sender);
                }
            }
        }
        state.record_confirm_or_challenge_timestamp(now);
        Ok(())
    }
}

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::message::{ConfirmOrChallengeMessage, ConfirmOrChallengeQueryResponse, Message, MessageKind};
use super::processor::ConsensusProcessor;
use super::receipt::{AppliedReceipt, AppliedReceipt2};
use super::state::TxConsensusState;
use super::topology::{NodeWithRank, TxGroups};
use super::vote::{Hashable, TxId};
use crate::common::config::VotingMode;
use crate::common::crypto::{short_digest, Digest, Signature};
use crate::common::error::{ConsensusError, ConsensusResult, DeferReason};

/*
    Receipt production in confirm/challenge mode:

    1. A challenge backed by enough distinct challengers is the local
       candidate; otherwise the best confirmation is.
    2. The transaction group is robust-queried for its best confirm/challenge.
    3. The network answer replaces the local candidate when it is a challenge
       against a local confirm, a confirm against a local challenge, or the
       same kind from a better-ranked sender.

    An inconclusive robust query defers. The caller polls again on its next tick.
    The attempt guard is released when the call returns or is cancelled, so a
    caller may drop the future (e.g. on a timeout) and simply call again.
*/

struct Candidate {
    receipt: AppliedReceipt2,
    sender: NodeWithRank,
}

impl Candidate {
    fn kind(&self) -> MessageKind {
        if self.receipt.is_challenge() {
            MessageKind::Challenge
        } else {
            MessageKind::Confirm
        }
    }
}

impl ConsensusProcessor {
    /// Produces the transaction's receipt, or says why it cannot yet.
    ///
    /// Once produced the receipt is cached, gossiped once and returned as is
    /// on every later call.
    pub async fn try_produce_receipt(&self, tx_id: &TxId) -> Result<AppliedReceipt, DeferReason> {
        let now = self.clock.now_ms();
        let pending = {
            let mut queue = self.queue.lock().await;
            let state = queue.get_mut(tx_id).ok_or(DeferReason::UnknownTransaction)?;
            if let Some(receipt) = &state.applied_receipt {
                return Ok(receipt.clone());
            }
            if self.expire_if_stale(state, now) {
                return Err(DeferReason::Expired);
            }

            match self.config.voting_mode {
                VotingMode::LegacyHash => {
                    let receipt2 = self.produce_legacy_receipt(state)?;
                    state.finalize(receipt2);
                    None
                }
                VotingMode::ConfirmChallenge => {
                    if !state.completed_confirmed_or_challenge {
                        return Err(DeferReason::WaitingPhase);
                    }
                    let attempt = state.producing_receipt.start().ok_or(DeferReason::InProgress)?;
                    let local = self.local_candidate(state).ok_or(DeferReason::NotEnoughVotes)?;
                    Some((local, state.groups.clone(), attempt))
                }
            }
        };
        let Some((local, groups, _attempt)) = pending else {
            return self.finish_receipt(tx_id).await;
        };

        let peers = self.peers_of(&groups.transaction_group);
        let robust = self.robust_query_confirm_or_challenge(tx_id, &peers).await;
        let chosen = if robust.is_robust_result {
            match robust
                .top_result
                .and_then(|response| self.network_candidate(&groups, response))
            {
                Some(remote) => Some(self.resolve(local, remote)),
                None => Some(local.receipt),
            }
        } else {
            None
        };

        {
            let mut queue = self.queue.lock().await;
            let state = queue.get_mut(tx_id).ok_or(DeferReason::UnknownTransaction)?;
            if state.applied_receipt2.is_none() {
                let Some(receipt2) = chosen else {
                    debug!(node = %self.id.short(), tx = %short_digest(tx_id), "robust confirm/challenge query inconclusive");
                    return Err(DeferReason::RobustQueryInconclusive);
                };
                if state.expired {
                    return Err(DeferReason::Expired);
                }
                state.finalize(receipt2);
            }
        }
        self.finish_receipt(tx_id).await
    }

    async fn finish_receipt(&self, tx_id: &TxId) -> Result<AppliedReceipt, DeferReason> {
        let receipt = self.receipt(tx_id).await.ok_or(DeferReason::UnknownTransaction)?;
        if self.share_applied_receipt(tx_id).await {
            info!(
                node = %self.id.short(),
                tx = %short_digest(tx_id),
                result = receipt.result,
                challenged = receipt.confirm_or_challenge.iter().any(ConfirmOrChallengeMessage::is_challenge),
                "receipt produced"
            );
        }
        Ok(receipt)
    }

    fn local_candidate(&self, state: &TxConsensusState) -> Option<Candidate> {
        if let (Some(challenge), Some(challenger)) =
            (&state.received_best_challenge, &state.received_best_challenger)
        {
            if state.unique_challenges_count >= self.config.min_unique_challenges {
                return Some(Candidate {
                    receipt: AppliedReceipt2::from_challenge(challenge.clone(), state.challenge_signatures()),
                    sender: challenger.clone(),
                });
            }
        }
        let confirm = state.received_best_confirmation.as_ref()?;
        let confirmer = state.received_best_confirmed_node.as_ref()?;
        Some(Candidate {
            receipt: AppliedReceipt2::from_confirm(confirm.clone()),
            sender: confirmer.clone(),
        })
    }

    /// Turns a robust answer into a candidate, dropping answers that do not verify.
    fn network_candidate(
        &self,
        groups: &TxGroups,
        response: ConfirmOrChallengeQueryResponse,
    ) -> Option<Candidate> {
        let sender = groups.rank_of(&response.result.node_id)?.clone();
        if response.result.vote_hash() != response.applied_vote_hash {
            return None;
        }
        let receipt = match response.result.kind {
            MessageKind::Confirm => AppliedReceipt2::from_confirm(response.result),
            MessageKind::Challenge => {
                if response.unique_count < self.config.min_unique_challenges {
                    return None;
                }
                AppliedReceipt2::from_challenge(response.result, response.signatures)
            }
        };
        if let Err(err) = receipt.verify(groups, self.config.min_unique_challenges) {
            warn!(
                node = %self.id.short(),
                tx = %short_digest(&receipt.tx_id),
                error = %err,
                "robust confirm/challenge answer does not verify"
            );
            return None;
        }
        Some(Candidate { receipt, sender })
    }

    fn resolve(&self, local: Candidate, remote: Candidate) -> AppliedReceipt2 {
        let adopt = match (local.kind(), remote.kind()) {
            (MessageKind::Challenge, MessageKind::Confirm) => true,
            (MessageKind::Confirm, MessageKind::Challenge) => true,
            (MessageKind::Challenge, MessageKind::Challenge) => remote.sender.outranks_challenger(&local.sender),
            (MessageKind::Confirm, MessageKind::Confirm) => remote.sender.outranks_confirmer(&local.sender),
        };
        if adopt {
            debug!(
                node = %self.id.short(),
                tx = %short_digest(&remote.receipt.tx_id),
                sender = %remote.sender.node_id.short(),
                kind = remote.kind().as_str(),
                "adopting network confirm/challenge"
            );
            remote.receipt
        } else {
            local.receipt
        }
    }

    /// Super-majority of identical vote hashes, with a known vote body.
    fn produce_legacy_receipt(&self, state: &TxConsensusState) -> Result<AppliedReceipt2, DeferReason> {
        let mut tally: HashMap<Digest, Vec<Signature>> = HashMap::new();
        for vote_hash in &state.collected_vote_hashes {
            tally
                .entry(vote_hash.vote_hash)
                .or_default()
                .push(vote_hash.sig.clone());
        }
        let floor = state.groups.super_majority_floor();
        let (winning_hash, signatures) = tally
            .into_iter()
            .filter(|(_, sigs)| sigs.len() > floor)
            .max_by_key(|(_, sigs)| sigs.len())
            .ok_or(DeferReason::NotEnoughVotes)?;

        let vote = match (&state.our_vote, state.our_vote_hash) {
            (Some(vote), Some(hash)) if hash == winning_hash => vote.clone(),
            _ => state
                .collected_votes
                .iter()
                .find(|vote| vote.hash() == winning_hash)
                .cloned()
                .ok_or(DeferReason::WinningVoteUnknown)?,
        };
        let mut signatures = signatures;
        signatures.sort_by(|a, b| a.signer.cmp(&b.signer));
        Ok(AppliedReceipt2::from_vote_hashes(vote, signatures))
    }

    pub(crate) async fn share_applied_receipt(&self, tx_id: &TxId) -> bool {
        let (receipt2, group) = {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(tx_id) else {
                return false;
            };
            if state.gossiped_receipt {
                return false;
            }
            let Some(receipt2) = state.applied_receipt2.clone() else {
                return false;
            };
            state.gossiped_receipt = true;
            (receipt2, state.groups.transaction_group.clone())
        };
        self.gossip(Message::Receipt(receipt2), &group).await;
        true
    }

    /// Gossip intake for receipts; a verified receipt is adopted and forwarded once.
    pub async fn handle_receipt(&self, receipt2: AppliedReceipt2) -> bool {
        let tx_id = receipt2.tx_id;
        {
            let mut queue = self.queue.lock().await;
            let Some(state) = queue.get_mut(&tx_id) else {
                debug!(node = %self.id.short(), tx = %short_digest(&tx_id), "receipt for unknown transaction");
                return false;
            };
            if state.is_closed() {
                return false;
            }
            if let Err(err) = receipt2.verify(&state.groups, self.config.min_unique_challenges) {
                warn!(node = %self.id.short(), tx = %short_digest(&tx_id), error = %err, "gossiped receipt rejected");
                return false;
            }
            state.finalize(receipt2);
        }
        info!(node = %self.id.short(), tx = %short_digest(&tx_id), "adopted gossiped receipt");
        self.share_applied_receipt(&tx_id).await;
        true
    }

    /// Recovers the network's receipt through a robust query; works on expired transactions too.
    pub async fn sync_receipt(&self, tx_id: &TxId) -> ConsensusResult<Option<AppliedReceipt>> {
        let groups = {
            let queue = self.queue.lock().await;
            let state = queue.get(tx_id).ok_or(ConsensusError::UnknownTransaction)?;
            if let Some(receipt) = &state.applied_receipt {
                return Ok(Some(receipt.clone()));
            }
            state.groups.clone()
        };

        let peers = self.peers_of(&groups.transaction_group);
        let Some(receipt2) = self.robust_query_receipt(tx_id, &peers).await.robust() else {
            debug!(node = %self.id.short(), tx = %short_digest(tx_id), "no robust receipt to sync");
            return Ok(None);
        };
        if let Err(err) = receipt2.verify(&groups, self.config.min_unique_challenges) {
            warn!(node = %self.id.short(), tx = %short_digest(tx_id), error = %err, "robust receipt does not verify");
            return Ok(None);
        }

        let mut queue = self.queue.lock().await;
        let state = queue.get_mut(tx_id).ok_or(ConsensusError::UnknownTransaction)?;
        if state.applied_receipt2.is_none() {
            info!(node = %self.id.short(), tx = %short_digest(tx_id), expired = state.expired, "receipt synced from network");
            state.finalize(receipt2);
            state.gossiped_receipt = true;
        }
        Ok(state.applied_receipt.clone())
    }
}

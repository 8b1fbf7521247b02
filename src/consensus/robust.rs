//! Robust queries: ask several peers the same question and only trust an
//! answer that enough of them independently agree on.
//!
//! The consensus core uses the same shape for four questions (best vote, best
//! confirm/challenge, final receipt, account hash); each one supplies its own
//! equality function.

use std::future::Future;

use futures_util::future::join_all;
use tracing::{debug, trace};

use super::message::{AppliedVoteQueryResponse, ConfirmOrChallengeQueryResponse};
use super::processor::ConsensusProcessor;
use super::receipt::AppliedReceipt2;
use super::vote::{AccountId, TxId};
use crate::common::crypto::{short_digest, Digest, Pubkey};
use crate::common::error::NetworkError;
use crate::network::{Request, Response};

#[derive(Clone, Debug)]
pub struct RobustQueryResult<T> {
    /// Answer with the most agreeing responders, robust or not.
    pub top_result: Option<T>,
    /// Whether `top_result` reached the required redundancy.
    pub is_robust_result: bool,
    pub winning_nodes: Vec<Pubkey>,
}

impl<T> RobustQueryResult<T> {
    /// The answer, only if it is robust.
    pub fn robust(self) -> Option<T> {
        if self.is_robust_result {
            self.top_result
        } else {
            None
        }
    }
}

struct ResponseGroup<T> {
    response: T,
    nodes: Vec<Pubkey>,
}

/// Queries `nodes` until `redundancy` equal answers are collected.
///
/// Peers are asked in concurrent batches of `redundancy`, in list order, so a
/// slow or unreachable peer costs at most one ask timeout per batch. Redundancy
/// is capped at the number of nodes available. Failed asks and empty answers
/// count as no answer from that peer.
pub async fn robust_query<T, Q, Fut, E>(
    nodes: &[Pubkey],
    redundancy: usize,
    query: Q,
    equal: E,
) -> RobustQueryResult<T>
where
    Q: Fn(Pubkey) -> Fut,
    Fut: Future<Output = Result<Option<T>, NetworkError>>,
    E: Fn(&T, &T) -> bool,
{
    let needed = redundancy.min(nodes.len()).max(1);
    let mut groups: Vec<ResponseGroup<T>> = Vec::new();

    for batch in nodes.chunks(needed) {
        let answers = join_all(batch.iter().map(|node| query(node.clone()))).await;

        for (node, answer) in batch.iter().zip(answers) {
            let response = match answer {
                Ok(Some(response)) => response,
                Ok(None) => {
                    trace!(peer = %node.short(), "peer has no answer");
                    continue;
                }
                Err(err) => {
                    debug!(peer = %node.short(), error = %err, "robust query ask failed");
                    continue;
                }
            };

            let idx = match groups.iter().position(|g| equal(&g.response, &response)) {
                Some(idx) => {
                    groups[idx].nodes.push(node.clone());
                    idx
                }
                None => {
                    groups.push(ResponseGroup {
                        response,
                        nodes: vec![node.clone()],
                    });
                    groups.len() - 1
                }
            };

            if groups[idx].nodes.len() >= needed {
                let winner = groups.swap_remove(idx);
                return RobustQueryResult {
                    top_result: Some(winner.response),
                    is_robust_result: true,
                    winning_nodes: winner.nodes,
                };
            }
        }
    }

    // Not robust: report the biggest group, first-seen on ties.
    let mut best: Option<ResponseGroup<T>> = None;
    for group in groups {
        if best.as_ref().map_or(true, |b| group.nodes.len() > b.nodes.len()) {
            best = Some(group);
        }
    }
    match best {
        Some(group) => RobustQueryResult {
            top_result: Some(group.response),
            is_robust_result: false,
            winning_nodes: group.nodes,
        },
        None => RobustQueryResult {
            top_result: None,
            is_robust_result: false,
            winning_nodes: Vec::new(),
        },
    }
}

pub fn votes_equal(a: &AppliedVoteQueryResponse, b: &AppliedVoteQueryResponse) -> bool {
    a.applied_vote_hash == b.applied_vote_hash
}

pub fn confirm_or_challenge_equal(
    a: &ConfirmOrChallengeQueryResponse,
    b: &ConfirmOrChallengeQueryResponse,
) -> bool {
    a.agreement_key() == b.agreement_key()
}

pub fn receipts_equal(a: &AppliedReceipt2, b: &AppliedReceipt2) -> bool {
    a == b
}

impl ConsensusProcessor {
    pub(crate) async fn robust_query_best_vote(
        &self,
        tx_id: &TxId,
        nodes: &[Pubkey],
    ) -> RobustQueryResult<AppliedVoteQueryResponse> {
        let result = robust_query(
            nodes,
            self.config.robust_query_redundancy,
            |node| async move {
                match self.ask(&node, Request::GetAppliedVote { tx_id: *tx_id }).await? {
                    Response::AppliedVote(answer) => Ok(answer),
                    _ => Err(NetworkError::UnexpectedResponse("get_applied_vote")),
                }
            },
            votes_equal,
        )
        .await;
        debug!(
            tx = %short_digest(tx_id),
            robust = result.is_robust_result,
            agreeing = result.winning_nodes.len(),
            "robust query for best vote"
        );
        result
    }

    pub(crate) async fn robust_query_confirm_or_challenge(
        &self,
        tx_id: &TxId,
        nodes: &[Pubkey],
    ) -> RobustQueryResult<ConfirmOrChallengeQueryResponse> {
        let result = robust_query(
            nodes,
            self.config.robust_query_redundancy,
            |node| async move {
                match self.ask(&node, Request::GetConfirmOrChallenge { tx_id: *tx_id }).await? {
                    Response::ConfirmOrChallenge(answer) => Ok(answer),
                    _ => Err(NetworkError::UnexpectedResponse("get_confirm_or_challenge")),
                }
            },
            confirm_or_challenge_equal,
        )
        .await;
        debug!(
            tx = %short_digest(tx_id),
            robust = result.is_robust_result,
            agreeing = result.winning_nodes.len(),
            "robust query for confirm/challenge"
        );
        result
    }

    pub(crate) async fn robust_query_receipt(
        &self,
        tx_id: &TxId,
        nodes: &[Pubkey],
    ) -> RobustQueryResult<AppliedReceipt2> {
        robust_query(
            nodes,
            self.config.robust_query_redundancy,
            |node| async move {
                match self.ask(&node, Request::GetAppliedReceipt { tx_id: *tx_id }).await? {
                    Response::AppliedReceipt(answer) => Ok(answer),
                    _ => Err(NetworkError::UnexpectedResponse("get_applied_receipt")),
                }
            },
            receipts_equal,
        )
        .await
    }

    pub(crate) async fn robust_query_account_hash(
        &self,
        account_id: &AccountId,
        nodes: &[Pubkey],
    ) -> RobustQueryResult<Digest> {
        robust_query(
            nodes,
            self.config.robust_query_redundancy,
            |node| async move {
                match self.ask(&node, Request::GetAccountHash { account_id: *account_id }).await? {
                    Response::AccountHash(answer) => Ok(answer),
                    _ => Err(NetworkError::UnexpectedResponse("get_account_hash")),
                }
            },
            |a: &Digest, b: &Digest| a == b,
        )
        .await
    }
}

use std::collections::HashSet;

use thiserror::Error;

use super::message::{confirm_or_challenge_digest, ConfirmOrChallengeMessage, MessageKind};
use super::topology::TxGroups;
use super::vote::{vote_hash_signing_digest, AppliedVote, Hashable, TxId};
use crate::common::crypto::{Digest, Pubkey, Signature};

/*
    A receipt is the finalized, portable outcome of a transaction. Any node
    holding the transaction's groups can check it without replaying execution:
    the embedded vote is signed by an execution group member and the proof
    carries enough independent signatures for the mode that produced it.
*/

/// How a receipt was reached.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ReceiptProof {
    /// Super-majority of identical vote hashes.
    LegacyHash { signatures: Vec<Signature> },
    /// Best confirm, or best challenge plus every distinct challenger's signature.
    ConfirmChallenge {
        message: ConfirmOrChallengeMessage,
        signatures: Vec<Signature>,
    },
}

/// Compact receipt used for gossip: one winning vote and its proof.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedReceipt2 {
    pub tx_id: TxId,
    pub result: bool,
    pub applied_vote: AppliedVote,
    pub proof: ReceiptProof,
    pub app_data_hash: Digest,
}

/// Full receipt handed to persistence and to the caller.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedReceipt {
    pub tx_id: TxId,
    pub result: bool,
    pub applied_votes: Vec<AppliedVote>,
    pub confirm_or_challenge: Vec<ConfirmOrChallengeMessage>,
    pub app_data_hash: Digest,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("receipt fields disagree with the embedded vote")]
    Inconsistent,
    #[error("embedded vote is malformed or badly signed")]
    BadVote,
    #[error("voter {0:?} is not in the execution group")]
    ForeignVoter(Pubkey),
    #[error("confirm/challenge message does not verify")]
    BadMessage,
    #[error("confirm/challenge refers to a different vote")]
    VoteMismatch,
    #[error("signer {0:?} is not eligible")]
    Ineligible(Pubkey),
    #[error("result does not follow from the proof")]
    WrongResult,
    #[error("{got} valid signatures, need {need}")]
    NotEnoughSignatures { got: usize, need: usize },
}

impl AppliedReceipt2 {
    pub fn from_vote_hashes(applied_vote: AppliedVote, signatures: Vec<Signature>) -> Self {
        AppliedReceipt2 {
            tx_id: applied_vote.tx_id,
            result: applied_vote.transaction_result,
            app_data_hash: applied_vote.app_data_hash,
            proof: ReceiptProof::LegacyHash { signatures },
            applied_vote,
        }
    }

    pub fn from_confirm(confirm: ConfirmOrChallengeMessage) -> Self {
        let applied_vote = confirm.applied_vote.clone();
        AppliedReceipt2 {
            tx_id: applied_vote.tx_id,
            result: applied_vote.transaction_result,
            app_data_hash: applied_vote.app_data_hash,
            proof: ReceiptProof::ConfirmChallenge {
                signatures: vec![confirm.sig.clone()],
                message: confirm,
            },
            applied_vote,
        }
    }

    /// A supported challenge always finalizes a failing receipt.
    pub fn from_challenge(challenge: ConfirmOrChallengeMessage, signatures: Vec<Signature>) -> Self {
        let applied_vote = challenge.applied_vote.clone();
        AppliedReceipt2 {
            tx_id: applied_vote.tx_id,
            result: false,
            app_data_hash: applied_vote.app_data_hash,
            proof: ReceiptProof::ConfirmChallenge {
                message: challenge,
                signatures,
            },
            applied_vote,
        }
    }

    pub fn message(&self) -> Option<&ConfirmOrChallengeMessage> {
        match &self.proof {
            ReceiptProof::LegacyHash { .. } => None,
            ReceiptProof::ConfirmChallenge { message, .. } => Some(message),
        }
    }

    pub fn is_challenge(&self) -> bool {
        self.message().map_or(false, ConfirmOrChallengeMessage::is_challenge)
    }

    pub fn signatures(&self) -> &[Signature] {
        match &self.proof {
            ReceiptProof::LegacyHash { signatures } => signatures,
            ReceiptProof::ConfirmChallenge { signatures, .. } => signatures,
        }
    }

    pub fn to_applied_receipt(&self) -> AppliedReceipt {
        AppliedReceipt {
            tx_id: self.tx_id,
            result: self.result,
            applied_votes: vec![self.applied_vote.clone()],
            confirm_or_challenge: self.message().cloned().into_iter().collect(),
            app_data_hash: self.app_data_hash,
        }
    }

    pub fn verify(&self, groups: &TxGroups, min_unique_challenges: usize) -> Result<(), ReceiptError> {
        let vote = &self.applied_vote;
        if vote.tx_id != self.tx_id || vote.app_data_hash != self.app_data_hash {
            return Err(ReceiptError::Inconsistent);
        }
        if !vote.is_well_formed() || !vote.verify() {
            return Err(ReceiptError::BadVote);
        }
        if !groups.in_execution_group(&vote.node_id) {
            return Err(ReceiptError::ForeignVoter(vote.node_id.clone()));
        }
        let vote_hash = vote.hash();

        match &self.proof {
            ReceiptProof::LegacyHash { signatures } => {
                if self.result != vote.transaction_result {
                    return Err(ReceiptError::WrongResult);
                }
                let announced = vote_hash_signing_digest(&vote_hash);
                let got = count_distinct(signatures, groups, |_| announced);
                let need = groups.super_majority_floor() + 1;
                if got < need {
                    return Err(ReceiptError::NotEnoughSignatures { got, need });
                }
            }
            ReceiptProof::ConfirmChallenge { message, signatures } => {
                if !message.verify() {
                    return Err(ReceiptError::BadMessage);
                }
                if message.vote_hash() != vote_hash {
                    return Err(ReceiptError::VoteMismatch);
                }
                if !groups.in_execution_group(&message.node_id) {
                    return Err(ReceiptError::Ineligible(message.node_id.clone()));
                }
                match message.kind {
                    MessageKind::Confirm => {
                        if !groups.is_eligible_confirmer(&message.node_id) {
                            return Err(ReceiptError::Ineligible(message.node_id.clone()));
                        }
                        if self.result != vote.transaction_result {
                            return Err(ReceiptError::WrongResult);
                        }
                    }
                    MessageKind::Challenge => {
                        if self.result {
                            return Err(ReceiptError::WrongResult);
                        }
                        let got = count_distinct(signatures, groups, |signer| {
                            confirm_or_challenge_digest(MessageKind::Challenge, &vote_hash, signer)
                        });
                        if got < min_unique_challenges {
                            return Err(ReceiptError::NotEnoughSignatures {
                                got,
                                need: min_unique_challenges,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Distinct execution group signers whose signature verifies over `digest_for(signer)`.
fn count_distinct<F>(signatures: &[Signature], groups: &TxGroups, digest_for: F) -> usize
where
    F: Fn(&Pubkey) -> Digest,
{
    let mut seen = HashSet::new();
    for sig in signatures {
        if !groups.in_execution_group(&sig.signer) || seen.contains(&sig.signer) {
            continue;
        }
        if sig.verify(&digest_for(&sig.signer)) {
            seen.insert(sig.signer.clone());
        }
    }
    seen.len()
}

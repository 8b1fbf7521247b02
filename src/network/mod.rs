pub mod local;
pub mod node;

/*
    Transport is an external collaborator. Point-to-point asks are expected to
    be authenticated and may fail or time out; gossip is best effort fan-out.
    Nothing in the consensus core assumes a message was delivered, a missing
    answer only lowers the redundancy a robust query can reach.
*/

use async_trait::async_trait;

use crate::common::crypto::{Digest, Pubkey};
use crate::common::error::NetworkError;
use crate::consensus::message::{AppliedVoteQueryResponse, ConfirmOrChallengeQueryResponse, Message};
use crate::consensus::receipt::AppliedReceipt2;
use crate::consensus::timestamp::TimestampReceipt;
use crate::consensus::vote::{AccountId, TxId};

/// Point-to-point queries a node answers for its peers.
#[derive(Clone, Debug)]
pub enum Request {
    GetAppliedVote { tx_id: TxId },
    GetConfirmOrChallenge { tx_id: TxId },
    GetAppliedReceipt { tx_id: TxId },
    GetAccountHash { account_id: AccountId },
    GetTxTimestamp { tx_id: TxId, cycle_counter: u64 },
}

#[derive(Clone, Debug)]
pub enum Response {
    AppliedVote(Option<AppliedVoteQueryResponse>),
    ConfirmOrChallenge(Option<ConfirmOrChallengeQueryResponse>),
    AppliedReceipt(Option<AppliedReceipt2>),
    AccountHash(Option<Digest>),
    TxTimestamp(Option<TimestampReceipt>),
}

impl Request {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Request::GetAppliedVote { .. } => "get_applied_vote",
            Request::GetConfirmOrChallenge { .. } => "get_confirm_or_challenge",
            Request::GetAppliedReceipt { .. } => "get_applied_receipt",
            Request::GetAccountHash { .. } => "get_account_hash",
            Request::GetTxTimestamp { .. } => "get_tx_timestamp",
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn ask(&self, from: &Pubkey, to: &Pubkey, request: Request) -> Result<Response, NetworkError>;

    async fn gossip(&self, from: &Pubkey, message: Message, group: &[Pubkey]);
}

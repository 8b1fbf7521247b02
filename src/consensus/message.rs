use super::receipt::AppliedReceipt2;
use super::vote::{AppliedVote, AppliedVoteHash, Hashable, TxId};
use crate::common::crypto::{Digest, FieldHasher, Keypair, Pubkey, Signature};

/*
    Phase two of the protocol. Once the best-ranked vote for a transaction has
    settled, execution group members either confirm it (their own vote hash
    matches) or challenge it (their own vote disagrees and their view of the
    touched accounts holds up against the account's consensus group).

    Both kinds of message embed the settled best vote, so a receiver can check
    it is talking about the same vote it settled on.
*/

/// Gossip payloads exchanged between nodes of a transaction group.
#[derive(Clone, Debug)]
pub enum Message {
    Vote(AppliedVote),
    VoteHash(AppliedVoteHash),
    ConfirmOrChallenge(ConfirmOrChallengeMessage),
    Receipt(AppliedReceipt2),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageKind {
    Confirm,
    Challenge,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConfirmOrChallengeMessage {
    pub kind: MessageKind,
    pub node_id: Pubkey,
    pub applied_vote: AppliedVote,
    pub sig: Signature,
}

impl Message {
    pub fn tx_id(&self) -> &TxId {
        match self {
            Message::Vote(vote) => &vote.tx_id,
            Message::VoteHash(vote_hash) => &vote_hash.tx_id,
            Message::ConfirmOrChallenge(msg) => &msg.applied_vote.tx_id,
            Message::Receipt(receipt) => &receipt.tx_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Message::Vote(_) => "vote",
            Message::VoteHash(_) => "vote_hash",
            Message::ConfirmOrChallenge(msg) => msg.kind.as_str(),
            Message::Receipt(_) => "receipt",
        }
    }
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Confirm => "confirm",
            MessageKind::Challenge => "challenge",
        }
    }
}

impl AsRef<[u8]> for MessageKind {
    fn as_ref(&self) -> &[u8] {
        match self {
            MessageKind::Confirm => &[1u8],
            MessageKind::Challenge => &[2u8],
        }
    }
}

/// Digest a confirmer or challenger signs: what it says, about which vote, as whom.
pub fn confirm_or_challenge_digest(kind: MessageKind, vote_hash: &Digest, node_id: &Pubkey) -> Digest {
    FieldHasher::new("confirm-or-challenge")
        .field(kind.as_ref())
        .field(vote_hash)
        .field(node_id.as_ref())
        .finish()
}

impl ConfirmOrChallengeMessage {
    pub fn new(kind: MessageKind, applied_vote: AppliedVote, keypair: &Keypair) -> Self {
        let node_id = keypair.pubkey();
        let sig = keypair.sign(&confirm_or_challenge_digest(kind, &applied_vote.hash(), &node_id));
        ConfirmOrChallengeMessage {
            kind,
            node_id,
            applied_vote,
            sig,
        }
    }

    pub fn is_confirm(&self) -> bool {
        self.kind == MessageKind::Confirm
    }

    pub fn is_challenge(&self) -> bool {
        self.kind == MessageKind::Challenge
    }

    pub fn vote_hash(&self) -> Digest {
        self.applied_vote.hash()
    }

    /// Sender signature plus the embedded vote's own signature.
    pub fn verify(&self) -> bool {
        self.sig.signer == self.node_id
            && self
                .sig
                .verify(&confirm_or_challenge_digest(self.kind, &self.vote_hash(), &self.node_id))
            && self.applied_vote.is_well_formed()
            && self.applied_vote.verify()
    }
}

/// Answer to `get_applied_vote`: the responder's current best vote.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedVoteQueryResponse {
    pub tx_id: TxId,
    pub applied_vote: AppliedVote,
    pub applied_vote_hash: Digest,
}

/// Answer to `get_confirm_or_challenge`: the responder's best confirm or
/// sufficiently supported challenge.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConfirmOrChallengeQueryResponse {
    pub tx_id: TxId,
    pub applied_vote_hash: Digest,
    pub result: ConfirmOrChallengeMessage,
    pub unique_count: usize,
    /// Signatures of every distinct challenger, or just the confirmer's.
    pub signatures: Vec<Signature>,
}

impl ConfirmOrChallengeQueryResponse {
    /// Key that two independent responders must agree on.
    pub fn agreement_key(&self) -> (Digest, MessageKind, &Pubkey, usize) {
        (self.applied_vote_hash, self.result.kind, &self.result.node_id, self.unique_count)
    }
}

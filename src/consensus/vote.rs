use crate::common::crypto::{Digest, FieldHasher, Keypair, Pubkey, Signature};

pub type TxId = Digest;
pub type AccountId = Digest;

pub trait Hashable {
    fn hash(&self) -> Digest;
}

/// One account touched by a transaction, as observed by the executor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AccountDelta {
    pub account_id: AccountId,
    pub hash_before: Digest,
    pub hash_after: Digest,
}

/// Output of application-level execution, handed to the vote creator.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExecutionResult {
    pub tx_id: TxId,
    pub transaction_result: bool,
    pub cant_apply: bool,
    pub accounts: Vec<AccountDelta>,
    pub app_data_hash: Digest,
}

/// One node's verdict on a transaction.
///
/// The three account arrays are parallel and sorted by account id so that
/// honest nodes produce byte-identical hashing input.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedVote {
    pub tx_id: TxId,
    pub transaction_result: bool,
    pub account_ids: Vec<AccountId>,
    pub account_state_hash_before: Vec<Digest>,
    pub account_state_hash_after: Vec<Digest>,
    pub cant_apply: bool,
    pub node_id: Pubkey,
    pub app_data_hash: Digest,
    pub sig: Signature,
}

/// Lightweight announcement used when votes are exchanged as hashes only.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedVoteHash {
    pub tx_id: TxId,
    pub vote_hash: Digest,
    pub sig: Signature,
}

impl AppliedVote {
    pub fn from_execution(result: &ExecutionResult, keypair: &Keypair) -> Self {
        let mut accounts = result.accounts.clone();
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));

        let mut vote = AppliedVote {
            tx_id: result.tx_id,
            transaction_result: result.transaction_result,
            account_ids: accounts.iter().map(|a| a.account_id).collect(),
            account_state_hash_before: accounts.iter().map(|a| a.hash_before).collect(),
            account_state_hash_after: accounts.iter().map(|a| a.hash_after).collect(),
            cant_apply: result.cant_apply,
            node_id: keypair.pubkey(),
            app_data_hash: result.app_data_hash,
            sig: Signature { signer: keypair.pubkey(), sig: [0u8; 64] },
        };
        vote.sig = keypair.sign(&vote_signing_digest(&vote.hash()));
        vote
    }

    /// Parallel arrays of equal length, account ids strictly ascending.
    pub fn is_well_formed(&self) -> bool {
        let n = self.account_ids.len();
        n == self.account_state_hash_before.len()
            && n == self.account_state_hash_after.len()
            && self.account_ids.windows(2).all(|w| w[0] < w[1])
    }

    /// Checks the signature against the voter the vote claims to come from.
    pub fn verify(&self) -> bool {
        self.sig.signer == self.node_id && self.sig.verify(&vote_signing_digest(&self.hash()))
    }

    pub fn hash_before(&self, account_id: &AccountId) -> Option<&Digest> {
        let idx = self.account_ids.binary_search(account_id).ok()?;
        self.account_state_hash_before.get(idx)
    }
}

impl Hashable for AppliedVote {
    fn hash(&self) -> Digest {
        calculate_vote_hash(self)
    }
}

/// Hash of the outcome a vote claims, independent of who voted.
///
/// Covers neither `node_id` nor the signature, so identical outcomes from
/// different voters hash the same.
pub fn calculate_vote_hash(vote: &AppliedVote) -> Digest {
    let mut hasher = FieldHasher::new("applied-vote")
        .field(&vote.tx_id)
        .flag(vote.transaction_result)
        .number(vote.account_ids.len() as u64);
    for id in &vote.account_ids {
        hasher = hasher.field(id);
    }
    hasher = hasher.number(vote.account_state_hash_after.len() as u64);
    for after in &vote.account_state_hash_after {
        hasher = hasher.field(after);
    }
    hasher = hasher.number(vote.account_state_hash_before.len() as u64);
    for before in &vote.account_state_hash_before {
        hasher = hasher.field(before);
    }
    hasher
        .flag(vote.cant_apply)
        .field(&vote.app_data_hash)
        .finish()
}

/// Digest a voter signs over its full vote.
pub fn vote_signing_digest(vote_hash: &Digest) -> Digest {
    FieldHasher::new("applied-vote-sig").field(vote_hash).finish()
}

/// Digest a voter signs when announcing only its vote hash.
pub fn vote_hash_signing_digest(vote_hash: &Digest) -> Digest {
    FieldHasher::new("applied-vote-hash-sig").field(vote_hash).finish()
}

impl AppliedVoteHash {
    pub fn new(tx_id: TxId, vote_hash: Digest, keypair: &Keypair) -> Self {
        AppliedVoteHash {
            tx_id,
            vote_hash,
            sig: keypair.sign(&vote_hash_signing_digest(&vote_hash)),
        }
    }

    pub fn signer(&self) -> &Pubkey {
        &self.sig.signer
    }

    pub fn verify(&self) -> bool {
        self.sig.verify(&vote_hash_signing_digest(&self.vote_hash))
    }
}

use std::collections::{BTreeMap, HashMap};

use super::vote::TxId;
use crate::common::crypto::{Digest, FieldHasher, Keypair, Signature};

/// Canonical timestamp for a transaction, signed by its timestamp authority.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TimestampReceipt {
    pub tx_id: TxId,
    pub cycle_counter: u64,
    pub timestamp: u64,
    pub sig: Signature,
}

impl TimestampReceipt {
    pub fn new(tx_id: TxId, cycle_counter: u64, timestamp: u64, keypair: &Keypair) -> Self {
        let sig = keypair.sign(&timestamp_digest(&tx_id, cycle_counter, timestamp));
        TimestampReceipt {
            tx_id,
            cycle_counter,
            timestamp,
            sig,
        }
    }

    pub fn verify(&self) -> bool {
        self.sig
            .verify(&timestamp_digest(&self.tx_id, self.cycle_counter, self.timestamp))
    }
}

fn timestamp_digest(tx_id: &TxId, cycle_counter: u64, timestamp: u64) -> Digest {
    FieldHasher::new("tx-timestamp")
        .field(tx_id)
        .number(cycle_counter)
        .number(timestamp)
        .finish()
}

/// Timestamp receipts grouped by the cycle they were issued in.
///
/// Owned by the processor and pruned explicitly on every cycle boundary;
/// only the last `keep_cycles` cycles are retained.
#[derive(Debug)]
pub struct TxTimestampCache {
    by_cycle: BTreeMap<u64, HashMap<TxId, TimestampReceipt>>,
    keep_cycles: u64,
}

impl TxTimestampCache {
    pub fn new(keep_cycles: u64) -> Self {
        TxTimestampCache {
            by_cycle: BTreeMap::new(),
            keep_cycles: keep_cycles.max(1),
        }
    }

    pub fn get(&self, cycle_counter: u64, tx_id: &TxId) -> Option<&TimestampReceipt> {
        self.by_cycle.get(&cycle_counter)?.get(tx_id)
    }

    pub fn insert(&mut self, receipt: TimestampReceipt) -> &TimestampReceipt {
        self.by_cycle
            .entry(receipt.cycle_counter)
            .or_default()
            .entry(receipt.tx_id)
            .or_insert(receipt)
    }

    /// Drops every cycle older than the retention window ending at `current_cycle`.
    pub fn prune(&mut self, current_cycle: u64) -> usize {
        let oldest_kept = current_cycle.saturating_sub(self.keep_cycles - 1);
        let kept = self.by_cycle.split_off(&oldest_kept);
        let dropped = std::mem::replace(&mut self.by_cycle, kept);
        dropped.values().map(HashMap::len).sum()
    }

    pub fn len(&self) -> usize {
        self.by_cycle.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

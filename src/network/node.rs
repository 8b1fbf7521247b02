use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::common::crypto::short_digest;
use crate::consensus::processor::ConsensusProcessor;
use crate::consensus::receipt::AppliedReceipt;
use crate::consensus::vote::{ExecutionResult, TxId};

/// Work handed to a node by the surrounding system.
#[derive(Debug)]
pub enum Command {
    Track { tx_id: TxId, timestamp: u64 },
    Execute(ExecutionResult),
    CycleBoundary(u64),
}

/// Drives one processor: applies commands as they arrive and ticks every
/// in-flight transaction on a fixed interval.
pub struct Node {
    processor: Arc<ConsensusProcessor>,
    inbox: Receiver<Command>,
    receipts: Sender<AppliedReceipt>,
    tick: Duration,
}

impl Node {
    pub fn new(
        processor: Arc<ConsensusProcessor>,
        receipts: Sender<AppliedReceipt>,
        tick: Duration,
    ) -> (Self, Sender<Command>) {
        let (commands, inbox) = mpsc::channel(100);
        let node = Node {
            processor,
            inbox,
            receipts,
            tick,
        };
        (node, commands)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(node = %self.processor.id().short(), "node running");
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                command = self.inbox.recv() => {
                    let Some(command) = command else {
                        debug!(node = %self.processor.id().short(), "command channel closed, stopping");
                        return;
                    };
                    self.apply(command).await;
                }
                _ = interval.tick() => {
                    for receipt in self.processor.tick().await {
                        if self.receipts.send(receipt).await.is_err() {
                            debug!(node = %self.processor.id().short(), "receipt consumer gone, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn apply(&self, command: Command) {
        match command {
            Command::Track { tx_id, timestamp } => {
                self.processor.track_transaction(tx_id, timestamp).await;
            }
            Command::Execute(result) => {
                // Voting may sleep for the rank delay, keep the loop responsive.
                let processor = self.processor.clone();
                tokio::spawn(async move {
                    let tx_id = result.tx_id;
                    if let Err(err) = processor.create_and_share_vote(result).await {
                        error!(
                            target: "consensus::invariant",
                            node = %processor.id().short(),
                            tx = %short_digest(&tx_id),
                            error = %err,
                            "vote creation failed"
                        );
                    }
                });
            }
            Command::CycleBoundary(cycle) => {
                self.processor.on_cycle_boundary(cycle).await;
            }
        }
    }
}

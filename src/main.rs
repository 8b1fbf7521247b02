/*
    Demo node: spins up an in-process cluster of POQ consensus processors,
    feeds them synthetic executed transactions and prints every receipt as
    the nodes finalize it.

    Each transaction runs the full protocol: rank-gated vote gossip, a quiet
    period, confirm or challenge of the best-ranked vote, then a receipt
    checked against the rest of the group through robust queries.
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use poq_node::common::config::Settings;
use poq_node::common::crypto::{short_digest, FieldHasher, Keypair};
use poq_node::common::error::{ConsensusError, ConsensusResult};
use poq_node::common::time::{Clock, SystemClock};
use poq_node::consensus::receipt::AppliedReceipt;
use poq_node::consensus::topology::StaticTopology;
use poq_node::consensus::vote::{AccountDelta, ExecutionResult, TxId};
use poq_node::network::local::LocalCluster;
use poq_node::network::node::{Command, Node};

#[derive(Parser)]
#[command(author, version, about = "In-process POQ consensus demo")]
struct Cli {
    /// TOML settings file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides `node.cluster_size`
    #[arg(short, long)]
    nodes: Option<usize>,
    #[arg(short, long, default_value_t = 3)]
    transactions: u64,
}

#[tokio::main]
async fn main() -> ConsensusResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(nodes) = cli.nodes {
        settings.node.cluster_size = nodes;
    }
    if settings.node.cluster_size == 0 || settings.node.cluster_size > u8::MAX as usize {
        return Err(ConsensusError::Config(format!(
            "cluster size must be between 1 and {}",
            u8::MAX
        )));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let keypairs: Vec<Keypair> = (1..=settings.node.cluster_size as u8)
        .map(|i| Keypair::from_seed([i; 32]))
        .collect();
    let topology = StaticTopology::new(keypairs.iter().map(Keypair::pubkey).collect());
    let cluster = LocalCluster::new(keypairs, topology, settings.consensus.clone(), clock.clone()).await;
    info!(
        nodes = settings.node.cluster_size,
        mode = ?settings.consensus.voting_mode,
        "cluster ready"
    );

    let (receipt_tx, mut receipt_rx) = mpsc::channel::<AppliedReceipt>(1024);
    let mut inboxes = Vec::with_capacity(cluster.processors.len());
    for processor in &cluster.processors {
        let (node, inbox) = Node::new(
            processor.clone(),
            receipt_tx.clone(),
            Duration::from_millis(settings.node.tick_ms),
        );
        node.spawn();
        inboxes.push(inbox);
    }
    drop(receipt_tx);

    for index in 0..cli.transactions {
        let (tx_id, result) = synthetic_transaction(index);
        let timestamp = clock.now_ms();
        for inbox in &inboxes {
            send(inbox, Command::Track { tx_id, timestamp }).await?;
        }
        for inbox in &inboxes {
            send(inbox, Command::Execute(result.clone())).await?;
        }
    }

    let expected = cli.transactions as usize * inboxes.len();
    let deadline = Duration::from_millis(settings.consensus.tx_expire_ms);
    let mut received = 0;
    while received < expected {
        match tokio::time::timeout(deadline, receipt_rx.recv()).await {
            Ok(Some(receipt)) => {
                received += 1;
                print_receipt(&receipt);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(received, expected, "timed out waiting for receipts");
                break;
            }
        }
    }
    info!(received, expected, "done");
    Ok(())
}

async fn send(inbox: &mpsc::Sender<Command>, command: Command) -> ConsensusResult<()> {
    inbox
        .send(command)
        .await
        .map_err(|_| ConsensusError::InvariantViolation("node stopped".to_string()))
}

/// Every third transaction fails so both outcomes show up.
fn synthetic_transaction(index: u64) -> (TxId, ExecutionResult) {
    let tx_id = FieldHasher::new("demo-tx").number(index).finish();
    let account_id = FieldHasher::new("demo-account").number(index).finish();
    let result = ExecutionResult {
        tx_id,
        transaction_result: index % 3 != 2,
        cant_apply: false,
        accounts: vec![AccountDelta {
            account_id,
            hash_before: FieldHasher::new("demo-before").field(&account_id).finish(),
            hash_after: FieldHasher::new("demo-after").field(&account_id).finish(),
        }],
        app_data_hash: FieldHasher::new("demo-app-data").field(&tx_id).finish(),
    };
    (tx_id, result)
}

fn print_receipt(receipt: &AppliedReceipt) {
    let decided_by = receipt
        .confirm_or_challenge
        .first()
        .map(|msg| format!("{} by {}", msg.kind.as_str(), msg.node_id.short()))
        .unwrap_or_else(|| "vote hash majority".to_string());
    println!(
        "tx {} result={} votes={} {}",
        short_digest(&receipt.tx_id),
        receipt.result,
        receipt.applied_votes.len(),
        decided_by
    );
}

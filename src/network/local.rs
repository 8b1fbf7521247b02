use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use super::{Request, Response, Transport};
use crate::common::config::ConsensusConfig;
use crate::common::crypto::{Keypair, Pubkey};
use crate::common::error::NetworkError;
use crate::common::time::Clock;
use crate::consensus::message::Message;
use crate::consensus::processor::{Collaborators, ConsensusProcessor};
use crate::consensus::store::AccountStore;
use crate::consensus::topology::{StaticTopology, Topology};

/// In-process transport: every registered processor is one "node".
///
/// Gossip is delivered directly and in order, which keeps clusters built on
/// it deterministic. Nodes can be taken offline (asks fail, gossip is lost)
/// or made deaf (gossip to them is lost, asks still work), and asks from or
/// to a node can be slowed down.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<Pubkey, Weak<ConsensusProcessor>>>,
    offline: RwLock<HashSet<Pubkey>>,
    deaf: RwLock<HashSet<Pubkey>>,
    latency: RwLock<HashMap<Pubkey, Duration>>,
    gossip_sent: AtomicUsize,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, processor: &Arc<ConsensusProcessor>) {
        self.nodes
            .write()
            .await
            .insert(processor.id().clone(), Arc::downgrade(processor));
    }

    pub async fn set_offline(&self, node: &Pubkey, offline: bool) {
        let mut set = self.offline.write().await;
        if offline {
            set.insert(node.clone());
        } else {
            set.remove(node);
        }
    }

    pub async fn set_deaf(&self, node: &Pubkey, deaf: bool) {
        let mut set = self.deaf.write().await;
        if deaf {
            set.insert(node.clone());
        } else {
            set.remove(node);
        }
    }

    pub async fn set_latency(&self, node: &Pubkey, latency: Option<Duration>) {
        let mut map = self.latency.write().await;
        match latency {
            Some(latency) => map.insert(node.clone(), latency),
            None => map.remove(node),
        };
    }

    pub fn gossip_sent(&self) -> usize {
        self.gossip_sent.load(Ordering::SeqCst)
    }

    async fn lookup(&self, node: &Pubkey) -> Option<Arc<ConsensusProcessor>> {
        if self.offline.read().await.contains(node) {
            return None;
        }
        self.nodes.read().await.get(node)?.upgrade()
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn ask(&self, from: &Pubkey, to: &Pubkey, request: Request) -> Result<Response, NetworkError> {
        if self.offline.read().await.contains(from) {
            return Err(NetworkError::Unreachable(from.short()));
        }
        let latency = {
            let latency = self.latency.read().await;
            latency.get(from).or_else(|| latency.get(to)).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let target = self
            .lookup(to)
            .await
            .ok_or_else(|| NetworkError::Unreachable(to.short()))?;
        Ok(target.handle_request(from, request).await)
    }

    async fn gossip(&self, from: &Pubkey, message: Message, group: &[Pubkey]) {
        self.gossip_sent.fetch_add(1, Ordering::SeqCst);
        if self.offline.read().await.contains(from) {
            return;
        }
        let mut targets = Vec::with_capacity(group.len());
        for node in group.iter().filter(|node| *node != from) {
            if self.deaf.read().await.contains(node) {
                trace!(peer = %node.short(), "gossip dropped, peer is deaf");
                continue;
            }
            if let Some(target) = self.lookup(node).await {
                targets.push(target);
            }
        }
        for target in targets {
            target.handle_gossip(from, message.clone()).await;
        }
    }
}

/// A fully wired in-process cluster sharing one `LocalNetwork`.
pub struct LocalCluster {
    pub network: Arc<LocalNetwork>,
    pub topology: Arc<StaticTopology>,
    pub processors: Vec<Arc<ConsensusProcessor>>,
    pub stores: Vec<Arc<AccountStore>>,
}

impl LocalCluster {
    pub async fn new(
        keypairs: Vec<Keypair>,
        topology: StaticTopology,
        config: ConsensusConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let network = Arc::new(LocalNetwork::new());
        let topology = Arc::new(topology);
        let mut processors = Vec::with_capacity(keypairs.len());
        let mut stores = Vec::with_capacity(keypairs.len());

        for keypair in keypairs {
            let store = Arc::new(AccountStore::new());
            let topology_handle: Arc<dyn Topology> = topology.clone();
            let processor = Arc::new(ConsensusProcessor::new(
                keypair,
                config.clone(),
                Collaborators {
                    topology: topology_handle,
                    transport: network.clone(),
                    accounts: store.clone(),
                    clock: clock.clone(),
                },
            ));
            network.register(&processor).await;
            processors.push(processor);
            stores.push(store);
        }

        LocalCluster {
            network,
            topology,
            processors,
            stores,
        }
    }

    /// Cluster of `size` nodes with deterministic seeds and ranks 1..=size.
    pub async fn with_fixed_ranks(size: u8, config: ConsensusConfig, clock: Arc<dyn Clock>) -> Self {
        let keypairs: Vec<Keypair> = (1..=size).map(|i| Keypair::from_seed([i; 32])).collect();
        let topology = StaticTopology::with_fixed_ranks(
            keypairs
                .iter()
                .enumerate()
                .map(|(i, keypair)| (keypair.pubkey(), i as u64 + 1))
                .collect(),
        );
        Self::new(keypairs, topology, config, clock).await
    }

    pub fn node(&self, index: usize) -> &Arc<ConsensusProcessor> {
        &self.processors[index]
    }
}

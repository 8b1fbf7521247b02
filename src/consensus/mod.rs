pub mod confirm;
pub mod message;
pub mod processor;
pub mod producer;
pub mod receipt;
pub mod robust;
pub mod state;
pub mod store;
pub mod timestamp;
pub mod topology;
pub mod vote;

pub use message::{ConfirmOrChallengeMessage, Message, MessageKind};
pub use processor::{Collaborators, ConsensusProcessor};
pub use receipt::{AppliedReceipt, AppliedReceipt2, ReceiptProof};
pub use robust::{robust_query, RobustQueryResult};
pub use state::{TxConsensusState, TxQueue};
pub use store::{AccountState, AccountStore};
pub use timestamp::{TimestampReceipt, TxTimestampCache};
pub use topology::{NodeWithRank, StaticTopology, Topology, TxGroups};
pub use vote::{AccountDelta, AppliedVote, AppliedVoteHash, ExecutionResult, Hashable, TxId};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::common::config::VotingMode;
    use crate::common::crypto::Keypair;
    use crate::common::error::DeferReason;
    use crate::common::time::ManualClock;
    use crate::network::local::LocalCluster;
    use crate::testing::{cluster, config, execution, TX};

    fn keypair(index: usize) -> Keypair {
        Keypair::from_seed([index as u8 + 1; 32])
    }

    async fn vote_all(cluster: &LocalCluster, results: Vec<Option<ExecutionResult>>) {
        for (processor, result) in cluster.processors.iter().zip(results) {
            if let Some(result) = result {
                processor.create_and_share_vote(result).await.unwrap();
            }
        }
    }

    async fn confirm_all(cluster: &LocalCluster) {
        for processor in &cluster.processors {
            processor.confirm_or_challenge(&TX).await.unwrap();
        }
    }

    async fn best_voter(cluster: &LocalCluster, index: usize) -> Option<u64> {
        cluster
            .node(index)
            .inspect(&TX, |state| state.received_best_voter.as_ref().map(|v| v.rank))
            .await
            .flatten()
    }

    #[tokio::test]
    async fn test_vote_confirm_challenge_rank_directions() {
        // Arrange: ranks 5, 3, 8 for A, B, C and an observer ranked 1
        let clock = Arc::new(ManualClock::new(0));
        let ranks = [5u64, 3, 8, 1];
        let keypairs: Vec<Keypair> = (0..4).map(keypair).collect();
        let topology = StaticTopology::with_fixed_ranks(
            keypairs.iter().zip(ranks).map(|(k, r)| (k.pubkey(), r)).collect(),
        );
        let cluster = LocalCluster::new(keypairs, topology, config(VotingMode::ConfirmChallenge), clock).await;
        let observer = cluster.node(3);
        observer.track_transaction(TX, 0).await;
        let (a, b, c) = (keypair(0), keypair(1), keypair(2));

        // Act & Assert: votes, higher rank wins
        let vote_a = AppliedVote::from_execution(&execution(true, 1), &a);
        let vote_b = AppliedVote::from_execution(&execution(false, 1), &b);
        let vote_c = AppliedVote::from_execution(&execution(true, 1), &c);
        assert!(observer.try_append_vote(&vote_a).await);
        assert!(!observer.try_append_vote(&vote_b).await);
        assert_eq!(best_voter(&cluster, 3).await, Some(5));
        assert!(observer.try_append_vote(&vote_c).await);
        assert_eq!(best_voter(&cluster, 3).await, Some(8));

        // Act & Assert: confirms, higher rank wins
        let confirm = |k: &Keypair| ConfirmOrChallengeMessage::new(MessageKind::Confirm, vote_c.clone(), k);
        assert!(observer.try_append_message(&confirm(&a)).await);
        assert!(!observer.try_append_message(&confirm(&b)).await);
        assert!(observer.try_append_message(&confirm(&c)).await);
        let best_confirm = observer
            .inspect(&TX, |s| s.received_best_confirmed_node.as_ref().map(|n| n.rank))
            .await
            .flatten();
        assert_eq!(best_confirm, Some(8));

        // Act & Assert: challenges, lower rank wins and every signer counts once
        let challenge = |k: &Keypair| ConfirmOrChallengeMessage::new(MessageKind::Challenge, vote_c.clone(), k);
        assert!(observer.try_append_message(&challenge(&a)).await);
        assert!(observer.try_append_message(&challenge(&c)).await);
        assert!(observer.try_append_message(&challenge(&b)).await);
        assert!(!observer.try_append_message(&challenge(&b)).await);
        let (best_challenger, unique) = observer
            .inspect(&TX, |s| (s.received_best_challenger.as_ref().map(|n| n.rank), s.unique_challenges_count))
            .await
            .unwrap();
        assert_eq!(best_challenger, Some(3));
        assert_eq!(unique, 3);
    }

    #[tokio::test]
    async fn test_stale_messages_rejected() {
        let (cluster, _clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        let observer = cluster.node(0);
        let low = AppliedVote::from_execution(&execution(true, 1), &keypair(1));
        let high = AppliedVote::from_execution(&execution(false, 1), &keypair(3));
        assert!(observer.try_append_vote(&low).await);

        // Confirm about the current best vote, then a better vote moves the best
        let confirm = ConfirmOrChallengeMessage::new(MessageKind::Confirm, low.clone(), &keypair(2));
        assert!(observer.try_append_message(&confirm).await);
        assert!(observer.try_append_vote(&high).await);

        let cleared = observer
            .inspect(&TX, |s| s.received_best_confirmation.is_none())
            .await
            .unwrap();
        assert!(cleared);
        assert!(!observer.try_append_message(&confirm).await);
    }

    #[tokio::test]
    async fn test_confirm_path_produces_passing_receipt() {
        // Arrange
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert: best confirmer is the best-ranked node
        assert!(receipt.result);
        assert_eq!(receipt.applied_votes.len(), 1);
        assert_eq!(receipt.confirm_or_challenge.len(), 1);
        assert!(receipt.confirm_or_challenge[0].is_confirm());
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(3).pubkey());

        // Assert: receipt gossip reached every peer
        for processor in &cluster.processors[1..] {
            assert_eq!(processor.receipt(&TX).await, Some(receipt.clone()));
        }
    }

    #[tokio::test]
    async fn test_no_double_finalization() {
        // Arrange
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);
        confirm_all(&cluster).await;
        let node = cluster.node(0);
        let receipt = node.try_produce_receipt(&TX).await.unwrap();
        let best_hash = node.inspect(&TX, |s| s.received_best_vote_hash).await.flatten();
        let gossip_before = cluster.network.gossip_sent();

        // Act: late votes and messages
        let late_vote = AppliedVote::from_execution(&execution(false, 1), &keypair(3));
        let late_challenge = ConfirmOrChallengeMessage::new(
            MessageKind::Challenge,
            receipt.applied_votes[0].clone(),
            &keypair(1),
        );
        let late_confirm = ConfirmOrChallengeMessage::new(
            MessageKind::Confirm,
            receipt.applied_votes[0].clone(),
            &keypair(2),
        );

        // Assert
        assert!(!node.try_append_vote(&late_vote).await);
        assert!(!node.try_append_message(&late_challenge).await);
        assert!(!node.try_append_message(&late_confirm).await);
        assert_eq!(node.inspect(&TX, |s| s.received_best_vote_hash).await.flatten(), best_hash);
        assert_eq!(node.try_produce_receipt(&TX).await, Ok(receipt));
        assert_eq!(cluster.network.gossip_sent(), gossip_before);
    }

    #[tokio::test]
    async fn test_challenge_beats_confirm() {
        // Arrange: everyone agrees, but one challenge arrives before the confirms
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        let best = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_vote.clone())
            .await
            .flatten()
            .unwrap();
        let challenge = ConfirmOrChallengeMessage::new(MessageKind::Challenge, best, &keypair(1));
        for processor in &cluster.processors {
            assert!(processor.try_append_message(&challenge).await);
        }

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let has_confirm = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_confirmation.is_some())
            .await
            .unwrap();
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        assert!(has_confirm);
        assert!(!receipt.result);
        assert!(receipt.confirm_or_challenge[0].is_challenge());
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(1).pubkey());
    }

    #[tokio::test]
    async fn test_eligibility_enforced() {
        // Arrange: only the two best-ranked nodes may vote or confirm
        let clock = Arc::new(ManualClock::new(0));
        let keypairs: Vec<Keypair> = (0..4).map(keypair).collect();
        let topology = StaticTopology::with_fixed_ranks(
            keypairs.iter().enumerate().map(|(i, k)| (k.pubkey(), i as u64 + 1)).collect(),
        )
        .with_eligible_count(2);
        let cluster = LocalCluster::new(keypairs, topology, config(VotingMode::ConfirmChallenge), clock).await;
        let observer = cluster.node(3);
        observer.track_transaction(TX, 0).await;

        let low_vote = AppliedVote::from_execution(&execution(true, 1), &keypair(0));
        assert!(!observer.try_append_vote(&low_vote).await);
        let vote = AppliedVote::from_execution(&execution(true, 1), &keypair(2));
        assert!(observer.try_append_vote(&vote).await);

        // Act & Assert: valid signatures, wrong sets
        let low_confirm = ConfirmOrChallengeMessage::new(MessageKind::Confirm, vote.clone(), &keypair(0));
        assert!(low_confirm.verify());
        assert!(!observer.try_append_message(&low_confirm).await);

        let outsider = Keypair::from_seed([99; 32]);
        let foreign = ConfirmOrChallengeMessage::new(MessageKind::Challenge, vote.clone(), &outsider);
        assert!(!observer.try_append_message(&foreign).await);

        // Any execution group member may challenge
        let challenge = ConfirmOrChallengeMessage::new(MessageKind::Challenge, vote, &keypair(0));
        assert!(observer.try_append_message(&challenge).await);
    }

    #[tokio::test]
    async fn test_phase_gating_is_idempotent() {
        // Arrange
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        let gossip_before = cluster.network.gossip_sent();
        let node = cluster.node(0);

        // Act: quiet period not over yet
        clock.advance(50);
        node.confirm_or_challenge(&TX).await.unwrap();
        node.confirm_or_challenge(&TX).await.unwrap();

        // Assert
        let (accepting, completed) = node
            .inspect(&TX, |s| (s.accept_vote_message, s.completed_confirmed_or_challenge))
            .await
            .unwrap();
        assert!(accepting);
        assert!(!completed);
        assert_eq!(cluster.network.gossip_sent(), gossip_before);
        assert_eq!(node.try_produce_receipt(&TX).await, Err(DeferReason::WaitingPhase));

        // Act: quiet period over
        clock.advance(50);
        node.confirm_or_challenge(&TX).await.unwrap();
        assert!(cluster.network.gossip_sent() > gossip_before);
    }

    #[tokio::test]
    async fn test_wait_limit_closes_vote_phase() {
        let mut settings = config(VotingMode::ConfirmChallenge);
        settings.vote_quiet_period_ms = 10_000;
        let (cluster, clock) = cluster(4, settings).await;
        let node = cluster.node(0);
        let vote = AppliedVote::from_execution(&execution(true, 1), &keypair(2));
        assert!(node.try_append_vote(&vote).await);

        clock.advance(999);
        node.confirm_or_challenge(&TX).await.unwrap();
        assert!(node.inspect(&TX, |s| s.accept_vote_message).await.unwrap());

        clock.advance(1);
        node.confirm_or_challenge(&TX).await.unwrap();
        assert!(!node.inspect(&TX, |s| s.accept_vote_message).await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_super_majority() {
        // Arrange
        let (cluster, _clock) = cluster(4, config(VotingMode::LegacyHash)).await;

        // Act: two of four vote
        vote_all(&cluster, vec![Some(execution(true, 1)), Some(execution(true, 1)), None, None]).await;
        assert_eq!(
            cluster.node(0).try_produce_receipt(&TX).await,
            Err(DeferReason::NotEnoughVotes)
        );

        // Act: third vote reaches floor(2 * 4 / 3) + 1
        cluster.node(2).create_and_share_vote(execution(true, 1)).await.unwrap();
        assert_eq!(
            cluster.node(3).try_produce_receipt(&TX).await,
            Err(DeferReason::WinningVoteUnknown)
        );
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        assert!(receipt.result);
        assert!(receipt.confirm_or_challenge.is_empty());
        let receipt2 = cluster.node(0).inspect(&TX, |s| s.applied_receipt2.clone()).await.flatten().unwrap();
        assert!(matches!(receipt2.proof, ReceiptProof::LegacyHash { ref signatures } if signatures.len() == 3));
        assert_eq!(cluster.node(3).receipt(&TX).await, Some(receipt));
    }

    #[tokio::test]
    async fn test_challenged_vote_fails() {
        // Arrange: node 3 (best rank) disagrees, nodes 1 and 2 challenge, node 0 did not execute
        let mut settings = config(VotingMode::ConfirmChallenge);
        settings.min_unique_challenges = 2;
        let (cluster, clock) = cluster(4, settings).await;
        vote_all(
            &cluster,
            vec![None, Some(execution(false, 1)), Some(execution(false, 1)), Some(execution(true, 1))],
        )
        .await;
        let challenged = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_vote.clone())
            .await
            .flatten()
            .unwrap();
        assert_eq!(challenged.node_id, keypair(3).pubkey());

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        let unique = cluster.node(0).inspect(&TX, |s| s.unique_challenges_count).await.unwrap();
        assert_eq!(unique, 2);
        assert!(!receipt.result);
        assert_eq!(receipt.applied_votes, vec![challenged]);
        assert!(receipt.confirm_or_challenge[0].is_challenge());
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(1).pubkey());
    }

    #[tokio::test]
    async fn test_single_challenge_below_minimum_defers_to_confirm() {
        let mut settings = config(VotingMode::ConfirmChallenge);
        settings.min_unique_challenges = 2;
        let (cluster, clock) = cluster(4, settings).await;
        vote_all(
            &cluster,
            vec![Some(execution(true, 1)), Some(execution(false, 1)), Some(execution(true, 1)), Some(execution(true, 1))],
        )
        .await;

        clock.advance(200);
        confirm_all(&cluster).await;
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        assert!(receipt.result);
        assert!(receipt.confirm_or_challenge[0].is_confirm());
    }

    #[tokio::test]
    async fn test_robust_confirm_outranks_local() {
        // Arrange: node 0 misses every confirm but its own
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        cluster.network.set_deaf(cluster.node(0).id(), true).await;

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let local = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_confirmation.as_ref().map(|m| m.node_id.clone()))
            .await
            .flatten();
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        assert_eq!(local, Some(keypair(0).pubkey()));
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(3).pubkey());
    }

    #[tokio::test]
    async fn test_robust_vote_replaces_local_best() {
        // Arrange: node 0 hears no votes but its own
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        cluster.network.set_deaf(cluster.node(0).id(), true).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        cluster.network.set_deaf(cluster.node(0).id(), false).await;
        assert_eq!(best_voter(&cluster, 0).await, Some(1));

        // Act
        clock.advance(200);
        cluster.node(0).confirm_or_challenge(&TX).await.unwrap();

        // Assert
        assert_eq!(best_voter(&cluster, 0).await, Some(4));
    }

    #[tokio::test]
    async fn test_robust_confirm_overrides_local_challenge() {
        // Arrange: only node 0 holds a challenge, the rest of the group saw confirms
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        let best = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_vote.clone())
            .await
            .flatten()
            .unwrap();
        let challenge = ConfirmOrChallengeMessage::new(MessageKind::Challenge, best, &keypair(1));
        assert!(cluster.node(0).try_append_message(&challenge).await);

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        assert!(receipt.result);
        assert!(receipt.confirm_or_challenge[0].is_confirm());
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(3).pubkey());
    }

    #[tokio::test]
    async fn test_better_ranked_robust_challenge_adopted() {
        // Arrange: node 0 holds a challenge from rank 3, the group one from rank 2
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        let best = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_vote.clone())
            .await
            .flatten()
            .unwrap();
        let local = ConfirmOrChallengeMessage::new(MessageKind::Challenge, best.clone(), &keypair(2));
        let remote = ConfirmOrChallengeMessage::new(MessageKind::Challenge, best, &keypair(1));
        assert!(cluster.node(0).try_append_message(&local).await);
        for processor in &cluster.processors[1..] {
            assert!(processor.try_append_message(&remote).await);
        }

        // Act
        clock.advance(200);
        confirm_all(&cluster).await;
        let receipt = cluster.node(0).try_produce_receipt(&TX).await.unwrap();

        // Assert
        assert!(!receipt.result);
        assert!(receipt.confirm_or_challenge[0].is_challenge());
        assert_eq!(receipt.confirm_or_challenge[0].node_id, keypair(1).pubkey());
    }

    #[tokio::test]
    async fn test_cancelled_receipt_attempt_can_retry() {
        // Arrange
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);
        confirm_all(&cluster).await;
        let node = cluster.node(0);
        cluster.network.set_latency(node.id(), Some(Duration::from_millis(500))).await;

        // Act: the caller gives up while the group is being queried
        let first = timeout(Duration::from_millis(50), node.try_produce_receipt(&TX)).await;
        assert!(first.is_err());
        assert!(!node.inspect(&TX, |s| s.producing_receipt.is_running()).await.unwrap());
        cluster.network.set_latency(node.id(), None).await;

        // Assert
        let receipt = node.try_produce_receipt(&TX).await.unwrap();
        assert!(receipt.result);
    }

    #[tokio::test]
    async fn test_cancelled_confirm_phase_resumes() {
        // Arrange
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);
        let node = cluster.node(3);
        cluster.network.set_latency(node.id(), Some(Duration::from_millis(500))).await;

        // Act: cancelled during the best vote query, after the vote phase closed
        let first = timeout(Duration::from_millis(50), node.confirm_or_challenge(&TX)).await;
        assert!(first.is_err());
        let (accepting, completed) = node
            .inspect(&TX, |s| (s.accept_vote_message, s.completed_confirmed_or_challenge))
            .await
            .unwrap();
        assert!(!accepting);
        assert!(!completed);
        cluster.network.set_latency(node.id(), None).await;
        node.confirm_or_challenge(&TX).await.unwrap();

        // Assert: the best-ranked node confirmed on the retry
        let confirmer = cluster
            .node(0)
            .inspect(&TX, |s| s.received_best_confirmation.as_ref().map(|m| m.node_id.clone()))
            .await
            .flatten();
        assert_eq!(confirmer, Some(keypair(3).pubkey()));
        assert!(node.inspect(&TX, |s| s.completed_confirmed_or_challenge).await.unwrap());
    }

    #[tokio::test]
    async fn test_inconclusive_robust_query_defers() {
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);
        confirm_all(&cluster).await;
        cluster.network.set_offline(cluster.node(1).id(), true).await;

        let node = cluster.node(0);
        assert_eq!(node.try_produce_receipt(&TX).await, Err(DeferReason::RobustQueryInconclusive));
        assert!(node.receipt(&TX).await.is_none());

        cluster.network.set_offline(cluster.node(1).id(), false).await;
        assert!(node.try_produce_receipt(&TX).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_transaction_syncs_receipt() {
        // Arrange: node 0 misses the receipt gossip and expires
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);
        confirm_all(&cluster).await;
        cluster.network.set_deaf(cluster.node(0).id(), true).await;
        let receipt = cluster.node(1).try_produce_receipt(&TX).await.unwrap();
        for processor in &cluster.processors[2..] {
            processor.try_produce_receipt(&TX).await.unwrap();
        }

        let node = cluster.node(0);
        assert!(node.expire(&TX).await);
        assert!(node.is_expired(&TX).await);
        assert_eq!(node.try_produce_receipt(&TX).await, Err(DeferReason::Expired));
        let late = AppliedVote::from_execution(&execution(true, 1), &keypair(3));
        assert!(!node.try_append_vote(&late).await);

        // Act
        let synced = node.sync_receipt(&TX).await.unwrap();

        // Assert
        assert_eq!(synced, Some(receipt));
    }

    #[tokio::test]
    async fn test_automatic_expiry() {
        let mut settings = config(VotingMode::ConfirmChallenge);
        settings.tx_expire_ms = 1_000;
        let (cluster, clock) = cluster(4, settings).await;
        let node = cluster.node(0);

        clock.advance(1_001);
        assert_eq!(node.try_produce_receipt(&TX).await, Err(DeferReason::Expired));
        assert!(node.is_expired(&TX).await);
        assert!(node.tick().await.is_empty());
        assert!(node.remove_transaction(&TX).await);
        assert_eq!(node.try_produce_receipt(&TX).await, Err(DeferReason::UnknownTransaction));
    }

    #[tokio::test]
    async fn test_tick_hands_off_receipt_once() {
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        vote_all(&cluster, (0..4).map(|_| Some(execution(true, 1))).collect()).await;
        clock.advance(200);

        let mut finalized = Vec::new();
        for processor in &cluster.processors {
            finalized.extend(processor.tick().await);
        }
        for processor in &cluster.processors {
            finalized.extend(processor.tick().await);
        }

        assert_eq!(finalized.len(), 4);
        assert!(finalized.iter().all(|r| r.result));
        for processor in &cluster.processors {
            assert!(processor.tick().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_tx_timestamp_from_authority() {
        let (cluster, clock) = cluster(4, config(VotingMode::ConfirmChallenge)).await;
        clock.set(1_234);

        let first = cluster.node(0).get_tx_timestamp(&TX, 1).await.unwrap();
        clock.advance(500);
        let second = cluster.node(1).get_tx_timestamp(&TX, 1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.timestamp, 1_234);
        assert_eq!(first.sig.signer, keypair(3).pubkey());
        assert!(first.verify());

        // Pruned locally, refetched unchanged from the authority
        cluster.node(0).on_cycle_boundary(10).await;
        assert_eq!(cluster.node(0).get_tx_timestamp(&TX, 1).await.unwrap(), first);
    }
}

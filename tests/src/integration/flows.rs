//! # Validator Flows
//!
//! ```text
//! client ──tx──→ [node 0] ──INIT──→ [node 1..n]
//!                    │                   │
//!                    └──── SIGN/ACCEPT ──┘
//!                              │
//!                   agreed pool → proposer round
//!                              │
//!                     finish_ballot on every node
//! ```
//!
//! ## Test Categories
//!
//! 1. **Happy Path**: a submitted transaction lands in the same block everywhere
//! 2. **Rejection**: an overdrawn transaction never reaches a block
//! 3. **Chaining**: consecutive transactions from one account
//! 4. **Liveness**: progress with one validator silent
//! 5. **Height Handover**: round 0 agrees at every height when all nodes run

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared_types::{KeyPair, Operation};

    use crate::integration::{fast_config, Devnet};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const LIMIT: Duration = Duration::from_secs(30);

    fn devnet(name: &str, validators: usize, online: usize) -> Devnet {
        let mut config = fast_config(name);
        if online < validators {
            // INIT at 100% would need the silent node.
            config.thresholds.init = 67;
        }
        let mut net = Devnet::build(config, validators, online).unwrap();
        net.start().unwrap();
        net
    }

    // =========================================================================
    // HAPPY PATH
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_four_validators_commit_identical_blocks() {
        let mut net = devnet("flows-identical", 4, 4);
        let target = KeyPair::from_seed([7u8; 32]);
        let tx = net.create_account(target.address(), 5_000).unwrap();
        assert!(net.submit(0, &tx).unwrap());

        assert!(
            net.wait_until(LIMIT, |n| n.confirmed_everywhere(&tx.hash)).await,
            "transaction not committed on every node"
        );

        let height = ic_01_storage::repository::get_block_transaction(
            net.nodes[0].store.as_ref(),
            &tx.hash,
        )
        .unwrap()
        .unwrap()
        .block_height;
        let reference = net.block_at(0, height).unwrap().unwrap();
        assert!(reference.header.transactions.contains(&tx.hash));
        for index in 1..net.nodes.len() {
            let block = net.block_at(index, height).unwrap().unwrap();
            assert_eq!(block.hash, reference.hash, "node {index} diverged at {height}");
            assert_eq!(net.balance(index, &target.address()).unwrap(), Some(5_000));
        }

        // Status reflects the committed chain.
        for node in &net.nodes {
            let status = node.runner.status();
            assert!(status.height >= height);
            assert_eq!(status.connected, 3);
        }

        net.stop().await;
    }

    // =========================================================================
    // REJECTION
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overdrawn_transaction_never_committed() {
        let mut net = devnet("flows-overdrawn", 4, 4);
        let too_much = net.config.genesis.balance + 1;
        let bad = net
            .create_account(KeyPair::from_seed([8u8; 32]).address(), too_much)
            .unwrap();
        assert!(net.submit(0, &bad).unwrap());

        // Let several blocks go by.
        assert!(net.wait_until(LIMIT, |n| n.min_height() >= 3).await);
        assert!(!net.confirmed_anywhere(&bad.hash));
        for node in &net.nodes {
            assert!(node.runner.consensus().pool().get(&bad.hash).is_none());
        }

        // The chain still accepts a valid transaction afterwards.
        let good = net
            .create_account(KeyPair::from_seed([9u8; 32]).address(), 100)
            .unwrap();
        assert!(net.submit(1, &good).unwrap());
        assert!(net.wait_until(LIMIT, |n| n.confirmed_everywhere(&good.hash)).await);

        net.stop().await;
    }

    // =========================================================================
    // CHAINING
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_consecutive_transactions_follow_checkpoint() {
        let mut net = devnet("flows-chain", 4, 4);
        let first_target = KeyPair::from_seed([10u8; 32]);
        let second_target = KeyPair::from_seed([11u8; 32]);

        let first = net.create_account(first_target.address(), 1_000).unwrap();
        assert!(net.submit(0, &first).unwrap());
        assert!(net.wait_until(LIMIT, |n| n.confirmed_everywhere(&first.hash)).await);

        // Built on the checkpoint `first` left behind.
        let second = net
            .genesis_transaction(vec![
                Operation::CreateAccount {
                    target: second_target.address(),
                    amount: 300,
                },
                Operation::Payment {
                    target: first_target.address(),
                    amount: 200,
                },
            ])
            .unwrap();
        assert_eq!(second.body.checkpoint, first.hash);
        assert!(net.submit(2, &second).unwrap());
        assert!(net.wait_until(LIMIT, |n| n.confirmed_everywhere(&second.hash)).await);

        for index in 0..net.nodes.len() {
            assert_eq!(net.balance(index, &first_target.address()).unwrap(), Some(1_200));
            assert_eq!(net.balance(index, &second_target.address()).unwrap(), Some(300));
        }

        net.stop().await;
    }

    // =========================================================================
    // LIVENESS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_progress_with_one_silent_validator() {
        let mut net = devnet("flows-silent", 4, 3);
        assert_eq!(net.nodes.len(), 3);

        let target = KeyPair::from_seed([12u8; 32]);
        let tx = net.create_account(target.address(), 42).unwrap();
        assert!(net.submit(0, &tx).unwrap());
        assert!(
            net.wait_until(LIMIT, |n| n.confirmed_everywhere(&tx.hash)).await,
            "three of four validators should still commit"
        );

        // Rounds owned by the silent proposer time out instead of stalling.
        assert!(net.wait_until(LIMIT, |n| n.min_height() >= 5).await);
        for node in &net.nodes {
            assert!(node.runner.is_running());
            assert_eq!(node.runner.status().connected, 2);
        }

        net.stop().await;
    }

    // =========================================================================
    // HEIGHT HANDOVER
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_round_zero_agrees_at_consecutive_heights() {
        let mut config = fast_config("flows-round-zero");
        // Long state timeouts, so only a lost ballot pushes a height past
        // round 0.
        config.timeouts.init = 3_000;
        config.timeouts.sign = 3_000;
        config.timeouts.accept = 3_000;
        // Proposers go as soon as they enter a height, usually before their
        // peers have committed the previous block.
        config.block.min_proposal_transactions = 0;
        let mut net = Devnet::build(config, 4, 4).unwrap();
        net.start().unwrap();

        const HEIGHTS: u64 = 6;
        assert!(net.wait_until(LIMIT, |n| n.min_height() >= HEIGHTS).await);
        for index in 0..net.nodes.len() {
            for height in 1..=HEIGHTS {
                let block = net.block_at(index, height).unwrap().unwrap();
                assert_eq!(
                    block.header.round, 0,
                    "node {index} needed round {} at height {height}",
                    block.header.round
                );
                let reference = net.block_at(0, height).unwrap().unwrap();
                assert_eq!(block.hash, reference.hash);
            }
        }

        net.stop().await;
    }
}

use super::*;
use crate::adapters::MemoryNetwork;
use crate::config::devnet_keypair;
use ic_01_storage::{repository as repo, MemoryStore};
use shared_types::{Operation, TransactionBody};

fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network_id = "runner-test".into();
    config.timeouts.init = 200;
    config.timeouts.sign = 200;
    config.timeouts.accept = 200;
    config.timeouts.propose = 100;
    config.block.base_fee = 10;
    config.sweeper.interval_ms = 50;
    config
}

fn single_node(config: &NodeConfig, network: &MemoryNetwork) -> (NodeRunner, Arc<dyn KeyValueStore>) {
    let keypair = devnet_keypair(0);
    let validators = ValidatorSet::new([keypair.address()]).unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let (transport, inbox) = network.join(keypair.address(), 0).unwrap();
    let runner = NodeRunner::new(
        config,
        NodeDependencies {
            keypair,
            validators,
            store: Arc::clone(&store),
            transport: Arc::new(transport),
            inbox,
            telemetry: NodeTelemetry::for_node("runner-test").unwrap(),
            selector: None,
        },
    )
    .unwrap();
    (runner, store)
}

fn create_account(config: &NodeConfig, target: &KeyPair) -> Transaction {
    let genesis = config.genesis.keypair().unwrap();
    let body = TransactionBody {
        source: genesis.address(),
        fee: 10,
        checkpoint: [0u8; 32],
        operations: vec![Operation::CreateAccount {
            target: target.address(),
            amount: 500,
        }],
        created: 1,
    };
    Transaction::new(&genesis, config.network_id.as_bytes(), body).unwrap()
}

#[tokio::test]
async fn test_new_writes_genesis_and_reports_status() {
    let config = fast_config();
    let network = MemoryNetwork::new();
    let (runner, store) = single_node(&config, &network);

    let genesis = repo::latest_block(store.as_ref()).unwrap().unwrap();
    assert_eq!(genesis.height(), 0);
    assert_eq!(runner.node().validators, vec![devnet_keypair(0).address()]);
    assert_eq!(runner.node().network_id, "runner-test");
    assert_eq!(runner.consensus().address(), devnet_keypair(0).address());
    assert_eq!(runner.connection_manager().count_connected(), 0);

    let status = runner.status();
    assert_eq!(status.height, 0);
    assert_eq!(status.state, BallotState::None);
    assert_eq!(status.pool, 0);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn test_single_node_finalizes_submitted_transaction() {
    let config = fast_config();
    let network = MemoryNetwork::new();
    let (mut runner, store) = single_node(&config, &network);
    runner.start().unwrap();
    assert!(runner.is_running());
    assert!(matches!(runner.start(), Err(RuntimeError::AlreadyStarted)));

    let target = KeyPair::from_seed([42u8; 32]);
    let tx = create_account(&config, &target);
    assert!(network.submit(&runner.node().address, &tx).unwrap());

    let confirmed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if repo::block_transaction_exists(store.as_ref(), &tx.hash).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(confirmed.is_ok(), "transaction never finalized");
    assert_eq!(
        repo::get_account(store.as_ref(), &target.address())
            .unwrap()
            .map(|a| a.balance),
        Some(500)
    );
    assert!(runner.status().height >= 1);

    runner.stop().await;
    assert!(!runner.is_running());
}

#[tokio::test]
async fn test_intake_drops_malformed_messages() {
    let config = fast_config();
    let network = MemoryNetwork::new();
    let (runner, _store) = single_node(&config, &network);
    let transport = runner.connection_manager().as_ref();

    let garbage = NetworkMessage {
        kind: MessageKind::Ballot,
        payload: b"not json".to_vec(),
    };
    assert!(intake(runner.consensus().as_ref(), transport, garbage).await.is_none());

    let connect = NetworkMessage::connect(&devnet_keypair(3).address()).unwrap();
    assert!(matches!(
        intake(runner.consensus().as_ref(), transport, connect).await,
        Some(DriverRequest::Connected)
    ));
}

#[tokio::test]
async fn test_intake_reports_transitions() {
    let config = fast_config();
    let network = MemoryNetwork::new();
    let (runner, _store) = single_node(&config, &network);
    let tx = create_account(&config, &KeyPair::from_seed([43u8; 32]));
    let message = NetworkMessage::transaction(&tx).unwrap();

    // A lone validator settles the transaction on intake.
    let engine = runner.consensus().as_ref();
    let transport = runner.connection_manager().as_ref();
    let transitions = match intake(engine, transport, message.clone()).await {
        Some(DriverRequest::Transitions(transitions)) => transitions,
        other => panic!("expected transitions, got {other:?}"),
    };
    assert!(transitions.iter().any(|t| t.is_agreed()));
    assert_eq!(runner.consensus().pool().agreed_count(), 1);

    // Same transaction again is benign.
    assert!(intake(engine, transport, message).await.is_none());
}

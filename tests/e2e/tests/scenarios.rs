use blockscope_core::{
    decoder::TxType,
    errors::IngestError,
    events::{Event, EventKind},
    ledger::{ChannelId, InMemoryLedger},
    storage::InMemoryIndexStore,
    testing::{ChainFixture, TxFixture, FIXTURE_CERT_PEM, FIXTURE_MSP_ID},
};
use blockscope_e2e::{append_simple_blocks, engine, RecordingLedger, ORGANIZATION, PEER};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_fresh_start_ingests_from_genesis() {
    let channel = ChannelId::from("mychannel");
    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut chain = ChainFixture::new("mychannel");
    let blocks = append_simple_blocks(ledger.inner(), &mut chain, 3);
    let store = InMemoryIndexStore::new();

    let mut engine = engine(&channel, &ledger, &store);
    assert_eq!(
        engine
            .reconcile(&channel)
            .await
            .expect("Failed to reconcile"),
        0
    );
    assert_eq!(
        engine
            .poll_once(&channel, &CancellationToken::new())
            .await
            .expect("Failed to poll"),
        3
    );

    assert_eq!(store.checkpoint(&channel), Some(2));
    assert_eq!(engine.cursor(&channel).unwrap().next_block, 3);

    let block_events = store.events_of(EventKind::Block);
    assert_eq!(block_events.len(), 3);
    for (event, block) in block_events.iter().zip(&blocks) {
        match event {
            Event::Block(event) => assert_eq!(event.block_hash, block.hash()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    // A restarted agent resumes after the checkpoint.
    let mut restarted = blockscope_e2e::engine(&channel, &ledger, &store);
    assert_eq!(
        restarted
            .reconcile(&channel)
            .await
            .expect("Failed to reconcile"),
        3
    );
}

#[tokio::test]
async fn test_resume_after_matching_checkpoint() {
    let channel = ChannelId::from("mychannel");
    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut chain = ChainFixture::new("mychannel");
    let blocks = append_simple_blocks(ledger.inner(), &mut chain, 5);

    let store = InMemoryIndexStore::new();
    store.seed_block(&channel, 2, &blocks[2].hash());

    let mut engine = engine(&channel, &ledger, &store);
    assert_eq!(
        engine
            .reconcile(&channel)
            .await
            .expect("Failed to reconcile"),
        3
    );
    assert_eq!(
        engine
            .poll_once(&channel, &CancellationToken::new())
            .await
            .expect("Failed to poll"),
        2
    );

    assert_eq!(ledger.fetched(&channel), vec![2, 3, 4]);
    assert_eq!(store.checkpoint(&channel), Some(4));
    assert!(store
        .events()
        .iter()
        .all(|event| event.block_number() >= 3));
}

#[tokio::test]
async fn test_divergent_checkpoint_halts_channel() {
    let channel = ChannelId::from("mychannel");
    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut chain = ChainFixture::new("mychannel");
    append_simple_blocks(ledger.inner(), &mut chain, 4);

    let store = InMemoryIndexStore::new();
    store.seed_block(&channel, 2, &"ab".repeat(32));

    let mut engine = engine(&channel, &ledger, &store);
    let err = engine
        .reconcile(&channel)
        .await
        .expect_err("Reconcile should fail on divergence");

    assert!(err.is_fatal());
    match err {
        IngestError::ChainDivergence {
            block_number,
            stored_hash,
            ..
        } => {
            assert_eq!(block_number, 2);
            assert_eq!(stored_hash, "ab".repeat(32));
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert!(matches!(
        engine.poll_once(&channel, &CancellationToken::new()).await,
        Err(IngestError::NotReconciled(_))
    ));
    assert_eq!(ledger.fetched(&channel), vec![2]);
    assert!(store.events().is_empty());
    assert_eq!(store.checkpoint(&channel), Some(2));
}

#[tokio::test]
async fn test_endorser_transaction_events() {
    let channel = ChannelId::from("mychannel");
    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut chain = ChainFixture::new("mychannel");
    let block = chain.next_block(vec![TxFixture::endorser("tx-1", "mychannel", "mycc", "1.0")
        .read("ns1", "k0")
        .write("ns1", "k1", br#"{"assetId":"A-1","owner":"alice"}"#)
        .write("ns1", "k2", b"plain")
        .delete("ns1", "k3")]);
    ledger.inner().push_block(&channel, block.raw.clone());
    let store = InMemoryIndexStore::new();

    let mut engine = engine(&channel, &ledger, &store);
    engine
        .reconcile(&channel)
        .await
        .expect("Failed to reconcile");
    engine
        .poll_once(&channel, &CancellationToken::new())
        .await
        .expect("Failed to poll");

    let events = store.events();
    let kinds = events.iter().map(Event::kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            EventKind::Write,
            EventKind::Write,
            EventKind::Write,
            EventKind::Transaction,
            EventKind::Block
        ]
    );

    let writes = events
        .iter()
        .filter_map(|event| match event {
            Event::Write(write) => Some(write),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(writes[0].namespace, "ns1");
    assert_eq!(writes[0].key, "k1");
    assert_eq!(writes[0].tx_id, "tx-1");
    assert_eq!(writes[0].chaincode_name, "mycc");
    assert_eq!(writes[0].chaincode_version, "1.0");
    assert_eq!(writes[0].linking_key, "A-1");
    assert_eq!(writes[0].linked_values.get("owner"), Some(&json!("alice")));
    assert_eq!(writes[0].creator, FIXTURE_CERT_PEM);
    assert_eq!(writes[0].creator_org, FIXTURE_MSP_ID);
    assert!(!writes[0].is_delete);
    assert_eq!(writes[1].key, "k2");
    assert_eq!(writes[1].value, json!("plain"));
    assert_eq!(writes[1].linking_key, "");
    assert!(!writes[1].is_delete);
    assert_eq!(writes[2].key, "k3");
    assert!(writes[2].is_delete);
    assert_eq!(writes[2].value, json!(""));
    assert_eq!(writes[2].linking_key, "");
    assert_eq!(
        events[1].document_id(),
        format!("{}_mychannel_0_0_1", PEER)
    );

    match &events[3] {
        Event::Transaction(tx) => {
            assert_eq!(tx.tx_id, "tx-1");
            assert_eq!(tx.organization, ORGANIZATION);
            assert_eq!(tx.transaction_type, TxType::EndorserTransaction);
            assert_eq!(tx.validation_code, Some(0));
            let endorsement = tx.endorsement.as_ref().expect("Missing endorsement");
            assert_eq!(endorsement.readset.len(), 1);
            assert_eq!(endorsement.writeset.len(), 3);
            assert!(endorsement.writeset[2].is_delete);
        }
        other => panic!("unexpected event {:?}", other),
    }

    match &events[4] {
        Event::Block(event) => {
            assert_eq!(event.block_hash, block.hash());
            assert_eq!(event.transactions, vec!["tx-1".to_string()]);
            assert_eq!(event.previous_hash, "");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_store_failure_does_not_advance() {
    let channel = ChannelId::from("mychannel");
    let ledger = RecordingLedger::new(InMemoryLedger::new());
    let mut chain = ChainFixture::new("mychannel");
    append_simple_blocks(ledger.inner(), &mut chain, 2);
    let store = InMemoryIndexStore::new();

    let mut engine = engine(&channel, &ledger, &store);
    engine
        .reconcile(&channel)
        .await
        .expect("Failed to reconcile");

    // Block 0 publishes three events, then the store goes down mid block 1.
    store.fail_puts_after(Some(4));
    let err = engine
        .poll_once(&channel, &CancellationToken::new())
        .await
        .expect_err("Poll should fail");
    assert!(!err.is_fatal());
    assert_eq!(store.checkpoint(&channel), Some(0));
    assert_eq!(engine.cursor(&channel).unwrap().next_block, 1);

    store.fail_puts_after(None);
    assert_eq!(
        engine
            .poll_once(&channel, &CancellationToken::new())
            .await
            .expect("Failed to poll"),
        1
    );
    assert_eq!(store.checkpoint(&channel), Some(1));
    assert_eq!(store.events().len(), 6);
}

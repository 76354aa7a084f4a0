//! Invoke and query against the simulated network:
//! - the committed payload and block of an invoke
//! - nothing reaches the orderer unless every peer endorsed
//! - rejected, invalid and unknown commits are told apart
//! - a query is answered by the first usable peer

mod common;

use common::*;
use fabric_client::{
    error::{FailureReason, InvokeError, OrderingError, QueryError},
    simulator::{CommitMode, OrdererFault, PeerFault},
    transport::Transport,
};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_invoke_then_query() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    let height = fixture.network.channel_height(CHANNEL);

    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
        .unwrap();
    assert_eq!(result.payload, b"10");
    assert_eq!(result.block_number, height + 1);
    assert_eq!(result.chaincode.name, CHAINCODE);
    assert_eq!(fixture.network.world_state(CHANNEL, "a").as_deref(), Some("10"));

    let answer = fixture
        .transactions
        .query(&channel, "get", args(&["a"]))
        .await
        .unwrap();
    assert_eq!(answer.payload, b"10");
    assert_eq!(answer.peer, "peer0.clinic");
    assert!(answer.failures.is_empty());
    // Queries are never ordered
    assert_eq!(fixture.network.channel_height(CHANNEL), height + 1);
}

#[tokio::test]
async fn test_invoke_as_registered_user() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    let user = std::sync::Arc::new(fabric_common::identity::Identity::new(
        "user1",
        "org1.department1",
        "InsurerMSP",
        fabric_common::identity::Enrollment {
            private_key_pem: "key".into(),
            certificate_pem: "cert".into(),
        },
    ));

    fixture
        .transactions
        .invoke_as(&channel, user.clone(), "set", args(&["b", "7"]))
        .await
        .unwrap();
    let answer = fixture
        .transactions
        .query_as(&channel, user, "get", args(&["b"]))
        .await
        .unwrap();
    assert_eq!(answer.payload, b"7");
}

#[tokio::test]
async fn test_nothing_instantiated() {
    let fixture = Fixture::new();
    let channel = fixture.channel().await;

    assert!(matches!(
        fixture
            .transactions
            .invoke(&channel, "set", args(&["a", "10"]))
            .await,
        Err(InvokeError::NoChaincodeInstantiated(name)) if name == CHANNEL
    ));
    assert!(matches!(
        fixture.transactions.query(&channel, "get", args(&["a"])).await,
        Err(QueryError::NoChaincodeInstantiated(_))
    ));
    assert_eq!(fixture.network.broadcast_count(), 0);
}

#[tokio::test]
async fn test_partial_endorsement_is_never_broadcast() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    let broadcasts = fixture.network.broadcast_count();
    fixture.network.set_peer_fault(
        "peer1.clinic",
        Some(PeerFault::Failure(String::from("chaincode panicked"))),
    );

    match fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
    {
        Err(InvokeError::EndorsementFailed {
            failed,
            total,
            failures,
            ..
        }) => {
            assert_eq!((failed, total), (1, 3));
            assert_eq!(failures[0].peer, "peer1.clinic");
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }

    assert_eq!(fixture.network.broadcast_count(), broadcasts);
    assert!(fixture.network.world_state(CHANNEL, "a").is_none());
}

#[tokio::test]
async fn test_unverified_endorsement_is_a_failure() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .network
        .set_peer_fault("peer0.insurer", Some(PeerFault::Unverified));

    match fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
    {
        Err(InvokeError::EndorsementFailed { failures, .. }) => {
            assert!(matches!(failures[0].reason, FailureReason::Unverified))
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }
}

#[tokio::test]
async fn test_slow_peer_times_out() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
        .unwrap();
    fixture
        .network
        .set_peer_fault("peer0.insurer", Some(PeerFault::Delay(Duration::from_secs(2))));

    match fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "20"]))
        .await
    {
        Err(InvokeError::EndorsementFailed { failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                failures[0].reason,
                FailureReason::Timeout(wait) if wait == PROPOSAL_WAIT
            ));
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }

    // The clinic peers still answer queries
    let answer = fixture
        .transactions
        .query(&channel, "get", args(&["a"]))
        .await
        .unwrap();
    assert_eq!(answer.payload, b"10");
    assert_eq!(answer.failures.len(), 1);
    assert_eq!(answer.failures[0].peer, "peer0.insurer");
}

#[tokio::test]
async fn test_orderer_rejection() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .network
        .set_orderer_fault(Some(OrdererFault::Reject(String::from("BAD_REQUEST"))));

    match fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
    {
        Err(InvokeError::Ordering(OrderingError::Rejected { orderer, reason, .. })) => {
            assert_eq!(orderer, ORDERER);
            assert_eq!(reason, "BAD_REQUEST");
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }
}

#[tokio::test]
async fn test_unreachable_orderer_leaves_commit_unknown() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    let broadcasts = fixture.network.broadcast_count();
    fixture
        .network
        .set_orderer_fault(Some(OrdererFault::Unreachable));

    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await;
    assert!(matches!(
        result,
        Err(InvokeError::Ordering(OrderingError::CommitUnknown { .. }))
    ));
    // Attempted once, never retried
    assert_eq!(fixture.network.broadcast_count(), broadcasts + 1);
}

#[tokio::test]
async fn test_missing_commit_event() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    let broadcasts = fixture.network.broadcast_count();
    fixture.network.set_commit_mode(CommitMode::Silent);

    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await;
    match result {
        Err(InvokeError::Ordering(OrderingError::CommitUnknown { orderer, .. })) => {
            assert_eq!(orderer, ORDERER)
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }
    // The commit wait ran out and nothing was resubmitted
    assert_eq!(fixture.network.broadcast_count(), broadcasts + 1);
}

#[tokio::test]
async fn test_commit_during_broadcast_is_observed() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;

    // Immediate mode emits the block before broadcast returns
    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
        .unwrap();
    assert_eq!(result.payload, b"10");

    // The event hub does not replay past blocks to a late listener
    let late = fixture
        .network
        .subscribe_commit(CHANNEL, &result.tx_id)
        .await
        .unwrap();
    assert!(timeout(COMMIT_WAIT / 5, late).await.is_err());
}

#[tokio::test]
async fn test_delayed_commit_within_wait() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .network
        .set_commit_mode(CommitMode::Delayed(COMMIT_WAIT / 5));

    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
        .unwrap();
    assert_eq!(result.payload, b"10");
}

#[tokio::test]
async fn test_invalid_commit() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .network
        .set_commit_mode(CommitMode::Invalid(String::from("MVCC_READ_CONFLICT")));

    let result = fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await;
    assert!(matches!(
        result,
        Err(InvokeError::Ordering(OrderingError::CommitInvalid { validation_code, .. }))
            if validation_code == "MVCC_READ_CONFLICT"
    ));
    assert!(fixture.network.world_state(CHANNEL, "a").is_none());
}

#[tokio::test]
async fn test_query_skips_failing_peer() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    fixture
        .transactions
        .invoke(&channel, "set", args(&["a", "10"]))
        .await
        .unwrap();
    fixture.network.set_peer_fault(
        "peer0.clinic",
        Some(PeerFault::Failure(String::from("ledger unavailable"))),
    );

    let answer = fixture
        .transactions
        .query(&channel, "get", args(&["a"]))
        .await
        .unwrap();
    assert_eq!(answer.payload, b"10");
    assert_eq!(answer.peer, "peer1.clinic");
    assert_eq!(answer.failures.len(), 1);
    assert_eq!(answer.failures[0].peer, "peer0.clinic");
}

#[tokio::test]
async fn test_query_without_answer() {
    let fixture = Fixture::new();
    let channel = fixture.deployed_channel().await;
    for peer in peers() {
        fixture
            .network
            .set_peer_fault(&peer.name, Some(PeerFault::Failure(String::from("down"))));
    }

    match fixture.transactions.query(&channel, "get", args(&["a"])).await {
        Err(QueryError::Unanswered { failures, .. }) => {
            let names: Vec<_> = failures.iter().map(|f| f.peer.as_str()).collect();
            assert_eq!(names, vec!["peer0.clinic", "peer1.clinic", "peer0.insurer"]);
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.payload)),
    }
}

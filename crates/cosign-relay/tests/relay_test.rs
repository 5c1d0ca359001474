//! End-to-end relay behavior over loopback QUIC, using the client transport.

use std::time::Duration;

use cosign_client::transport::{RelayConnection, TransportConfig, connect_relay};
use cosign_proto::{
    PeerId, Rejection, RelayNotice, RelayRequest, SessionDescription, SessionId, Signal,
    SignalingEnvelope,
};
use cosign_relay::{RelayConfig, RelayRuntimeConfig, Server};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay(relay: RelayConfig) -> String {
    let server = Server::bind(RelayRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        relay,
        ..Default::default()
    })
    .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: &str) -> RelayConnection {
    connect_relay(addr, &TransportConfig::development()).await.unwrap()
}

async fn next_notice(conn: &mut RelayConnection) -> RelayNotice {
    timeout(WAIT, conn.from_relay.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for notice"))
        .unwrap_or_else(|| panic!("relay connection closed"))
}

async fn join(conn: &mut RelayConnection, session: &str) -> (PeerId, Vec<PeerId>) {
    let session_id = SessionId::new(session).unwrap();
    conn.to_relay.send(RelayRequest::Join { session_id: session_id.clone() }).await.unwrap();

    match next_notice(conn).await {
        RelayNotice::Joined { peer_id, session_id: joined, peers } => {
            assert_eq!(joined, session_id);
            (peer_id, peers)
        },
        other => panic!("expected Joined, got {other:?}"),
    }
}

#[tokio::test]
async fn two_peers_meet_and_exchange_envelopes() {
    let addr = start_relay(RelayConfig::default()).await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;

    let (alice_id, present) = join(&mut alice, "doc").await;
    assert!(present.is_empty());

    let (bob_id, present) = join(&mut bob, "doc").await;
    assert_eq!(present, vec![alice_id]);
    assert_eq!(next_notice(&mut alice).await, RelayNotice::PeerJoined { peer_id: bob_id });

    bob.to_relay
        .send(RelayRequest::Signal(SignalingEnvelope {
            sender_id: PeerId::new(0xBAD),
            target_id: alice_id,
            signal: Signal::Offer(SessionDescription::new("{\"kind\":\"offer\"}")),
        }))
        .await
        .unwrap();

    match next_notice(&mut alice).await {
        RelayNotice::Signal(envelope) => {
            assert_eq!(envelope.sender_id, bob_id, "relay stamps the real sender");
            assert_eq!(envelope.target_id, alice_id);
            assert!(matches!(envelope.signal, Signal::Offer(_)));
        },
        other => panic!("expected Signal, got {other:?}"),
    }
}

#[tokio::test]
async fn third_peer_is_turned_away() {
    let addr = start_relay(RelayConfig::default()).await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;
    let mut carol = connect(&addr).await;

    join(&mut alice, "doc").await;
    join(&mut bob, "doc").await;

    carol
        .to_relay
        .send(RelayRequest::Join { session_id: SessionId::new("doc").unwrap() })
        .await
        .unwrap();
    match next_notice(&mut carol).await {
        RelayNotice::Rejected(rejection) => assert_eq!(rejection.code, Rejection::SESSION_FULL),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_is_announced() {
    let addr = start_relay(RelayConfig::default()).await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;

    join(&mut alice, "doc").await;
    let (bob_id, _) = join(&mut bob, "doc").await;
    assert!(matches!(next_notice(&mut alice).await, RelayNotice::PeerJoined { .. }));

    drop(bob);

    assert_eq!(next_notice(&mut alice).await, RelayNotice::PeerLeft { peer_id: bob_id });
}

#[tokio::test]
async fn leave_frees_the_session() {
    let addr = start_relay(RelayConfig::default()).await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;
    let mut carol = connect(&addr).await;

    join(&mut alice, "doc").await;
    let (bob_id, _) = join(&mut bob, "doc").await;
    assert!(matches!(next_notice(&mut alice).await, RelayNotice::PeerJoined { .. }));

    bob.to_relay.send(RelayRequest::Leave).await.unwrap();
    assert_eq!(next_notice(&mut alice).await, RelayNotice::PeerLeft { peer_id: bob_id });

    let (carol_id, present) = join(&mut carol, "doc").await;
    assert_eq!(present.len(), 1);
    assert_eq!(next_notice(&mut alice).await, RelayNotice::PeerJoined { peer_id: carol_id });
}

//! Direct peer channel over loopback QUIC.
//!
//! Drives two negotiation objects by hand, standing in for the negotiator
//! and the relay.

use std::time::Duration;

use cosign_client::{
    DescriptionKind, PeerCommand, PeerEvent,
    transport::{PeerReceivers, QuicPeer, TransportConfig},
};
use cosign_proto::{IceCandidate, SessionDescription};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Events already produced, without waiting.
fn drain(rx: &mut PeerReceivers) -> Vec<PeerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.events.try_recv() {
        events.push(event);
    }
    events
}

fn description(events: &[PeerEvent]) -> SessionDescription {
    events
        .iter()
        .find_map(|e| match e {
            PeerEvent::LocalDescription(d) => Some(d.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no description in {events:?}"))
}

fn candidates(events: &[PeerEvent]) -> Vec<IceCandidate> {
    events
        .iter()
        .filter_map(|e| match e {
            PeerEvent::LocalCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

async fn wait_for_open(rx: &mut PeerReceivers) {
    loop {
        let event = timeout(WAIT, rx.events.recv())
            .await
            .unwrap_or_else(|_| panic!("channel did not open"))
            .unwrap_or_else(|| panic!("event stream ended"));
        if event == PeerEvent::ChannelOpen {
            return;
        }
    }
}

async fn negotiate() -> (QuicPeer, PeerReceivers, QuicPeer, PeerReceivers) {
    let (mut initiator, mut initiator_rx) = QuicPeer::new(TransportConfig::development());
    let (mut responder, mut responder_rx) = QuicPeer::new(TransportConfig::development());
    connect(&mut initiator, &mut initiator_rx, &mut responder, &mut responder_rx).await;
    (initiator, initiator_rx, responder, responder_rx)
}

async fn connect(
    initiator: &mut QuicPeer,
    initiator_rx: &mut PeerReceivers,
    responder: &mut QuicPeer,
    responder_rx: &mut PeerReceivers,
) {
    initiator.execute(PeerCommand::OpenChannel);
    initiator.execute(PeerCommand::CreateOffer);
    let offer_events = drain(initiator_rx);

    // Candidates first: they must still be applied once the offer lands.
    responder.execute(PeerCommand::SetRemoteDescription {
        kind: DescriptionKind::Offer,
        description: description(&offer_events),
    });
    for candidate in candidates(&offer_events) {
        responder.execute(PeerCommand::AddCandidate(candidate));
    }
    responder.execute(PeerCommand::CreateAnswer);

    let answer_events = drain(responder_rx);
    initiator.execute(PeerCommand::SetRemoteDescription {
        kind: DescriptionKind::Answer,
        description: description(&answer_events),
    });

    wait_for_open(initiator_rx).await;
    wait_for_open(responder_rx).await;
}

#[tokio::test]
async fn channel_carries_text_both_ways() {
    let (initiator, mut initiator_rx, responder, mut responder_rx) = negotiate().await;

    initiator.send(r#"{"type":"page-change","page":2}"#.to_string()).unwrap_or_else(|e| panic!("{e}"));
    responder.send(r#"{"type":"control","enabled":true}"#.to_string()).unwrap_or_else(|e| panic!("{e}"));

    let at_responder = timeout(WAIT, responder_rx.messages.recv()).await.ok().flatten();
    let at_initiator = timeout(WAIT, initiator_rx.messages.recv()).await.ok().flatten();

    assert_eq!(at_responder.as_deref(), Some(r#"{"type":"page-change","page":2}"#));
    assert_eq!(at_initiator.as_deref(), Some(r#"{"type":"control","enabled":true}"#));
}

#[tokio::test]
async fn closing_one_side_closes_the_other() {
    let (mut initiator, _initiator_rx, _responder, mut responder_rx) = negotiate().await;

    initiator.execute(PeerCommand::Close);

    loop {
        let event = timeout(WAIT, responder_rx.events.recv())
            .await
            .unwrap_or_else(|_| panic!("no close observed"));
        match event {
            Some(PeerEvent::ChannelClosed) | None => break,
            Some(_) => {},
        }
    }
}

#[tokio::test]
async fn closed_objects_negotiate_again() {
    let (mut initiator, mut initiator_rx, mut responder, mut responder_rx) = negotiate().await;

    initiator.execute(PeerCommand::Close);
    responder.execute(PeerCommand::Close);
    drain(&mut initiator_rx);
    drain(&mut responder_rx);
    while initiator_rx.messages.try_recv().is_ok() {}

    connect(&mut initiator, &mut initiator_rx, &mut responder, &mut responder_rx).await;

    responder.send(r#"{"type":"page-change","page":1}"#.to_string()).unwrap_or_else(|e| panic!("{e}"));
    let at_initiator = timeout(WAIT, initiator_rx.messages.recv()).await.ok().flatten();
    assert_eq!(at_initiator.as_deref(), Some(r#"{"type":"page-change","page":1}"#));
}

#[tokio::test]
async fn garbage_candidate_is_rejected_not_fatal() {
    let (mut responder, mut responder_rx) = QuicPeer::new(TransportConfig::development());
    let (mut initiator, mut initiator_rx) = QuicPeer::new(TransportConfig::development());
    initiator.execute(PeerCommand::CreateOffer);
    let offer = description(&drain(&mut initiator_rx));

    responder.execute(PeerCommand::SetRemoteDescription {
        kind: DescriptionKind::Offer,
        description: offer,
    });
    responder.execute(PeerCommand::AddCandidate(IceCandidate::new("carrier-pigeon")));

    let events = drain(&mut responder_rx);
    assert!(matches!(events.as_slice(), [PeerEvent::CandidateRejected { .. }]));
}

#[tokio::test]
async fn offer_without_certificate_fails() {
    let (mut responder, mut responder_rx) = QuicPeer::new(TransportConfig::development());

    responder.execute(PeerCommand::SetRemoteDescription {
        kind: DescriptionKind::Offer,
        description: SessionDescription::new(r#"{"kind":"offer"}"#),
    });

    let events = drain(&mut responder_rx);
    assert!(matches!(events.as_slice(), [PeerEvent::Failed { .. }]));
}

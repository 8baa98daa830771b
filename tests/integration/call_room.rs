//! Integration tests for call rooms over a live relay.
//!
//! Each test starts an in-process relay on a random port and drives real
//! clients through it over WebSocket.
//!
//! Verification command: `cargo test --test call_room`

use std::sync::Arc;
use std::time::Duration;

use taskmeet::call::{
    CallClient, CallEvent, CallSession, LinkRole, NoDevices, VirtualDevices, WsSignalingChannel,
};
use taskmeet_proto::call::ConnectionId;
use taskmeet_proto::signal::TrackKind;
use taskmeet_relay::relay::{RelayState, start_server_with_state};

type Client = CallClient<WsSignalingChannel>;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a relay on a random port and returns its URL and state.
async fn start_relay() -> (String, Arc<RelayState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(RelayState::new());
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test relay");
    (format!("ws://{addr}/ws"), state, handle)
}

async fn connect(url: &str, name: &str) -> Client {
    connect_with(url, CallSession::new(name, Box::new(NoDevices)).unwrap()).await
}

async fn connect_with(url: &str, session: CallSession) -> Client {
    let channel = WsSignalingChannel::connect(url, STEP_TIMEOUT).await.unwrap();
    CallClient::new(Arc::new(channel), session, STEP_TIMEOUT)
}

/// Pumps relay messages into `client` until an event matches `pred`.
/// Returns every event seen, the matching one last.
async fn until(client: &mut Client, pred: impl Fn(&CallEvent) -> bool) -> Vec<CallEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            for event in client.next_events().await {
                let hit = pred(&event);
                seen.push(event);
                if hit {
                    return;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out; events so far: {seen:?}"));
    seen
}

fn self_id(client: &Client) -> ConnectionId {
    client.session().self_id().cloned().unwrap()
}

fn is_link_up(peer: &ConnectionId) -> impl Fn(&CallEvent) -> bool + '_ {
    move |e| matches!(e, CallEvent::LinkUp(p) if p == peer)
}

#[tokio::test]
async fn meeting_lifecycle_in_room_r1() {
    let (url, state, _handle) = start_relay().await;

    // A joins and becomes host.
    let mut a = connect(&url, "Ali").await;
    let events = a.join("r1").await.unwrap();
    let a_id = self_id(&a);
    assert!(matches!(
        &events[0],
        CallEvent::Joined { roster, host_id, .. } if roster.is_empty() && *host_id == a_id
    ));
    assert!(a.session().is_host());

    // B joins; exactly one link between them.
    let mut b = connect(&url, "Berk").await;
    let events = b.join("r1").await.unwrap();
    let b_id = self_id(&b);
    match &events[0] {
        CallEvent::Joined { roster, host_id, .. } => {
            assert_eq!(roster.len(), 1);
            assert_eq!(roster[0].connection_id, a_id);
            assert_eq!(*host_id, a_id);
        }
        other => panic!("expected Joined, got {other:?}"),
    }
    until(&mut a, is_link_up(&b_id)).await;
    until(&mut b, is_link_up(&a_id)).await;
    assert_eq!(a.session().link_count(), 1);
    assert_eq!(b.session().link_count(), 1);
    assert_eq!(state.rooms.get("r1").await.unwrap().participants.len(), 2);

    // A ends the meeting.
    assert!(a.end_meeting().await.unwrap());
    until(&mut a, |e| *e == CallEvent::MeetingEnded).await;
    until(&mut b, |e| *e == CallEvent::MeetingEnded).await;

    assert_eq!(a.session().link_count(), 0);
    assert_eq!(b.session().link_count(), 0);
    assert!(!a.session().is_in_room());
    assert!(!b.session().is_in_room());
    assert!(state.rooms.get("r1").await.is_none());
    assert_eq!(state.rooms.room_count().await, 0);
}

#[tokio::test]
async fn newcomer_offers_to_each_existing_participant() {
    let (url, _state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let a_id = self_id(&a);

    let mut b = connect(&url, "Berk").await;
    b.join("r1").await.unwrap();
    let b_id = self_id(&b);
    until(&mut a, is_link_up(&b_id)).await;
    until(&mut b, is_link_up(&a_id)).await;

    let mut c = connect(&url, "Cem").await;
    c.join("r1").await.unwrap();
    let c_id = self_id(&c);

    until(&mut a, is_link_up(&c_id)).await;
    until(&mut b, is_link_up(&c_id)).await;
    let mut up = Vec::new();
    for _ in 0..2 {
        let events = until(&mut c, |e| matches!(e, CallEvent::LinkUp(_))).await;
        if let Some(CallEvent::LinkUp(peer)) = events.last() {
            up.push(peer.clone());
        }
    }
    up.sort();
    let mut expected = vec![a_id.clone(), b_id.clone()];
    expected.sort();
    assert_eq!(up, expected);

    assert_eq!(c.session().link_count(), 2);
    assert_eq!(c.session().link(&a_id).unwrap().role(), LinkRole::Offering);
    assert_eq!(c.session().link(&b_id).unwrap().role(), LinkRole::Offering);
    assert_eq!(a.session().link(&c_id).unwrap().role(), LinkRole::Answering);
    assert_eq!(b.session().link(&c_id).unwrap().role(), LinkRole::Answering);
    assert_eq!(a.session().link_count(), 2);
    assert_eq!(b.session().link_count(), 2);
}

/// Pumps `client` until it has a connected link to each of `peers` others.
async fn settle(client: &mut Client, peers: usize) {
    let linked = |client: &Client| {
        let session = client.session();
        session.roster().len() == peers
            && session.link_count() == peers
            && session
                .roster()
                .iter()
                .all(|p| session.link(&p.connection_id).is_some_and(|l| l.is_connected()))
    };
    tokio::time::timeout(STEP_TIMEOUT, async {
        while !linked(client) {
            client.next_events().await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!("only {} of {peers} peers linked", client.session().link_count())
    });
}

#[tokio::test]
async fn simultaneous_joins_link_every_pair() {
    let (url, state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let mut b = connect(&url, "Berk").await;
    let mut c = connect(&url, "Cem").await;
    let mut d = connect(&url, "Deniz").await;

    let (rb, rc, rd) = tokio::join!(b.join("r1"), c.join("r1"), d.join("r1"));
    rb.unwrap();
    rc.unwrap();
    rd.unwrap();

    tokio::join!(
        settle(&mut a, 3),
        settle(&mut b, 3),
        settle(&mut c, 3),
        settle(&mut d, 3)
    );
    assert_eq!(state.rooms.get("r1").await.unwrap().participants.len(), 4);
    for client in [&a, &b, &c, &d] {
        let me = self_id(client);
        for other in [&a, &b, &c, &d] {
            let them = self_id(other);
            if me != them {
                assert!(client.session().link(&them).is_some());
            }
        }
    }
}

#[tokio::test]
async fn host_leaving_promotes_earliest_remaining_joiner() {
    let (url, _state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let mut b = connect(&url, "Berk").await;
    b.join("r1").await.unwrap();
    let b_id = self_id(&b);
    let mut c = connect(&url, "Cem").await;
    c.join("r1").await.unwrap();
    let c_id = self_id(&c);

    a.leave().await.unwrap();

    let events = until(&mut b, |e| matches!(e, CallEvent::HostChanged { .. })).await;
    assert_eq!(
        events.last(),
        Some(&CallEvent::HostChanged {
            host_id: b_id.clone(),
            is_self: true,
        })
    );
    until(&mut c, |e| {
        matches!(e, CallEvent::HostChanged { host_id, .. } if *host_id == b_id)
    })
    .await;
    assert!(b.session().is_host());
    assert!(!c.session().is_host());

    // A non-host transfer is not even sent.
    assert!(!c.transfer_host(&b_id).await.unwrap());

    assert!(b.transfer_host(&c_id).await.unwrap());
    until(&mut c, |e| {
        matches!(e, CallEvent::HostChanged { is_self: true, .. })
    })
    .await;
    assert!(c.session().is_host());
}

#[tokio::test]
async fn chat_reaches_everyone_in_order() {
    let (url, _state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let mut b = connect(&url, "Berk").await;
    b.join("r1").await.unwrap();

    a.chat("birinci").await.unwrap();
    a.chat("ikinci").await.unwrap();

    for client in [&mut a, &mut b] {
        let mut texts = Vec::new();
        while texts.len() < 2 {
            let events = until(client, |e| matches!(e, CallEvent::Chat { .. })).await;
            if let Some(CallEvent::Chat { text, display_name, .. }) = events.last() {
                assert_eq!(display_name, "Ali");
                texts.push(text.clone());
            }
        }
        assert_eq!(texts, vec!["birinci", "ikinci"]);
    }
}

#[tokio::test]
async fn track_added_after_join_renegotiates() {
    let (url, _state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let a_id = self_id(&a);

    let devices = VirtualDevices::with(&[TrackKind::Video]);
    let mut b = connect_with(&url, CallSession::new("Berk", Box::new(devices)).unwrap()).await;
    b.join("r1").await.unwrap();
    let b_id = self_id(&b);
    until(&mut a, is_link_up(&b_id)).await;
    until(&mut b, is_link_up(&a_id)).await;

    b.set_track(TrackKind::Video, true).await;
    let events = until(&mut a, |e| matches!(e, CallEvent::RemoteTracks { .. })).await;
    assert_eq!(
        events.last(),
        Some(&CallEvent::RemoteTracks {
            peer: b_id.clone(),
            tracks: vec![TrackKind::Video],
        })
    );
    assert!(a.session().link(&b_id).unwrap().is_connected());
}

#[tokio::test]
async fn relay_shutdown_surfaces_relay_lost() {
    let (url, state, _handle) = start_relay().await;

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();
    let mut b = connect(&url, "Berk").await;
    b.join("r1").await.unwrap();
    let b_id = self_id(&b);
    until(&mut a, is_link_up(&b_id)).await;

    state.close_all_connections().await;

    until(&mut a, |e| *e == CallEvent::RelayLost).await;
    assert_eq!(a.session().link_count(), 0);
    assert!(a.session().room_id().is_none());
}

#[tokio::test]
async fn full_room_rejects_join() {
    use taskmeet::call::CallError;
    use taskmeet_relay::rooms::RoomRegistry;

    let state = Arc::new(RelayState::with_config(64 * 1024, RoomRegistry::with_limits(10, 1)));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state).await.unwrap();
    let url = format!("ws://{addr}/ws");

    let mut a = connect(&url, "Ali").await;
    a.join("r1").await.unwrap();

    let mut b = connect(&url, "Berk").await;
    let result = b.join("r1").await;
    assert!(matches!(result, Err(CallError::JoinRejected(_))));
    assert!(!b.session().is_in_room());
}

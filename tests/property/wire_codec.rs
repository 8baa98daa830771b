//! Property tests for the taskmeet wire format.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in `decode` for any relay or
//!    handshake message type.
//! 2. Relay messages carrying arbitrary text and payloads survive
//!    encoding unchanged, including roster order.
//! 3. Session descriptions are always normalized.
//! 4. A task's `completed` flag follows its status.

use proptest::prelude::*;
use taskmeet_proto::call::{ClientMessage, ConnectionId, Participant, ServerMessage};
use taskmeet_proto::codec;
use taskmeet_proto::signal::{Handshake, SessionDescription, TrackKind};
use taskmeet_proto::task::{Priority, Task, TaskId, TaskPatch};
use uuid::Uuid;

fn arb_connection_id() -> impl Strategy<Value = ConnectionId> {
    any::<u128>().prop_map(|n| ConnectionId::new(Uuid::from_u128(n).to_string()))
}

fn arb_participant() -> impl Strategy<Value = Participant> {
    (arb_connection_id(), "\\PC{1,64}").prop_map(|(id, name)| Participant {
        connection_id: id,
        display_name: name,
    })
}

fn arb_track() -> impl Strategy<Value = TrackKind> {
    prop_oneof![Just(TrackKind::Audio), Just(TrackKind::Video)]
}

fn arb_client_message() -> impl Strategy<Value = ClientMessage> {
    prop_oneof![
        ("\\PC{1,128}", "\\PC{1,64}").prop_map(|(room_id, display_name)| ClientMessage::Join {
            room_id,
            display_name,
        }),
        Just(ClientMessage::Leave),
        arb_connection_id().prop_map(|target| ClientMessage::TransferHost { target }),
        Just(ClientMessage::EndMeeting),
        (arb_connection_id(), prop::collection::vec(any::<u8>(), 0..512))
            .prop_map(|(to, payload)| ClientMessage::Signal { to, payload }),
        "\\PC{1,2000}".prop_map(|text| ClientMessage::Chat { text }),
    ]
}

fn arb_server_message() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        (
            "\\PC{1,128}",
            arb_connection_id(),
            prop::collection::vec(arb_participant(), 0..16),
            arb_connection_id(),
        )
            .prop_map(|(room_id, connection_id, roster, host_id)| ServerMessage::Joined {
                room_id,
                connection_id,
                roster,
                host_id,
            }),
        arb_participant().prop_map(|participant| ServerMessage::PeerJoined { participant }),
        arb_connection_id().prop_map(|connection_id| ServerMessage::PeerLeft { connection_id }),
        arb_connection_id().prop_map(|host_id| ServerMessage::HostChanged { host_id }),
        Just(ServerMessage::MeetingEnded),
        (arb_connection_id(), prop::collection::vec(any::<u8>(), 0..512))
            .prop_map(|(from, payload)| ServerMessage::Signal { from, payload }),
        (arb_connection_id(), "\\PC{1,64}", "\\PC{1,2000}").prop_map(
            |(from, display_name, text)| ServerMessage::Chat {
                from,
                display_name,
                text,
            }
        ),
        "\\PC{0,200}".prop_map(|reason| ServerMessage::Error { reason }),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        any::<u128>(),
        "\\PC{0,80}",
        "[a-z-]{0,20}",
        "[a-z]{1,12}",
        prop_oneof![
            Just(Priority::High),
            Just(Priority::Medium),
            Just(Priority::Low),
            Just(Priority::None),
        ],
        prop::collection::vec("[a-z]{1,10}", 0..4),
    )
        .prop_map(|(id, title, status, assigned_to, priority, labels)| {
            let mut task = Task::new(title, assigned_to)
                .with_priority(priority)
                .with_status(status);
            task.id = TaskId::from_uuid(Uuid::from_u128(id));
            task.labels = labels;
            task
        })
}

proptest! {
    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = codec::decode::<ClientMessage>(&bytes);
        let _ = codec::decode::<ServerMessage>(&bytes);
        let _ = codec::decode::<Handshake>(&bytes);
        let _ = codec::decode::<Task>(&bytes);
    }

    #[test]
    fn client_messages_survive_the_wire(msg in arb_client_message()) {
        let bytes = codec::encode(&msg).unwrap();
        prop_assert_eq!(codec::decode::<ClientMessage>(&bytes).unwrap(), msg);
    }

    #[test]
    fn server_messages_survive_the_wire(msg in arb_server_message()) {
        let bytes = codec::encode(&msg).unwrap();
        let decoded = codec::decode::<ServerMessage>(&bytes).unwrap();
        if let (
            ServerMessage::Joined { roster: sent, .. },
            ServerMessage::Joined { roster: got, .. },
        ) = (&msg, &decoded)
        {
            let sent: Vec<_> = sent.iter().map(|p| &p.connection_id).collect();
            let got: Vec<_> = got.iter().map(|p| &p.connection_id).collect();
            prop_assert_eq!(sent, got);
        }
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn descriptions_are_normalized(
        revision in any::<u32>(),
        tracks in prop::collection::vec(arb_track(), 0..8),
    ) {
        let desc = SessionDescription::new(revision, tracks.clone());
        prop_assert!(desc.tracks.windows(2).all(|w| w[0] < w[1]));
        for kind in tracks {
            prop_assert!(desc.tracks.contains(&kind));
        }

        let offer = Handshake::Offer(desc);
        let bytes = codec::encode(&offer).unwrap();
        prop_assert_eq!(codec::decode::<Handshake>(&bytes).unwrap(), offer);
    }

    #[test]
    fn task_completion_follows_status(task in arb_task()) {
        prop_assert_eq!(task.completed, task.status == "done");
        let bytes = codec::encode(&task).unwrap();
        prop_assert_eq!(codec::decode::<Task>(&bytes).unwrap(), task);
    }

    #[test]
    fn move_patch_sets_completion(status in "[a-z-]{1,20}") {
        let patch = TaskPatch::move_to(&status);
        prop_assert_eq!(patch.status.as_deref(), Some(status.as_str()));
        prop_assert_eq!(patch.completed, Some(status == "done"));
        prop_assert!(!patch.is_empty());
    }
}

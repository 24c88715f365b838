use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::connection::{ConnectionState, ConnectionSupervisor};
use crate::error::{ConnectionError, RealtimeError};
use crate::transport::{MemoryTransport, Transport};

fn member(id: &str, status: &str) -> PresenceMember {
    PresenceMember::new(id, MemberInfo::new(id.to_uppercase(), status))
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn callbacks(&self) -> PresenceCallbacks {
        let (a, b, c) = (self.clone(), self.clone(), self.clone());
        PresenceCallbacks::new()
            .on_member_join(move |m| a.0.lock().push(format!("join {}", m.id)))
            .on_member_leave(move |m| b.0.lock().push(format!("leave {}", m.id)))
            .on_error(move |e| c.0.lock().push(format!("error: {e}")))
    }
}

struct Fixture {
    memory: Arc<MemoryTransport>,
    supervisor: ConnectionSupervisor,
    recorder: Recorder,
}

impl Fixture {
    fn connected() -> Self {
        let supervisor = ConnectionSupervisor::new();
        supervisor.signal(ConnectionState::Connected);
        Self {
            memory: Arc::new(MemoryTransport::new()),
            supervisor,
            recorder: Recorder::default(),
        }
    }

    fn room(&self, channel: &str) -> PresenceRoom {
        PresenceRoom::new(
            self.memory.clone(),
            self.supervisor.handle(),
            channel,
            PresenceOptions::default(),
            self.recorder.callbacks(),
        )
    }

    /// Join `room-1` as `u1` alongside the given members.
    async fn joined_room(&self, others: Vec<PresenceMember>) -> PresenceRoom {
        let mut members = vec![member("u1", "online")];
        members.extend(others);
        self.memory.set_members("room-1", members);
        self.memory.assign_member_id("u1");
        let room = self.room("room-1");
        room.join(None).await.unwrap();
        room
    }
}

#[tokio::test]
async fn join_sets_my_id_and_online_count() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![member("u2", "away")]).await;

    assert!(room.is_joined());
    assert_eq!(room.my_id().as_deref(), Some("u1"));
    assert_eq!(room.members().len(), 2);
    assert_eq!(room.online_count(), 1);
    assert!(room.is_in_channel());
}

#[tokio::test]
async fn join_sends_default_user_info() {
    let fx = Fixture::connected();
    let room = fx.room("room-1");
    room.join(None).await.unwrap();

    let me = room.get_member(&room.my_id().unwrap()).unwrap();
    assert_eq!(me.info, MemberInfo::default());
}

#[tokio::test]
async fn join_twice_is_a_noop() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![]).await;

    room.join(None).await.unwrap();

    assert_eq!(fx.memory.calls().join, 1);
}

#[tokio::test]
async fn join_while_disconnected_is_a_connection_error() {
    let fx = Fixture::connected();
    fx.supervisor.signal(ConnectionState::Disconnected);
    let room = fx.room("room-1");

    let err = room.join(None).await.unwrap_err();

    assert!(matches!(
        err,
        RealtimeError::Connection(ConnectionError::NotConnected)
    ));
    assert_eq!(fx.memory.calls().join, 0);
    assert!(!room.is_joined());
}

#[tokio::test]
async fn rejected_join_reports_and_stays_not_joined() {
    let fx = Fixture::connected();
    fx.memory.fail_joins(Some("room full"));
    let room = fx.room("room-1");

    let err = room.join(None).await.unwrap_err();

    assert!(matches!(err, RealtimeError::PresenceJoin(_)));
    assert!(!room.is_joined());
    assert!(!room.is_joining());
    assert_eq!(room.my_id(), None);
    assert_eq!(
        fx.recorder.events(),
        vec!["error: presence join failed: presence join on 'room-1' rejected: room full"]
    );
}

#[tokio::test]
async fn leave_clears_local_state() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![member("u2", "online")]).await;

    room.leave().unwrap();

    assert!(!room.is_joined());
    assert_eq!(room.my_id(), None);
    assert!(room.members().is_empty());
    assert_eq!(room.online_count(), 0);
    assert!(!room.is_in_channel());
}

#[tokio::test]
async fn leave_when_not_joined_is_a_noop() {
    let fx = Fixture::connected();
    let room = fx.room("room-1");

    room.leave().unwrap();

    assert_eq!(fx.memory.calls().leave, 0);
}

#[tokio::test]
async fn failed_leave_keeps_local_state() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![member("u2", "online")]).await;
    fx.memory.fail_leaves(Some("timeout"));

    let err = room.leave().unwrap_err();

    assert!(matches!(err, RealtimeError::PresenceLeave(_)));
    assert!(room.is_joined());
    assert_eq!(room.my_id().as_deref(), Some("u1"));
    assert_eq!(room.members().len(), 2);
    assert_eq!(fx.recorder.events().len(), 1);
}

#[tokio::test]
async fn update_status_is_local_only() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![member("u2", "online")]).await;
    assert_eq!(room.online_count(), 2);

    assert!(room.update_status("away"));

    let me = room.get_member("u1").unwrap();
    assert_eq!(me.info.status, Some(MemberStatus::Away));
    assert_eq!(room.online_count(), 1);
    assert_eq!(fx.memory.calls().send, 0);
    // the transport snapshot is untouched
    assert!(fx.memory.presence_members("room-1")[0].is_online());
}

#[tokio::test]
async fn update_status_when_not_joined_is_a_noop() {
    let fx = Fixture::connected();
    let room = fx.room("room-1");
    assert!(!room.update_status(MemberStatus::Busy));
}

#[tokio::test]
async fn get_member_returns_none_for_unknown_id() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![member("u2", "away")]).await;

    assert_eq!(room.get_member("u2").unwrap().info.status, Some(MemberStatus::Away));
    assert!(room.get_member("nobody").is_none());
}

#[tokio::test]
async fn refresh_reports_departure_once() {
    let fx = Fixture::connected();
    let room = fx
        .joined_room(vec![member("b", "online"), member("c", "online")])
        .await;

    fx.memory.set_members(
        "room-1",
        vec![member("u1", "online"), member("c", "online")],
    );
    let diff = room.refresh().unwrap();
    room.refresh();

    assert_eq!(diff.left.len(), 1);
    assert!(diff.joined.is_empty());
    assert_eq!(fx.recorder.events(), vec!["leave b"]);
    assert_eq!(room.online_count(), 2);
}

#[tokio::test]
async fn refresh_when_not_joined_does_nothing() {
    let fx = Fixture::connected();
    let room = fx.room("room-1");
    assert!(room.refresh().is_none());
    assert_eq!(fx.memory.calls().members, 0);
}

#[tokio::test(start_paused = true)]
async fn diff_task_polls_until_leave() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![]).await;

    fx.memory.set_members(
        "room-1",
        vec![member("u1", "online"), member("d", "online")],
    );
    tokio::time::sleep(DEFAULT_POLL_INTERVAL + Duration::from_millis(10)).await;
    assert_eq!(fx.recorder.events(), vec!["join d"]);

    room.leave().unwrap();
    fx.memory.set_members("room-1", vec![member("e", "online")]);
    tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;

    assert_eq!(fx.recorder.events(), vec!["join d"]);
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_the_diff_task_and_leaves() {
    let fx = Fixture::connected();
    let room = fx.joined_room(vec![]).await;

    room.teardown();
    room.teardown();
    fx.memory.set_members("room-1", vec![member("z", "online")]);
    tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;

    assert!(fx.recorder.events().is_empty());
    assert_eq!(fx.memory.calls().leave, 1);
    assert!(!room.is_joined());
}

#[tokio::test]
async fn teardown_before_join_is_safe() {
    let fx = Fixture::connected();
    let room = fx.room("room-1");
    room.teardown();
    drop(room);
    assert_eq!(fx.memory.calls().leave, 0);
}

#[tokio::test]
async fn join_resolving_after_teardown_is_released() {
    let fx = Fixture::connected();
    fx.memory.hold_joins();
    let room = Arc::new(fx.room("room-1"));

    let pending = {
        let room = Arc::clone(&room);
        tokio::spawn(async move { room.join(None).await })
    };
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert!(room.is_joining());

    room.teardown();
    fx.memory.release_joins();
    pending.await.unwrap().unwrap();

    assert!(!room.is_joined());
    assert!(!fx.memory.is_in_presence_channel("room-1"));
    assert_eq!(fx.memory.calls().leave, 1);
}

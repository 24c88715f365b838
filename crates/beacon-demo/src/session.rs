//! Scripted realtime session over the loopback transport.

use std::sync::Arc;
use std::time::Duration;

use beacon_common::Result;
use beacon_config::BeaconConfig;
use beacon_realtime::presence::DEFAULT_POLL_INTERVAL;
use beacon_realtime::{
    handler, organization_channel, ChannelSubscription, ConnectionState, ConnectionSupervisor,
    EventListener, LifecycleCallbacks, ListenerOptions, MemberInfo, MemberStatus,
    MemoryTransport, MultiTaskTracker, PresenceCallbacks, PresenceMember, PresenceOptions,
    PresenceRoom, SubscriptionOptions, SubscriptionRegistry, TaskDomain, TaskEventKind,
    TaskTracker, Transport,
};
use futures_util::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use crate::cli::Args;

const LOBBY: &str = "presence-lobby";
const DOCS: &str = "presence-docs";
const ANNOUNCEMENTS: &str = "announcements";

/// Give spawned subscribe and watcher tasks a chance to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

fn subscription_options(config: &BeaconConfig) -> SubscriptionOptions {
    SubscriptionOptions {
        enabled: config.subscriptions.enabled,
        auto_subscribe: config.subscriptions.auto_subscribe,
    }
}

fn presence_options(config: &BeaconConfig) -> PresenceOptions {
    let poll_interval = match config.presence.poll_interval_ms {
        0 => DEFAULT_POLL_INTERVAL,
        ms => Duration::from_millis(u64::from(ms)),
    };
    PresenceOptions {
        poll_interval,
        default_user: MemberInfo::new(
            config.presence.default_name.clone(),
            config.presence.default_status.as_str(),
        ),
    }
}

fn logging_callbacks(owner: &'static str) -> LifecycleCallbacks {
    LifecycleCallbacks::new()
        .on_connect(move || info!(owner, "Subscribed"))
        .on_disconnect(move || info!(owner, "Subscription lost"))
        .on_error(move |e| warn!(owner, "Realtime error: {e}"))
}

/// The single-task tracker follows the first configured domain.
fn tracked_domain(domains: &[TaskDomain]) -> TaskDomain {
    domains.first().cloned().unwrap_or_else(TaskDomain::import)
}

pub async fn run(config: &BeaconConfig, args: &Args) -> Result<()> {
    let memory = Arc::new(MemoryTransport::new());
    let transport: Arc<dyn Transport> = if args.shared {
        info!("Sharing channel subscriptions through the registry");
        Arc::new(SubscriptionRegistry::new(memory.clone()))
    } else {
        memory.clone()
    };

    let supervisor = ConnectionSupervisor::new();
    supervisor.signal(ConnectionState::Connecting);
    supervisor.signal(ConnectionState::Connected);
    let options = subscription_options(config);

    // -- channel subscription and listeners ----------------------------------

    let announcements = ChannelSubscription::builder(
        transport.clone(),
        supervisor.handle(),
        ANNOUNCEMENTS,
    )
    .handler(
        "posted",
        handler(|payload| {
            info!(%payload, "Announcement posted");
            Ok(())
        }),
    )
    .options(options)
    .callbacks(logging_callbacks("announcements"))
    .mount();

    let pinned = EventListener::channel(
        transport.clone(),
        supervisor.handle(),
        ANNOUNCEMENTS,
        "pinned",
        handler(|payload| {
            let title = payload
                .get("title")
                .and_then(|t| t.as_str())
                .ok_or("pinned announcement without a title")?;
            info!(title, "Announcement pinned");
            Ok(())
        }),
        ListenerOptions {
            subscription: options,
            callbacks: logging_callbacks("pinned"),
        },
    );

    let heartbeat = EventListener::on(
        transport.clone(),
        supervisor.handle(),
        "heartbeat",
        handler(|payload| {
            info!(%payload, "Heartbeat");
            Ok(())
        }),
        None,
        ListenerOptions::default(),
    );
    settle().await;

    memory.emit(ANNOUNCEMENTS, "posted", json!({ "body": "release 1.2 is out" }));
    memory.emit(ANNOUNCEMENTS, "pinned", json!({ "title": "Maintenance window" }));
    // Routed to the pinned listener's on_error; the announcement owner is unaffected.
    memory.emit(ANNOUNCEMENTS, "pinned", json!({}));
    memory.emit_global("heartbeat", json!({ "seq": 1 }));

    let binding = announcements.bind(
        "retracted",
        handler(|payload| {
            info!(%payload, "Announcement retracted");
            Ok(())
        }),
    );
    match binding {
        Ok(binding) => {
            memory.emit(ANNOUNCEMENTS, "retracted", json!({ "id": 7 }));
            binding.unbind();
        }
        Err(e) => warn!("Dynamic bind skipped: {e}"),
    }

    let sent = announcements
        .trigger("client-read", json!({ "id": 7 }))
        .await?;
    info!(%sent, "Read receipt sent");

    // -- presence --------------------------------------------------------------

    let presence = presence_options(config);
    memory.set_members(
        LOBBY,
        vec![PresenceMember::new(
            "m-ada",
            MemberInfo::new("Ada", MemberStatus::Online),
        )],
    );
    let rooms: Vec<PresenceRoom> = [LOBBY, DOCS]
        .into_iter()
        .map(|channel| {
            PresenceRoom::new(
                transport.clone(),
                supervisor.handle(),
                channel,
                presence.clone(),
                PresenceCallbacks::new()
                    .on_member_join(move |m| info!(channel, member = %m.id, "Member joined"))
                    .on_member_leave(move |m| info!(channel, member = %m.id, "Member left"))
                    .on_error(move |e| warn!(channel, "Presence error: {e}")),
            )
        })
        .collect();

    let mut lobby_changes = rooms[0].changes();
    let change_log = tokio::spawn(async move {
        while lobby_changes.changed().await.is_ok() {
            let revision = *lobby_changes.borrow_and_update();
            info!(revision, "Lobby membership changed");
        }
    });

    let me = MemberInfo::new("Demo", MemberStatus::Online).with_field("role", json!("host"));
    let joins = join_all(rooms.iter().map(|room| room.join(Some(me.clone())))).await;
    for (room, joined) in rooms.iter().zip(joins) {
        match joined {
            Ok(()) => info!(
                channel = room.channel(),
                my_id = ?room.my_id(),
                online = room.online_count(),
                "Joined presence room"
            ),
            Err(e) => warn!(channel = room.channel(), "Join failed: {e}"),
        }
    }

    let lobby = &rooms[0];
    let mut members = lobby.members();
    members.push(PresenceMember::new("m-grace", MemberInfo::new("Grace", "busy")));
    members.retain(|m| m.id != "m-ada");
    memory.set_members(LOBBY, members);
    if let Some(diff) = lobby.refresh() {
        info!(joined = diff.joined.len(), left = diff.left.len(), "Lobby refreshed");
    }
    lobby.update_status(MemberStatus::Away);
    if let Some(my_id) = lobby.my_id() {
        if let Some(member) = lobby.get_member(&my_id) {
            info!(status = ?member.info.status, "Local status updated");
        }
    }
    for room in &rooms {
        room.leave()?;
    }
    settle().await;

    // -- task progress -----------------------------------------------------------

    let task_channel = organization_channel(&config.tasks.channel_prefix, &args.org);
    let domains: Vec<TaskDomain> = config.tasks.domains.iter().map(TaskDomain::new).collect();
    let tracked = tracked_domain(&domains);

    let tracker = TaskTracker::mount(
        transport.clone(),
        supervisor.handle(),
        &task_channel,
        tracked.clone(),
        "job-1",
        ListenerOptions {
            subscription: options,
            callbacks: logging_callbacks("task-tracker"),
        },
    );
    let multi = MultiTaskTracker::mount(
        transport.clone(),
        supervisor.handle(),
        &task_channel,
        &domains,
        ListenerOptions {
            subscription: options,
            callbacks: logging_callbacks("multi-task-tracker"),
        },
    );
    multi.add_task("job-1");
    multi.add_task("job-2");
    settle().await;

    let script = [
        (TaskEventKind::Started, "job-1", json!({ "message": "reading rows" })),
        (TaskEventKind::Progress, "job-1", json!({ "progress": 40 })),
        (TaskEventKind::Started, "job-2", json!({})),
        (TaskEventKind::Failed, "job-2", json!({ "error": "unsupported encoding" })),
        (TaskEventKind::Progress, "job-1", json!({ "progress": 85 })),
        (TaskEventKind::Completed, "job-1", json!({ "result": { "rows": 1200 } })),
        // Dropped: job-1 is already terminal.
        (TaskEventKind::Progress, "job-1", json!({ "progress": 10 })),
    ];
    for (kind, task_id, mut payload) in script {
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("task_id".into(), json!(task_id));
        }
        memory.emit(&task_channel, &kind.event_name(&tracked), payload);
    }

    let record = tracker.record();
    info!(
        task = %record.task_id,
        status = %record.status,
        progress = record.progress,
        "Tracked task finished"
    );
    info!(
        active = multi.active().len(),
        completed = multi.completed().len(),
        failed = multi.failed().len(),
        "Task summary"
    );

    // -- reconnect ---------------------------------------------------------------

    supervisor.signal(ConnectionState::Reconnecting);
    settle().await;
    info!(subscribed = announcements.is_subscribed(), "Connection dropped");
    supervisor.signal(ConnectionState::Connected);
    settle().await;
    info!(subscribed = announcements.is_subscribed(), "Connection restored");
    memory.emit(ANNOUNCEMENTS, "posted", json!({ "body": "back online" }));

    // -- teardown ----------------------------------------------------------------

    tracker.teardown();
    multi.teardown();
    pinned.teardown();
    heartbeat.teardown();
    for room in &rooms {
        room.teardown();
    }
    change_log.abort();

    supervisor.shutdown();
    match announcements.trigger("client-read", json!({ "id": 8 })).await {
        Ok(_) => warn!("Trigger unexpectedly succeeded after shutdown"),
        Err(e) => info!("Trigger after shutdown rejected: {e}"),
    }
    announcements.teardown();

    let calls = memory.calls();
    info!(
        subscribes = calls.subscribe,
        unsubscribes = calls.unsubscribe,
        joins = calls.join,
        leaves = calls.leave,
        "Transport activity"
    );
    Ok(())
}

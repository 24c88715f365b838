//! Joined presence room with polled membership.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::diff::{diff_members, online_count, MemberDiff};
use super::types::{MemberInfo, MemberStatus, PresenceMember};
use crate::connection::ConnectionHandle;
use crate::error::{ConnectionError, RealtimeError};
use crate::handler::ErrorCallback;
use crate::revision::Revision;
use crate::transport::Transport;

/// Default period between membership refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct PresenceOptions {
    pub poll_interval: Duration,
    /// Sent on `join(None)`.
    pub default_user: MemberInfo,
}

impl Default for PresenceOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_user: MemberInfo::default(),
        }
    }
}

pub type MemberCallback = Arc<dyn Fn(&PresenceMember) + Send + Sync>;

#[derive(Clone, Default)]
pub struct PresenceCallbacks {
    on_member_join: Option<MemberCallback>,
    on_member_leave: Option<MemberCallback>,
    on_error: Option<ErrorCallback>,
}

impl PresenceCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_member_join(mut self, f: impl Fn(&PresenceMember) + Send + Sync + 'static) -> Self {
        self.on_member_join = Some(Arc::new(f));
        self
    }

    pub fn on_member_leave(mut self, f: impl Fn(&PresenceMember) + Send + Sync + 'static) -> Self {
        self.on_member_leave = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&RealtimeError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn error(&self, err: &RealtimeError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }
}

impl fmt::Debug for PresenceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceCallbacks")
            .field("on_member_join", &self.on_member_join.is_some())
            .field("on_member_leave", &self.on_member_leave.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RoomPhase {
    NotJoined,
    Joining(u64),
    Joined { my_id: String },
}

struct RoomState {
    phase: RoomPhase,
    members: Vec<PresenceMember>,
    online_count: usize,
    generation: u64,
    alive: bool,
}

impl RoomState {
    fn clear(&mut self) {
        self.phase = RoomPhase::NotJoined;
        self.members.clear();
        self.online_count = 0;
    }
}

struct RoomInner {
    transport: Arc<dyn Transport>,
    connection: ConnectionHandle,
    channel: String,
    options: PresenceOptions,
    callbacks: PresenceCallbacks,
    state: Mutex<RoomState>,
    /// Held for the duration of one diff cycle.
    cycle: Mutex<()>,
    revision: Revision,
}

impl RoomInner {
    fn is_joined(&self) -> bool {
        matches!(self.state.lock().phase, RoomPhase::Joined { .. })
    }

    /// Fetch a fresh snapshot and report who came and went. `None` when
    /// not joined or when another cycle is already running.
    fn run_cycle(&self) -> Option<MemberDiff> {
        let _cycle = self.cycle.try_lock()?;
        if !self.is_joined() {
            return None;
        }

        let fresh = self.transport.presence_members(&self.channel);
        let (diff, changed) = {
            let mut state = self.state.lock();
            if !matches!(state.phase, RoomPhase::Joined { .. }) {
                return None;
            }
            let diff = diff_members(&state.members, &fresh);
            let changed = state.members != fresh;
            state.online_count = online_count(&fresh);
            state.members = fresh;
            (diff, changed)
        };

        if !diff.is_empty() {
            debug!(
                channel = %self.channel,
                joined = diff.joined.len(),
                left = diff.left.len(),
                "Presence membership changed"
            );
        }
        if let Some(cb) = &self.callbacks.on_member_join {
            diff.joined.iter().for_each(|m| cb(m));
        }
        if let Some(cb) = &self.callbacks.on_member_leave {
            diff.left.iter().for_each(|m| cb(m));
        }
        if changed {
            self.revision.bump();
        }
        Some(diff)
    }
}

fn spawn_diff_task(inner: &Arc<RoomInner>) -> JoinHandle<()> {
    let weak: Weak<RoomInner> = Arc::downgrade(inner);
    let period = inner.options.poll_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if !inner.is_joined() {
                break;
            }
            inner.run_cycle();
        }
    })
}

/// Membership of one presence channel for one owner.
///
/// `NotJoined -> Joining -> Joined -> NotJoined`; a rejected join goes
/// back to `NotJoined`. While joined, a background task refreshes the
/// snapshot every `poll_interval`.
pub struct PresenceRoom {
    inner: Arc<RoomInner>,
    diff_task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceRoom {
    pub fn new(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: impl Into<String>,
        options: PresenceOptions,
        callbacks: PresenceCallbacks,
    ) -> Self {
        Self {
            inner: Arc::new(RoomInner {
                transport,
                connection,
                channel: channel.into(),
                options,
                callbacks,
                state: Mutex::new(RoomState {
                    phase: RoomPhase::NotJoined,
                    members: Vec::new(),
                    online_count: 0,
                    generation: 0,
                    alive: true,
                }),
                cycle: Mutex::new(()),
                revision: Revision::new(),
            }),
            diff_task: Mutex::new(None),
        }
    }

    /// Join with `user_info`, or the configured default user.
    ///
    /// A no-op while joined or joining. Fails with a connection error when
    /// disconnected; a rejected join is reported to `on_error` and returned.
    pub async fn join(&self, user_info: Option<MemberInfo>) -> Result<(), RealtimeError> {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state.lock();
            if !state.alive || state.phase != RoomPhase::NotJoined {
                return Ok(());
            }
            if !inner.connection.is_connected() {
                return Err(ConnectionError::NotConnected.into());
            }
            state.generation += 1;
            state.phase = RoomPhase::Joining(state.generation);
            state.generation
        };
        inner.revision.bump();

        let info = user_info.unwrap_or_else(|| inner.options.default_user.clone());
        let result = inner
            .transport
            .join_presence_channel(&inner.channel, &info)
            .await;

        let joined = match result {
            Ok(joined) => joined,
            Err(e) => {
                let current = {
                    let mut state = inner.state.lock();
                    let current = state.phase == RoomPhase::Joining(generation);
                    if current {
                        state.phase = RoomPhase::NotJoined;
                    }
                    current && state.alive
                };
                let err = RealtimeError::PresenceJoin(e.to_string());
                if current {
                    warn!(channel = %inner.channel, error = %e, "Presence join failed");
                    inner.revision.bump();
                    inner.callbacks.error(&err);
                }
                return Err(err);
            }
        };

        let my_id = joined.me.id;
        let members = inner.transport.presence_members(&inner.channel);
        let online = online_count(&members);
        let accepted = {
            let mut state = inner.state.lock();
            let current = state.alive && state.phase == RoomPhase::Joining(generation);
            if current {
                state.phase = RoomPhase::Joined {
                    my_id: my_id.clone(),
                };
                state.members = members;
                state.online_count = online;
            }
            current
        };

        if !accepted {
            info!(channel = %inner.channel, member = %my_id, "Leaving presence channel joined after teardown");
            if let Err(e) = inner.transport.leave_presence_channel(&inner.channel) {
                warn!(channel = %inner.channel, error = %e, "Failed to release late presence join");
            }
            return Ok(());
        }

        info!(channel = %inner.channel, member = %my_id, online, "Joined presence channel");
        inner.revision.bump();
        let task = spawn_diff_task(inner);
        if let Some(previous) = self.diff_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Leave the channel. Local state is only cleared once the transport
    /// confirms; a failure goes to `on_error` and is returned.
    pub fn leave(&self) -> Result<(), RealtimeError> {
        let inner = &self.inner;
        if !inner.is_joined() {
            return Ok(());
        }

        if let Err(e) = inner.transport.leave_presence_channel(&inner.channel) {
            let err = RealtimeError::PresenceLeave(e.to_string());
            warn!(channel = %inner.channel, error = %e, "Presence leave failed");
            inner.callbacks.error(&err);
            return Err(err);
        }

        self.stop_diffing();
        inner.state.lock().clear();
        info!(channel = %inner.channel, "Left presence channel");
        inner.revision.bump();
        Ok(())
    }

    /// Change the status of the local member in the cached snapshot only.
    /// Returns false when not joined or when the snapshot lacks our entry.
    pub fn update_status(&self, status: impl Into<MemberStatus>) -> bool {
        let status = status.into();
        let updated = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let RoomPhase::Joined { my_id } = &state.phase else {
                return false;
            };
            match state.members.iter_mut().find(|m| m.id == *my_id) {
                Some(me) => {
                    me.info.status = Some(status.clone());
                    state.online_count = online_count(&state.members);
                    true
                }
                None => false,
            }
        };
        if updated {
            debug!(channel = %self.inner.channel, status = %status, "Local presence status updated");
            self.inner.revision.bump();
        }
        updated
    }

    pub fn get_member(&self, id: &str) -> Option<PresenceMember> {
        self.inner
            .state
            .lock()
            .members
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Run one diff cycle now.
    pub fn refresh(&self) -> Option<MemberDiff> {
        self.inner.run_cycle()
    }

    pub fn members(&self) -> Vec<PresenceMember> {
        self.inner.state.lock().members.clone()
    }

    pub fn online_count(&self) -> usize {
        self.inner.state.lock().online_count
    }

    pub fn my_id(&self) -> Option<String> {
        match &self.inner.state.lock().phase {
            RoomPhase::Joined { my_id } => Some(my_id.clone()),
            _ => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.inner.is_joined()
    }

    pub fn is_joining(&self) -> bool {
        matches!(self.inner.state.lock().phase, RoomPhase::Joining(_))
    }

    /// Whether the transport itself considers us a member.
    pub fn is_in_channel(&self) -> bool {
        self.inner.transport.is_in_presence_channel(&self.inner.channel)
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Unmount: stop the diff task and leave if joined. A join still in
    /// flight is released when it resolves. Safe to call repeatedly and
    /// before any join.
    pub fn teardown(&self) {
        self.stop_diffing();
        let inner = &self.inner;
        let was_joined = {
            let mut state = inner.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            let was_joined = matches!(state.phase, RoomPhase::Joined { .. });
            state.clear();
            was_joined
        };
        if was_joined {
            if let Err(e) = inner.transport.leave_presence_channel(&inner.channel) {
                warn!(channel = %inner.channel, error = %e, "Presence leave on teardown failed");
            }
        }
        debug!(channel = %inner.channel, was_joined, "Presence room torn down");
        inner.revision.bump();
    }

    fn stop_diffing(&self) {
        if let Some(task) = self.diff_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for PresenceRoom {
    fn drop(&mut self) {
        self.teardown();
    }
}

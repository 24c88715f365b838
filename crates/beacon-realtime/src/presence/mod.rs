//! Presence channels: join/leave, membership snapshots and diffing.

mod diff;
mod room;
mod types;

#[cfg(test)]
mod tests;

pub use diff::{diff_members, online_count, MemberDiff};
pub use room::{
    MemberCallback, PresenceCallbacks, PresenceOptions, PresenceRoom, DEFAULT_POLL_INTERVAL,
};
pub use types::{MemberInfo, MemberStatus, PresenceMember, DEFAULT_MEMBER_NAME};

//! Presence members and their statuses.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MEMBER_NAME: &str = "Anonymous User";

/// Presence status of a member. Unknown strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberStatus {
    Online,
    Away,
    Busy,
    Offline,
    Other(String),
}

impl MemberStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MemberStatus::Online => "online",
            MemberStatus::Away => "away",
            MemberStatus::Busy => "busy",
            MemberStatus::Offline => "offline",
            MemberStatus::Other(s) => s,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, MemberStatus::Online)
    }
}

impl From<String> for MemberStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "online" => MemberStatus::Online,
            "away" => MemberStatus::Away,
            "busy" => MemberStatus::Busy,
            "offline" => MemberStatus::Offline,
            _ => MemberStatus::Other(s),
        }
    }
}

impl From<&str> for MemberStatus {
    fn from(s: &str) -> Self {
        MemberStatus::from(s.to_string())
    }
}

impl From<MemberStatus> for String {
    fn from(status: MemberStatus) -> Self {
        match status {
            MemberStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata a member publishes about itself.
///
/// Fields beyond `name` and `status` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>, status: impl Into<MemberStatus>) -> Self {
        Self {
            name: Some(name.into()),
            status: Some(status.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// A member without a status is not counted as online.
    pub fn is_online(&self) -> bool {
        self.status.as_ref().is_some_and(MemberStatus::is_online)
    }
}

impl Default for MemberInfo {
    fn default() -> Self {
        Self::new(DEFAULT_MEMBER_NAME, MemberStatus::Online)
    }
}

/// One entry of a presence snapshot. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub id: String,
    pub info: MemberInfo,
}

impl PresenceMember {
    pub fn new(id: impl Into<String>, info: MemberInfo) -> Self {
        Self {
            id: id.into(),
            info,
        }
    }

    pub fn is_online(&self) -> bool {
        self.info.is_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_info_is_anonymous_online() {
        let info = MemberInfo::default();
        assert_eq!(info.name.as_deref(), Some("Anonymous User"));
        assert_eq!(info.status, Some(MemberStatus::Online));
        assert!(info.is_online());
    }

    #[test]
    fn unknown_status_round_trips_verbatim() {
        let status: MemberStatus = serde_json::from_str("\"in-a-meeting\"").unwrap();
        assert_eq!(status, MemberStatus::Other("in-a-meeting".into()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"in-a-meeting\"");
    }

    #[test]
    fn member_deserializes_with_extra_fields() {
        let member: PresenceMember = serde_json::from_value(serde_json::json!({
            "id": "u2",
            "info": { "name": "Ada", "status": "away", "avatar": "ada.png" }
        }))
        .unwrap();
        assert_eq!(member.info.status, Some(MemberStatus::Away));
        assert_eq!(member.info.extra["avatar"], "ada.png");
        assert!(!member.is_online());
    }

    #[test]
    fn missing_status_is_not_online() {
        let member: PresenceMember = serde_json::from_value(serde_json::json!({
            "id": "u3",
            "info": { "name": "Grace" }
        }))
        .unwrap();
        assert_eq!(member.info.status, None);
        assert!(!member.is_online());
    }
}

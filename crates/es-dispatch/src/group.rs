//! Group membership - a collaborator that raises events after commit.
//!
//! The directory is the source of truth for who belongs to a group; the
//! handler mutates it and only then publishes the matching domain event, so
//! subscribers never hear about a membership that does not exist.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use es_common::{AudienceScope, DomainEvent, OwnerId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::audience::AudienceResolver;
use crate::bus::EventPublisher;
use crate::Result;

pub const MEMBER_ADDED: &str = "group_member.added";
pub const MEMBER_REMOVED: &str = "group_member.removed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub member_id: String,
    pub group_id: String,
    pub user_id: OwnerId,
    pub joined_at: DateTime<Utc>,
}

/// In-memory group memberships, insertion-ordered per group
#[derive(Default)]
pub struct GroupDirectory {
    groups: RwLock<HashMap<String, IndexMap<OwnerId, GroupMember>>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the membership and whether it was newly created
    pub fn add_member(&self, group_id: &str, user_id: &OwnerId) -> (GroupMember, bool) {
        let mut groups = self.groups.write();
        let members = groups.entry(group_id.to_string()).or_default();

        if let Some(existing) = members.get(user_id) {
            return (existing.clone(), false);
        }

        let member = GroupMember {
            member_id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            user_id: user_id.clone(),
            joined_at: Utc::now(),
        };
        members.insert(user_id.clone(), member.clone());
        (member, true)
    }

    pub fn remove_member(&self, group_id: &str, user_id: &OwnerId) -> Option<GroupMember> {
        let mut groups = self.groups.write();
        let members = groups.get_mut(group_id)?;
        let removed = members.shift_remove(user_id);
        if members.is_empty() {
            groups.remove(group_id);
        }
        removed
    }

    pub fn is_member(&self, group_id: &str, user_id: &OwnerId) -> bool {
        self.groups
            .read()
            .get(group_id)
            .is_some_and(|members| members.contains_key(user_id))
    }

    pub fn members(&self, group_id: &str) -> Vec<GroupMember> {
        self.groups
            .read()
            .get(group_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl AudienceResolver for GroupDirectory {
    fn is_eligible(&self, origin_id: &str, owner: &OwnerId) -> bool {
        self.is_member(origin_id, owner)
    }
}

/// Adds and removes group members, raising a scoped event for each change
pub struct GroupMembershipHandler {
    directory: Arc<GroupDirectory>,
    publisher: Arc<dyn EventPublisher>,
}

impl GroupMembershipHandler {
    pub fn new(directory: Arc<GroupDirectory>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { directory, publisher }
    }

    /// Add `user_id` to the group. A repeated add returns the existing
    /// membership and raises nothing.
    pub async fn add_member(&self, group_id: &str, user_id: &OwnerId) -> Result<GroupMember> {
        let (member, created) = self.directory.add_member(group_id, user_id);
        if !created {
            debug!(group_id, user_id = %user_id, "Already a group member");
            return Ok(member);
        }

        info!(group_id, user_id = %user_id, member_id = %member.member_id, "Group member added");
        self.publisher.publish_event(membership_event(MEMBER_ADDED, &member)).await?;
        Ok(member)
    }

    /// Remove `user_id` from the group. Returns `None` if they were not a member.
    ///
    /// The event is scoped to the remaining members.
    pub async fn remove_member(&self, group_id: &str, user_id: &OwnerId) -> Result<Option<GroupMember>> {
        let Some(member) = self.directory.remove_member(group_id, user_id) else {
            return Ok(None);
        };

        info!(group_id, user_id = %user_id, "Group member removed");
        self.publisher.publish_event(membership_event(MEMBER_REMOVED, &member)).await?;
        Ok(Some(member))
    }
}

fn membership_event(event_type: &str, member: &GroupMember) -> DomainEvent {
    DomainEvent::new(
        event_type,
        json!({
            "groupId": member.group_id,
            "userId": member.user_id,
            "memberId": member.member_id,
        }),
        Some(member.group_id.clone()),
    )
    .with_scope(AudienceScope::OriginMembers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use es_common::EventId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish_event(&self, event: DomainEvent) -> Result<EventId> {
            let id = event.id.clone();
            self.events.lock().push(event);
            Ok(id)
        }
    }

    #[tokio::test]
    async fn test_add_publishes_after_commit() {
        let directory = Arc::new(GroupDirectory::new());
        let recorder = Arc::new(Recorder::default());
        let handler = GroupMembershipHandler::new(directory.clone(), recorder.clone());
        let user = OwnerId::new("U1");

        let member = handler.add_member("G1", &user).await.unwrap();

        assert!(directory.is_eligible("G1", &user));
        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, MEMBER_ADDED);
        assert_eq!(events[0].origin_id.as_deref(), Some("G1"));
        assert_eq!(events[0].scope, AudienceScope::OriginMembers);
        assert_eq!(events[0].payload["userId"], "U1");
        assert_eq!(events[0].payload["memberId"], member.member_id.as_str());
    }

    #[tokio::test]
    async fn test_repeat_add_is_silent() {
        let directory = Arc::new(GroupDirectory::new());
        let recorder = Arc::new(Recorder::default());
        let handler = GroupMembershipHandler::new(directory.clone(), recorder.clone());
        let user = OwnerId::new("U1");

        let first = handler.add_member("G1", &user).await.unwrap();
        let second = handler.add_member("G1", &user).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(recorder.events.lock().len(), 1);
        assert_eq!(directory.members("G1").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_member() {
        let directory = Arc::new(GroupDirectory::new());
        let recorder = Arc::new(Recorder::default());
        let handler = GroupMembershipHandler::new(directory.clone(), recorder.clone());
        let user = OwnerId::new("U1");

        assert!(handler.remove_member("G1", &user).await.unwrap().is_none());
        handler.add_member("G1", &user).await.unwrap();
        assert!(handler.remove_member("G1", &user).await.unwrap().is_some());

        assert!(!directory.is_member("G1", &user));
        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, MEMBER_REMOVED);
    }
}

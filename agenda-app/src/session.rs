//! Per-user state, isolated by (channel_id, sender_id).
//!
//! Each user's conversation, read snapshot and proposal queue live together in
//! one aggregate behind its own async mutex, so a turn sees them consistently
//! and different users never contend.

use crate::conversation::Conversation;
use crate::freshness::SessionState;
use crate::queue::ProposalQueue;
use agenda_channels::{ChannelId, SenderId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
    channel_id: ChannelId,
    sender_id: SenderId,
}

impl UserKey {
    pub fn new(channel_id: impl Into<ChannelId>, sender_id: impl Into<SenderId>) -> Self {
        Self {
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.sender_id)
    }
}

#[derive(Debug)]
pub struct UserState {
    pub id: Uuid,
    pub conversation: Conversation,
    pub freshness: SessionState,
    pub queue: ProposalQueue,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserState {
    fn new(max_history_messages: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation: Conversation::new(max_history_messages),
            freshness: SessionState::default(),
            queue: ProposalQueue::default(),
            created_at: now,
            last_active: now,
        }
    }

    /// Clears conversation, read snapshot and queue together.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.freshness.clear();
        self.queue.cancel_all();
        self.last_active = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

pub struct SessionManager {
    users: DashMap<UserKey, Arc<Mutex<UserState>>>,
    max_history_messages: usize,
}

impl SessionManager {
    pub fn new(max_history_messages: usize) -> Self {
        Self {
            users: DashMap::new(),
            max_history_messages,
        }
    }

    /// The user's aggregate, created on first access. The map guard is
    /// released before this returns; callers lock the aggregate themselves.
    pub fn get_or_create(&self, key: &UserKey) -> Arc<Mutex<UserState>> {
        self.users
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(user = %key, "session created");
                Arc::new(Mutex::new(UserState::new(self.max_history_messages)))
            })
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

//! Direct message inbox, replies and notifications

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{check_content, require_user, resolve_authors, MAX_MESSAGE_LENGTH};
use crate::db::ContentStore;
use crate::error::{AppError, Result};
use crate::models::{DirectMessage, Notification, UserSummary};

/// Received message with its sender resolved
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub message: DirectMessage,
    pub sender: UserSummary,
}

pub struct MessagingService {
    store: Arc<dyn ContentStore>,
}

impl MessagingService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Messages received by `user_id`, newest first
    pub async fn inbox(&self, user_id: i64) -> Result<Vec<InboxEntry>> {
        let messages = self.store.messages_for(user_id).await?;
        let senders = resolve_authors(&*self.store, messages.iter().map(|m| m.sender_id)).await?;

        messages
            .into_iter()
            .map(|message| {
                let sender = senders.get(&message.sender_id).cloned().ok_or_else(|| {
                    AppError::Integrity(format!("message {} has no sender", message.id))
                })?;
                Ok(InboxEntry { message, sender })
            })
            .collect()
    }

    /// Answer a received message; only its receiver may reply
    pub async fn reply(
        &self,
        message_id: i64,
        user_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<DirectMessage> {
        let original = self
            .store
            .message_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;
        if original.receiver_id != user_id {
            return Err(AppError::Forbidden(
                "You can only reply to messages sent to you".to_string(),
            ));
        }
        check_content(content, MAX_MESSAGE_LENGTH, "Reply")?;
        let replier = require_user(&*self.store, user_id).await?;

        let reply = self
            .store
            .create_message(replier.id, original.sender_id, content, now)
            .await?;

        let note = format!("{} replied to your message", replier.username);
        if let Err(e) = self
            .store
            .create_notification(original.sender_id, &note, now)
            .await
        {
            warn!(message_id = reply.id, error = %e, "Reply notification failed");
        }

        info!(
            message_id = reply.id,
            in_reply_to = original.id,
            sender_id = replier.id,
            "Reply sent"
        );
        Ok(reply)
    }

    pub async fn notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
        Ok(self.store.notifications_for(user_id).await?)
    }

    /// Mark every notification read; returns how many changed
    pub async fn mark_notifications_read(&self, user_id: i64) -> Result<u64> {
        let updated = self.store.mark_notifications_read(user_id).await?;
        info!(user_id, updated, "Notifications marked read");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    #[tokio::test]
    async fn test_inbox_and_reply() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let first = store.create_message(alice.id, bob.id, "hi bob", t0()).await.unwrap();
        store.create_message(alice.id, bob.id, "you there?", mins(1)).await.unwrap();
        let svc = MessagingService::new(store.clone());

        let inbox = svc.inbox(bob.id).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message.content, "you there?");
        assert_eq!(inbox[0].sender.username, "alice");

        let reply = svc.reply(first.id, bob.id, "yes!", mins(2)).await.unwrap();
        assert_eq!(reply.sender_id, bob.id);
        assert_eq!(reply.receiver_id, alice.id);
        assert_eq!(
            svc.notifications(alice.id).await.unwrap()[0].message,
            "bob replied to your message"
        );
    }

    #[tokio::test]
    async fn test_reply_rules() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let carol = user(&store, "carol").await;
        let msg = store.create_message(alice.id, bob.id, "hi bob", t0()).await.unwrap();
        let svc = MessagingService::new(store.clone());

        assert!(matches!(
            svc.reply(msg.id, carol.id, "butting in", t0()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.reply(msg.id, alice.id, "replying to myself", t0()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.reply(msg.id, bob.id, &"x".repeat(501), t0()).await,
            Err(AppError::ContentTooLong { limit: 500, .. })
        ));
        assert!(matches!(
            svc.reply(404, bob.id, "hello", t0()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(svc.reply(msg.id, bob.id, &"x".repeat(500), t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mark_notifications_read() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        store.create_notification(alice.id, "one", t0()).await.unwrap();
        store.create_notification(alice.id, "two", mins(1)).await.unwrap();
        let svc = MessagingService::new(store.clone());

        let notes = svc.notifications(alice.id).await.unwrap();
        assert_eq!(notes[0].message, "two");
        assert!(notes.iter().all(|n| !n.read));

        assert_eq!(svc.mark_notifications_read(alice.id).await.unwrap(), 2);
        assert!(svc.notifications(alice.id).await.unwrap().iter().all(|n| n.read));
        assert_eq!(svc.mark_notifications_read(alice.id).await.unwrap(), 0);
    }
}

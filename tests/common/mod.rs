#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rentwatch::domain::notification::{Notification, NotificationStatistics, NotificationType};
use rentwatch::domain::ports::NotificationBackend;
use rentwatch::error::Result;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn notification(id: &str, minutes_ago: i64, is_read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        notification_type: NotificationType::BookingConfirmed,
        title: format!("Booking {id}"),
        message: "Your viewing is confirmed".to_string(),
        link: None,
        is_read,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}

/// Backend whose unread-count replies arrive after scripted delays, so
/// responses can be made to complete out of order.
#[derive(Default)]
pub struct DelayedUnreadBackend {
    replies: Mutex<VecDeque<(Duration, u64)>>,
    unread_calls: AtomicUsize,
}

impl DelayedUnreadBackend {
    pub fn new(replies: Vec<(Duration, u64)>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            unread_calls: AtomicUsize::new(0),
        }
    }

    pub fn unread_calls(&self) -> usize {
        self.unread_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationBackend for DelayedUnreadBackend {
    async fn unread_count(&self) -> Result<u64> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        let (delay, count) = reply.unwrap_or((Duration::ZERO, 0));
        tokio::time::sleep(delay).await;
        Ok(count)
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _notification_id: &str) -> Result<()> {
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _notification_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64> {
        Ok(0)
    }

    async fn statistics(&self) -> Result<NotificationStatistics> {
        Ok(NotificationStatistics::default())
    }
}

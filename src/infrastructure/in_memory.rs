use crate::domain::notification::{Notification, NotificationStatistics, TypeCount};
use crate::domain::payment::{PaymentSnapshot, PaymentStatus, StkPushReceipt};
use crate::domain::ports::{NotificationBackend, PaymentGateway};
use crate::error::{PollError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// One scripted reply of [`ScriptedPaymentGateway`].
#[derive(Debug, Clone)]
pub enum ScriptedStatus {
    Status(PaymentStatus),
    Error(String),
}

/// A payment gateway that replays a fixed sequence of status replies.
///
/// Once the script is exhausted the last entry repeats; an empty script
/// always reports `pending`. Useful for tests and offline runs.
pub struct ScriptedPaymentGateway {
    script: Vec<ScriptedStatus>,
    latency: Duration,
    stk_rejection: Option<String>,
    status_queries: AtomicUsize,
    stk_pushes: AtomicUsize,
}

impl ScriptedPaymentGateway {
    pub fn new(script: Vec<ScriptedStatus>) -> Self {
        Self {
            script,
            latency: Duration::ZERO,
            stk_rejection: None,
            status_queries: AtomicUsize::new(0),
            stk_pushes: AtomicUsize::new(0),
        }
    }

    /// Delays every status reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn rejecting_stk_push(mut self, error: impl Into<String>) -> Self {
        self.stk_rejection = Some(error.into());
        self
    }

    /// Number of status queries issued so far.
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub fn stk_pushes(&self) -> usize {
        self.stk_pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedPaymentGateway {
    async fn payment_status(&self, payment_id: &str) -> Result<PaymentSnapshot> {
        let step = self.status_queries.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .script
            .get(step)
            .or(self.script.last())
            .cloned()
            .unwrap_or(ScriptedStatus::Status(PaymentStatus::Pending));

        match reply {
            ScriptedStatus::Status(status) => {
                let mut snapshot = PaymentSnapshot::new(payment_id, status);
                snapshot.checkout_reference = Some(format!("ws_CO_{payment_id}"));
                if status == PaymentStatus::Failed {
                    snapshot.failure_reason = Some("Request cancelled by user".to_string());
                }
                Ok(snapshot)
            }
            ScriptedStatus::Error(message) => Err(PollError::TransportError(message)),
        }
    }

    async fn initiate_stk_push(
        &self,
        payment_id: &str,
        _phone_number: &str,
    ) -> Result<StkPushReceipt> {
        self.stk_pushes.fetch_add(1, Ordering::SeqCst);

        Ok(match &self.stk_rejection {
            Some(error) => StkPushReceipt {
                success: false,
                checkout_request_id: None,
                merchant_request_id: None,
                message: None,
                error: Some(error.clone()),
            },
            None => StkPushReceipt {
                success: true,
                checkout_request_id: Some(format!("ws_CO_{payment_id}")),
                merchant_request_id: Some(format!("mr_{payment_id}")),
                message: Some(
                    "STK Push sent. Please check your phone and enter M-Pesa PIN".to_string(),
                ),
                error: None,
            },
        })
    }
}

/// A thread-safe in-memory notification inbox for a single user.
///
/// Reads can be made to fail on demand to exercise the stale-but-available
/// behaviour of the poller.
#[derive(Default)]
pub struct InMemoryNotificationBackend {
    notifications: RwLock<Vec<Notification>>,
    fail_reads: AtomicBool,
    unread_calls: AtomicUsize,
    recent_calls: AtomicUsize,
}

impl InMemoryNotificationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        Self {
            notifications: RwLock::new(notifications),
            ..Self::default()
        }
    }

    pub async fn push(&self, notification: Notification) {
        self.notifications.write().await.push(notification);
    }

    /// Makes `unread_count` and `recent` fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn unread_calls(&self) -> usize {
        self.unread_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(PollError::TransportError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn not_found(message: &str) -> PollError {
    PollError::BackendError {
        status: 404,
        message: message.to_string(),
    }
}

#[async_trait]
impl NotificationBackend for InMemoryNotificationBackend {
    async fn unread_count(&self) -> Result<u64> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let notifications = self.notifications.read().await;
        Ok(notifications.iter().filter(|n| !n.is_read).count() as u64)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Notification>> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let mut notifications = self.notifications.read().await.clone();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit);
        Ok(notifications)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| not_found("Notification not found"))?;
        notification.is_read = true;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        for notification in notifications.iter_mut() {
            notification.is_read = true;
        }
        Ok(())
    }

    async fn delete(&self, notification_id: &str) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|n| n.id != notification_id);
        if notifications.len() == before {
            return Err(not_found("Notification not found or already deleted"));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let deleted = notifications.len() as u64;
        notifications.clear();
        Ok(deleted)
    }

    async fn statistics(&self) -> Result<NotificationStatistics> {
        self.check_reads()?;
        let notifications = self.notifications.read().await;
        let total = notifications.len() as u64;
        let unread = notifications.iter().filter(|n| !n.is_read).count() as u64;
        let week_ago = Utc::now() - ChronoDuration::days(7);

        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        for notification in notifications.iter() {
            let key = serde_json::to_value(notification.notification_type)?
                .as_str()
                .unwrap_or("other")
                .to_string();
            *by_type.entry(key).or_default() += 1;
        }

        Ok(NotificationStatistics {
            total_notifications: total,
            unread_count: unread,
            read_count: total - unread,
            by_type: by_type
                .into_iter()
                .map(|(notification_type, count)| TypeCount {
                    notification_type,
                    count,
                })
                .collect(),
            recent_count: notifications
                .iter()
                .filter(|n| n.created_at >= week_ago)
                .count() as u64,
        })
    }
}

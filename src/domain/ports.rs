use super::notification::{Notification, NotificationStatistics};
use super::payment::{PaymentSnapshot, StkPushReceipt};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn payment_status(&self, payment_id: &str) -> Result<PaymentSnapshot>;
    async fn initiate_stk_push(&self, payment_id: &str, phone_number: &str)
    -> Result<StkPushReceipt>;
}

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn unread_count(&self) -> Result<u64>;
    async fn recent(&self, limit: usize) -> Result<Vec<Notification>>;
    async fn mark_read(&self, notification_id: &str) -> Result<()>;
    async fn mark_all_read(&self) -> Result<()>;
    async fn delete(&self, notification_id: &str) -> Result<()>;
    async fn delete_all(&self) -> Result<u64>;
    async fn statistics(&self) -> Result<NotificationStatistics>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotificationBackendRef = Arc<dyn NotificationBackend>;

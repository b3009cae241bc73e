use crate::config::NotificationPollConfig;
use crate::domain::notification::{Notification, NotificationDigest, NotificationStatistics};
use crate::domain::ports::NotificationBackendRef;
use crate::error::{PollError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Digest plus the sequence number of the request that last wrote each half.
#[derive(Debug, Default)]
struct DigestCell {
    digest: NotificationDigest,
    unread_seq: u64,
    recent_seq: u64,
}

/// Read side of the shared notification digest.
///
/// Every subscriber sees the same snapshot; subscribing never triggers a
/// request of its own.
#[derive(Debug, Clone)]
pub struct DigestSubscriber {
    rx: watch::Receiver<DigestCell>,
}

impl DigestSubscriber {
    pub fn snapshot(&self) -> NotificationDigest {
        self.rx.borrow().digest.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.rx.borrow().digest.unread_count
    }

    pub fn recent_items(&self) -> Vec<Notification> {
        self.rx.borrow().digest.recent_items.clone()
    }

    /// Waits for the next published change.
    ///
    /// Returns `None` once the owning poller has been dropped.
    pub async fn changed(&mut self) -> Option<NotificationDigest> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().digest.clone())
    }
}

struct Shared {
    backend: NotificationBackendRef,
    page_size: usize,
    digest: watch::Sender<DigestCell>,
    next_seq: AtomicU64,
}

impl Shared {
    fn issue_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn fetch_unread(&self, guard: Option<&CancellationToken>) -> Result<()> {
        let seq = self.issue_seq();
        let count = self.backend.unread_count().await?;
        self.apply_unread(seq, count, guard);
        Ok(())
    }

    async fn fetch_recent(&self, guard: Option<&CancellationToken>) -> Result<()> {
        let seq = self.issue_seq();
        let mut items = self.backend.recent(self.page_size).await?;
        items.truncate(self.page_size);
        self.apply_recent(seq, items, guard);
        Ok(())
    }

    /// Refreshes both halves of the digest, logging failures. Stale values
    /// stay in place when a request fails.
    async fn refresh_all(&self, guard: Option<&CancellationToken>) {
        let (unread, recent) = tokio::join!(self.fetch_unread(guard), self.fetch_recent(guard));
        if let Err(e) = unread {
            warn!(error = %e, "unread count refresh failed");
        }
        if let Err(e) = recent {
            warn!(error = %e, "recent notifications refresh failed");
        }
    }

    fn apply_unread(&self, seq: u64, count: u64, guard: Option<&CancellationToken>) -> bool {
        self.digest.send_if_modified(|cell| {
            if guard.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            if seq <= cell.unread_seq {
                debug!(seq, applied = cell.unread_seq, "discarding stale unread count");
                return false;
            }
            cell.unread_seq = seq;
            let changed = cell.digest.unread_count != count;
            cell.digest.unread_count = count;
            changed
        })
    }

    fn apply_recent(
        &self,
        seq: u64,
        items: Vec<Notification>,
        guard: Option<&CancellationToken>,
    ) -> bool {
        self.digest.send_if_modified(|cell| {
            if guard.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            if seq <= cell.recent_seq {
                debug!(seq, applied = cell.recent_seq, "discarding stale notification page");
                return false;
            }
            cell.recent_seq = seq;
            let changed = cell.digest.recent_items != items;
            cell.digest.recent_items = items;
            changed
        })
    }

    /// Local write that supersedes every request issued before it.
    fn overwrite(&self, edit: impl FnOnce(&mut NotificationDigest)) {
        let seq = self.issue_seq();
        self.digest.send_modify(|cell| {
            cell.unread_seq = seq;
            cell.recent_seq = seq;
            edit(&mut cell.digest);
        });
    }
}

struct PollingTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a shared, eventually consistent view of the user's notifications.
///
/// Background refreshes run on a fixed cadence once [`start_polling`] is
/// called. Any number of [`DigestSubscriber`]s can observe the result.
///
/// [`start_polling`]: NotificationPoller::start_polling
pub struct NotificationPoller {
    shared: Arc<Shared>,
    polling: Mutex<Option<PollingTask>>,
}

impl NotificationPoller {
    /// Creates a poller keeping at most `page_size` recent notifications.
    ///
    /// A `page_size` of zero is raised to 1. Use [`from_config`] to reject it
    /// instead.
    ///
    /// [`from_config`]: NotificationPoller::from_config
    pub fn new(backend: NotificationBackendRef, page_size: usize) -> Self {
        let (digest, _) = watch::channel(DigestCell::default());
        Self {
            shared: Arc::new(Shared {
                backend,
                page_size: page_size.max(1),
                digest,
                next_seq: AtomicU64::new(0),
            }),
            polling: Mutex::new(None),
        }
    }

    pub fn from_config(
        backend: NotificationBackendRef,
        config: &NotificationPollConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(backend, config.page_size))
    }

    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    pub fn subscribe(&self) -> DigestSubscriber {
        DigestSubscriber {
            rx: self.shared.digest.subscribe(),
        }
    }

    pub fn digest(&self) -> NotificationDigest {
        self.shared.digest.borrow().digest.clone()
    }

    fn lock_polling(&self) -> MutexGuard<'_, Option<PollingTask>> {
        self.polling.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_polling(&self) -> bool {
        self.lock_polling()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Starts the background refresh. A second call while running is a no-op.
    ///
    /// Refreshes immediately, then every `interval`. A tick that falls due
    /// while the previous refresh is still in flight is skipped.
    pub fn start_polling(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(PollError::InvalidSchedule(
                "interval must be greater than zero".to_string(),
            ));
        }

        let mut polling = self.lock_polling();
        if polling
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            debug!("notification polling already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_ticks(self.shared.clone(), interval, cancel.clone()));
        *polling = Some(PollingTask { cancel, handle });

        info!(
            interval_ms = interval.as_millis() as u64,
            "notification polling started"
        );
        Ok(())
    }

    /// Stops the background refresh. Safe to call when not running.
    pub fn stop_polling(&self) {
        if let Some(task) = self.lock_polling().take() {
            task.cancel.cancel();
            info!("notification polling stopped");
        }
    }

    pub async fn refresh_unread_count(&self) {
        if let Err(e) = self.shared.fetch_unread(None).await {
            warn!(error = %e, "unread count refresh failed");
        }
    }

    pub async fn refresh_recent(&self) {
        if let Err(e) = self.shared.fetch_recent(None).await {
            warn!(error = %e, "recent notifications refresh failed");
        }
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<()> {
        self.shared.backend.mark_read(notification_id).await?;
        self.shared.refresh_all(None).await;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.shared.backend.mark_all_read().await?;
        self.shared.overwrite(|digest| {
            digest.unread_count = 0;
            for item in &mut digest.recent_items {
                item.is_read = true;
            }
        });
        self.refresh_recent().await;
        Ok(())
    }

    pub async fn delete(&self, notification_id: &str) -> Result<()> {
        self.shared.backend.delete(notification_id).await?;
        self.shared.refresh_all(None).await;
        Ok(())
    }

    /// Deletes every notification and returns how many the server removed.
    pub async fn delete_all(&self) -> Result<u64> {
        let deleted = self.shared.backend.delete_all().await?;
        self.shared.overwrite(|digest| {
            digest.unread_count = 0;
            digest.recent_items.clear();
        });
        Ok(deleted)
    }

    pub async fn statistics(&self) -> Result<NotificationStatistics> {
        self.shared.backend.statistics().await
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        if let Some(task) = self.lock_polling().take() {
            task.cancel.cancel();
        }
    }
}

async fn run_ticks(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.refresh_all(Some(&cancel)) => {}
        }
    }

    debug!("notification tick loop exited");
}

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Default number of notifications kept in the digest.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BookingConfirmed,
    BookingRejected,
    BookingCancelled,
    NewBooking,
    BookingReminder,
    PropertyExpiring,
    Welcome,
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationType::BookingConfirmed => "✅",
            NotificationType::BookingRejected => "❌",
            NotificationType::BookingCancelled => "🚫",
            NotificationType::NewBooking => "🔔",
            NotificationType::BookingReminder => "⏰",
            NotificationType::PropertyExpiring => "⚠️",
            NotificationType::Welcome => "🎉",
            NotificationType::Other => "📬",
        }
    }

    /// CSS-style colour class used by clients rendering the digest.
    pub fn color_class(&self) -> &'static str {
        match self {
            NotificationType::BookingConfirmed | NotificationType::Welcome => {
                "notification-success"
            }
            NotificationType::BookingRejected => "notification-danger",
            NotificationType::BookingCancelled
            | NotificationType::BookingReminder
            | NotificationType::PropertyExpiring => "notification-warning",
            NotificationType::NewBooking => "notification-info",
            NotificationType::Other => "notification-default",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    pub is_read: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Accepts RFC 3339 timestamps as well as the offset-less ISO 8601 form the
/// backend emits for UTC datetimes.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl Notification {
    /// Human readable age of the notification relative to `now`.
    pub fn relative_time(&self, now: DateTime<Utc>) -> String {
        let seconds = (now - self.created_at).num_seconds();

        if seconds < 60 {
            "Just now".to_string()
        } else if seconds < 3_600 {
            format!("{} minutes ago", seconds / 60)
        } else if seconds < 86_400 {
            format!("{} hours ago", seconds / 3_600)
        } else if seconds < 604_800 {
            format!("{} days ago", seconds / 86_400)
        } else {
            self.created_at.format("%Y-%m-%d").to_string()
        }
    }
}

/// Locally cached view of the user's notifications.
///
/// `recent_items` is ordered most recent first and never longer than the
/// page size of the poller that owns it.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct NotificationDigest {
    pub unread_count: u64,
    pub recent_items: Vec<Notification>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct NotificationStatistics {
    pub total_notifications: u64,
    pub unread_count: u64,
    pub read_count: u64,
    #[serde(default)]
    pub by_type: Vec<TypeCount>,
    /// Notifications created in the last seven days.
    #[serde(default)]
    pub recent_count: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TypeCount {
    #[serde(rename = "_id")]
    pub notification_type: String,
    pub count: u64,
}

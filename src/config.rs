use crate::domain::notification::DEFAULT_PAGE_SIZE;
use crate::error::{PollError, Result};
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// How a `failed` status reported by the gateway is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedStatusPolicy {
    /// Stop polling and report the failure.
    #[default]
    Terminal,
    /// Keep polling as if the payment were still pending. Matches clients
    /// that only ever look for `completed`.
    TreatAsPending,
}

#[derive(Debug, Clone)]
pub struct PaymentPollConfig {
    pub check_interval: Duration,
    pub max_attempts: u32,
    pub failed_status: FailedStatusPolicy,
}

impl Default for PaymentPollConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(3),
            max_attempts: 40,
            failed_status: FailedStatusPolicy::Terminal,
        }
    }
}

impl PaymentPollConfig {
    pub fn validate(&self) -> Result<()> {
        validate_schedule(self.check_interval, self.max_attempts)
    }
}

#[derive(Debug, Clone)]
pub struct NotificationPollConfig {
    pub interval: Duration,
    pub page_size: usize,
}

impl Default for NotificationPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl NotificationPollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(PollError::InvalidSchedule(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(PollError::ConfigError(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Location of the marketplace REST API and the bearer token to send.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: None,
        }
    }
}

pub(crate) fn validate_schedule(check_interval: Duration, max_attempts: u32) -> Result<()> {
    if check_interval.is_zero() {
        return Err(PollError::InvalidSchedule(
            "check_interval must be greater than zero".to_string(),
        ));
    }
    if max_attempts == 0 {
        return Err(PollError::InvalidSchedule(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

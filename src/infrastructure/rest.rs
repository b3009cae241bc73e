use crate::config::ApiConfig;
use crate::domain::notification::{Notification, NotificationStatistics};
use crate::domain::payment::{PaymentSnapshot, StkPushReceipt};
use crate::domain::ports::{NotificationBackend, PaymentGateway};
use crate::error::{PollError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct PaymentEnvelope {
    payment: PaymentSnapshot,
}

#[derive(Deserialize)]
struct UnreadCountBody {
    unread_count: u64,
}

#[derive(Deserialize)]
struct NotificationPage {
    notifications: Vec<Notification>,
}

#[derive(Deserialize)]
struct DeleteAllBody {
    #[serde(default)]
    deleted_count: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
struct StkPushRequest<'a> {
    payment_id: &'a str,
    phone_number: &'a str,
}

/// Client for the marketplace REST API.
///
/// Implements both ports. Every request carries the configured bearer token.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| PollError::ConfigError(format!("invalid bearer token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PollError::ConfigError(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PollError::ConfigError(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Appends `segments` to the base path. Each segment is percent-encoded,
    /// so ids containing `/`, `?` or `#` stay inside their own segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, bytes = body.len(), "backend response received");
        Ok((status, body))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let (status, body) = self.execute(request).await?;
        if !status.is_success() {
            return Err(backend_error(status, body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn backend_error(status: StatusCode, body: String) -> PollError {
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);
    PollError::BackendError {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PaymentGateway for RestClient {
    async fn payment_status(&self, payment_id: &str) -> Result<PaymentSnapshot> {
        let request = self.client.get(self.url(&["payments", payment_id]));
        let envelope: PaymentEnvelope = self.send(request).await?;
        Ok(envelope.payment)
    }

    async fn initiate_stk_push(
        &self,
        payment_id: &str,
        phone_number: &str,
    ) -> Result<StkPushReceipt> {
        let request = self
            .client
            .post(self.url(&["payments", "mpesa", "stk-push"]))
            .json(&StkPushRequest {
                payment_id,
                phone_number,
            });
        let (status, body) = self.execute(request).await?;

        // A declined push still answers with a receipt describing why.
        match serde_json::from_str::<StkPushReceipt>(&body) {
            Ok(receipt) if status.is_success() || !receipt.success => Ok(receipt),
            _ if !status.is_success() => Err(backend_error(status, body)),
            Ok(receipt) => Ok(receipt),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl NotificationBackend for RestClient {
    async fn unread_count(&self) -> Result<u64> {
        let request = self.client.get(self.url(&["notifications", "unread-count"]));
        let body: UnreadCountBody = self.send(request).await?;
        Ok(body.unread_count)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Notification>> {
        let mut url = self.url(&["notifications", ""]);
        url.query_pairs_mut()
            .append_pair("page", "1")
            .append_pair("per_page", &limit.to_string());
        let request = self.client.get(url);
        let page: NotificationPage = self.send(request).await?;
        Ok(page.notifications)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<()> {
        let request = self
            .client
            .put(self.url(&["notifications", notification_id, "read"]))
            .json(&serde_json::json!({}));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let request = self
            .client
            .put(self.url(&["notifications", "read-all"]))
            .json(&serde_json::json!({}));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, notification_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&["notifications", notification_id]));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64> {
        let request = self.client.delete(self.url(&["notifications", "delete-all"]));
        let body: DeleteAllBody = self.send(request).await?;
        Ok(body.deleted_count)
    }

    async fn statistics(&self) -> Result<NotificationStatistics> {
        let request = self.client.get(self.url(&["notifications", "statistics"]));
        self.send(request).await
    }
}

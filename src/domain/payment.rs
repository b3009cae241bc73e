use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment as reported by the backend.
///
/// Values the client does not know about deserialize to `Unknown` and are
/// treated as still in flight.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// `completed` and `failed` never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// One observation of a payment under watch.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: PaymentStatus,
    /// Checkout reference issued by the gateway (M-Pesa `CheckoutRequestID`).
    #[serde(rename = "gateway_reference", default)]
    pub checkout_reference: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl PaymentSnapshot {
    pub fn new(id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            id: id.into(),
            status,
            checkout_reference: None,
            failure_reason: None,
            amount: None,
            currency: None,
        }
    }
}

/// Response of an M-Pesa STK push request.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct StkPushReceipt {
    pub success: bool,
    #[serde(default)]
    pub checkout_request_id: Option<String>,
    #[serde(default)]
    pub merchant_request_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// State of a single payment poll.
///
/// `Idle` is both the state before polling and the state a cancelled poll
/// returns to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PollState {
    Idle,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed | PollState::TimedOut
        )
    }
}

/// The single result delivered for a poll that was not cancelled.
#[derive(Debug, PartialEq, Clone)]
pub enum PollOutcome {
    Succeeded(PaymentSnapshot),
    Failed(PaymentSnapshot),
    /// Attempts ran out before a terminal status was seen. The caller should
    /// ask the user to check their payment history.
    TimedOut {
        attempts: u32,
        last_seen: Option<PaymentSnapshot>,
    },
}

impl PollOutcome {
    pub fn state(&self) -> PollState {
        match self {
            PollOutcome::Succeeded(_) => PollState::Succeeded,
            PollOutcome::Failed(_) => PollState::Failed,
            PollOutcome::TimedOut { .. } => PollState::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_document_deserialization() {
        let json = r#"{
            "_id": "65f1",
            "status": "processing",
            "gateway_reference": "ws_CO_123",
            "amount": 1500.5,
            "currency": "KES",
            "tenant_id": "t1"
        }"#;
        let snapshot: PaymentSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.id, "65f1");
        assert_eq!(snapshot.status, PaymentStatus::Processing);
        assert_eq!(snapshot.checkout_reference.as_deref(), Some("ws_CO_123"));
        assert_eq!(snapshot.amount, Some(dec!(1500.5)));
        assert_eq!(snapshot.failure_reason, None);
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let snapshot: PaymentSnapshot =
            serde_json::from_str(r#"{"_id": "1", "status": "refunded"}"#).unwrap();
        assert_eq!(snapshot.status, PaymentStatus::Unknown);
        assert!(!snapshot.status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }

    #[test]
    fn test_outcome_state() {
        let snapshot = PaymentSnapshot::new("1", PaymentStatus::Failed);
        assert_eq!(PollOutcome::Failed(snapshot).state(), PollState::Failed);
        assert_eq!(
            PollOutcome::TimedOut {
                attempts: 3,
                last_seen: None
            }
            .state(),
            PollState::TimedOut
        );
        assert!(PollState::TimedOut.is_terminal());
        assert!(!PollState::Idle.is_terminal());
    }
}

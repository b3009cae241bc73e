use super::payment_poller::{PaymentPoller, PaymentWatch};
use crate::config::PaymentPollConfig;
use crate::domain::ports::PaymentGatewayRef;
use crate::error::{PollError, Result};
use tracing::info;

/// M-Pesa checkout: sends the STK push prompt to the payer's phone, then
/// watches the payment until the payer confirms, declines, or the budget
/// runs out.
pub struct MpesaCheckout {
    gateway: PaymentGatewayRef,
    config: PaymentPollConfig,
}

impl MpesaCheckout {
    pub fn new(gateway: PaymentGatewayRef, config: PaymentPollConfig) -> Self {
        Self { gateway, config }
    }

    pub async fn run(&self, payment_id: &str, phone_number: &str) -> Result<PaymentWatch> {
        self.config.validate()?;

        let receipt = self
            .gateway
            .initiate_stk_push(payment_id, phone_number)
            .await?;

        if !receipt.success {
            return Err(PollError::StkPushRejected(receipt.error.unwrap_or_else(
                || "Failed to initiate M-Pesa payment".to_string(),
            )));
        }

        info!(
            payment_id,
            checkout_request_id = receipt.checkout_request_id.as_deref().unwrap_or_default(),
            "STK push sent, waiting for confirmation"
        );

        PaymentPoller::new(self.gateway.clone()).start_with(payment_id, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{PaymentStatus, PollOutcome};
    use crate::infrastructure::in_memory::{ScriptedPaymentGateway, ScriptedStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> PaymentPollConfig {
        PaymentPollConfig {
            check_interval: Duration::from_secs(3),
            max_attempts: 5,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_polls_after_push() {
        let gateway = Arc::new(ScriptedPaymentGateway::new(vec![
            ScriptedStatus::Status(PaymentStatus::Processing),
            ScriptedStatus::Status(PaymentStatus::Completed),
        ]));
        let checkout = MpesaCheckout::new(gateway.clone(), config());

        let mut watch = checkout.run("p1", "254700000000").await.unwrap();
        let outcome = watch.outcome().await.unwrap();

        assert!(matches!(outcome, PollOutcome::Succeeded(_)));
        assert_eq!(gateway.stk_pushes(), 1);
        assert_eq!(gateway.status_queries(), 2);
    }

    #[tokio::test]
    async fn test_rejected_push_does_not_poll() {
        let gateway = Arc::new(
            ScriptedPaymentGateway::new(vec![]).rejecting_stk_push("Invalid phone number"),
        );
        let checkout = MpesaCheckout::new(gateway.clone(), config());

        let result = checkout.run("p1", "0700").await;

        assert!(matches!(result, Err(PollError::StkPushRejected(ref m)) if m == "Invalid phone number"));
        assert_eq!(gateway.status_queries(), 0);
    }
}

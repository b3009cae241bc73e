use rentwatch::application::payment_poller::PaymentPoller;
use rentwatch::domain::payment::{PaymentStatus, PollOutcome, PollState};
use rentwatch::infrastructure::in_memory::{ScriptedPaymentGateway, ScriptedStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

const INTERVAL: Duration = Duration::from_millis(3000);

fn statuses(statuses: &[PaymentStatus]) -> Arc<ScriptedPaymentGateway> {
    Arc::new(ScriptedPaymentGateway::new(
        statuses.iter().copied().map(ScriptedStatus::Status).collect(),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_completes_on_third_query() {
    let gateway = statuses(&[
        PaymentStatus::Pending,
        PaymentStatus::Pending,
        PaymentStatus::Completed,
    ]);
    let started = Instant::now();
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-1", INTERVAL, 3)
        .unwrap();

    let outcome = watch.outcome().await.unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(outcome, PollOutcome::Succeeded(ref s) if s.id == "pay-1"));
    assert_eq!(gateway.status_queries(), 3);
    assert!(elapsed >= Duration::from_millis(6000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(9000), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_times_out_without_fourth_query() {
    let gateway = statuses(&[
        PaymentStatus::Pending,
        PaymentStatus::Pending,
        PaymentStatus::Pending,
    ]);
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-2", INTERVAL, 3)
        .unwrap();

    let outcome = watch.outcome().await.unwrap();
    assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 3, .. }));
    assert_eq!(watch.state(), PollState::TimedOut);

    sleep(INTERVAL * 10).await;
    assert_eq!(gateway.status_queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_never_terminal_issues_exactly_max_attempts() {
    for max_attempts in 1..=6u32 {
        let gateway = statuses(&[PaymentStatus::Processing]);
        let mut watch = PaymentPoller::new(gateway.clone())
            .start("pay-3", Duration::from_millis(500), max_attempts)
            .unwrap();

        match watch.outcome().await {
            Some(PollOutcome::TimedOut {
                attempts,
                last_seen,
            }) => {
                assert_eq!(attempts, max_attempts);
                assert_eq!(last_seen.unwrap().status, PaymentStatus::Processing);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.status_queries(), max_attempts as usize);
    }
}

#[tokio::test(start_paused = true)]
async fn test_completed_at_k_issues_k_queries() {
    let max_attempts = 5;
    for k in 1..=max_attempts {
        let mut script = vec![PaymentStatus::Pending; k - 1];
        script.push(PaymentStatus::Completed);
        let gateway = statuses(&script);

        let mut watch = PaymentPoller::new(gateway.clone())
            .start("pay-4", INTERVAL, max_attempts as u32)
            .unwrap();

        assert!(matches!(
            watch.outcome().await,
            Some(PollOutcome::Succeeded(_))
        ));
        sleep(INTERVAL * 10).await;
        assert_eq!(gateway.status_queries(), k);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_reported_as_failure() {
    let gateway = statuses(&[PaymentStatus::Processing, PaymentStatus::Failed]);
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-5", INTERVAL, 40)
        .unwrap();

    match watch.outcome().await {
        Some(PollOutcome::Failed(snapshot)) => {
            assert_eq!(snapshot.status, PaymentStatus::Failed);
            assert!(snapshot.failure_reason.is_some());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    sleep(INTERVAL * 10).await;
    assert_eq!(gateway.status_queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_queries_and_outcome() {
    let gateway = statuses(&[PaymentStatus::Pending]);
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-6", INTERVAL, 40)
        .unwrap();

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(gateway.status_queries(), 1);

    watch.cancel();
    sleep(INTERVAL * 10).await;

    assert_eq!(gateway.status_queries(), 1);
    assert_eq!(watch.state(), PollState::Idle);
    assert!(watch.outcome().await.is_none());
    assert!(watch.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_response_arriving_after_cancel_is_discarded() {
    let gateway = Arc::new(
        ScriptedPaymentGateway::new(vec![ScriptedStatus::Status(PaymentStatus::Completed)])
            .with_latency(Duration::from_secs(2)),
    );
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-7", INTERVAL, 40)
        .unwrap();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.status_queries(), 1);
    watch.cancel();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(watch.state(), PollState::Idle);
    assert!(watch.outcome().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let gateway = statuses(&[PaymentStatus::Pending]);
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-8", INTERVAL, 40)
        .unwrap();

    watch.cancel();
    watch.cancel();

    assert_eq!(watch.state(), PollState::Idle);
    assert!(watch.outcome().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_is_noop() {
    let gateway = statuses(&[PaymentStatus::Completed]);
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-9", INTERVAL, 40)
        .unwrap();

    assert!(watch.outcome().await.is_some());
    watch.cancel();
    watch.cancel();

    assert_eq!(watch.state(), PollState::Succeeded);
    assert_eq!(gateway.status_queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_consume_attempts() {
    let gateway = Arc::new(ScriptedPaymentGateway::new(vec![
        ScriptedStatus::Error("connection reset".to_string()),
        ScriptedStatus::Error("connection reset".to_string()),
    ]));
    let mut watch = PaymentPoller::new(gateway.clone())
        .start("pay-10", INTERVAL, 4)
        .unwrap();

    match watch.outcome().await {
        Some(PollOutcome::TimedOut {
            attempts,
            last_seen,
        }) => {
            assert_eq!(attempts, 4);
            assert!(last_seen.is_none());
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(gateway.status_queries(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_state_subscription_sees_terminal_state() {
    let gateway = statuses(&[PaymentStatus::Pending, PaymentStatus::Completed]);
    let watch = PaymentPoller::new(gateway)
        .start("pay-11", INTERVAL, 10)
        .unwrap();
    let mut state = watch.subscribe_state();
    assert_eq!(*state.borrow(), PollState::Polling);

    state.changed().await.unwrap();
    assert_eq!(*state.borrow_and_update(), PollState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_watch_stops_polling() {
    let gateway = statuses(&[PaymentStatus::Pending]);
    let watch = PaymentPoller::new(gateway.clone())
        .start("pay-12", INTERVAL, 40)
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    drop(watch);
    sleep(INTERVAL * 10).await;

    assert_eq!(gateway.status_queries(), 1);
}

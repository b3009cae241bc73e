use chrono::Utc;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rentwatch::application::checkout::MpesaCheckout;
use rentwatch::application::notification_poller::NotificationPoller;
use rentwatch::application::payment_poller::PaymentPoller;
use rentwatch::config::{
    ApiConfig, DEFAULT_API_URL, FailedStatusPolicy, NotificationPollConfig, PaymentPollConfig,
};
use rentwatch::domain::notification::{Notification, NotificationDigest, NotificationType};
use rentwatch::domain::payment::{PaymentStatus, PollOutcome};
use rentwatch::domain::ports::{NotificationBackendRef, PaymentGatewayRef};
use rentwatch::infrastructure::in_memory::{
    InMemoryNotificationBackend, ScriptedPaymentGateway, ScriptedStatus,
};
use rentwatch::infrastructure::rest::RestClient;
use secrecy::SecretString;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the marketplace API
    #[arg(long, env = "RENTWATCH_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "RENTWATCH_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Use in-memory backends instead of the API
    #[arg(long, global = true)]
    simulate: bool,

    /// Log level for this crate (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a payment until it completes, fails, or times out
    Payment {
        payment_id: String,

        /// Send an M-Pesa STK push to this phone number before polling
        #[arg(long)]
        phone: Option<String>,

        #[arg(long, default_value_t = 3000)]
        interval_ms: u64,

        #[arg(long, default_value_t = 40)]
        max_attempts: u32,

        /// Keep polling when the gateway reports `failed`
        #[arg(long)]
        failed_as_pending: bool,
    },
    /// Follow the unread count and most recent notifications
    Notifications {
        #[arg(long, default_value_t = 30_000)]
        interval_ms: u64,

        #[arg(long, default_value_t = 10)]
        page_size: usize,

        /// Refresh once, print the digest and exit
        #[arg(long)]
        once: bool,

        /// Mark every notification read before printing
        #[arg(long)]
        mark_all_read: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let api = ApiConfig {
        base_url: cli.api_url,
        token: cli.token.map(SecretString::from),
    };

    match cli.command {
        Command::Payment {
            payment_id,
            phone,
            interval_ms,
            max_attempts,
            failed_as_pending,
        } => {
            let config = PaymentPollConfig {
                check_interval: Duration::from_millis(interval_ms),
                max_attempts,
                failed_status: if failed_as_pending {
                    FailedStatusPolicy::TreatAsPending
                } else {
                    FailedStatusPolicy::Terminal
                },
            };
            config.validate().into_diagnostic()?;

            let gateway: PaymentGatewayRef = if cli.simulate {
                Arc::new(ScriptedPaymentGateway::new(vec![
                    ScriptedStatus::Status(PaymentStatus::Pending),
                    ScriptedStatus::Status(PaymentStatus::Processing),
                    ScriptedStatus::Status(PaymentStatus::Completed),
                ]))
            } else {
                Arc::new(RestClient::new(&api).into_diagnostic()?)
            };

            watch_payment(gateway, &payment_id, phone.as_deref(), &config).await
        }
        Command::Notifications {
            interval_ms,
            page_size,
            once,
            mark_all_read,
        } => {
            let config = NotificationPollConfig {
                interval: Duration::from_millis(interval_ms),
                page_size,
            };

            let backend: NotificationBackendRef = if cli.simulate {
                Arc::new(InMemoryNotificationBackend::with_notifications(
                    sample_notifications(),
                ))
            } else {
                Arc::new(RestClient::new(&api).into_diagnostic()?)
            };

            follow_notifications(backend, &config, once, mark_all_read).await
        }
    }
}

async fn watch_payment(
    gateway: PaymentGatewayRef,
    payment_id: &str,
    phone: Option<&str>,
    config: &PaymentPollConfig,
) -> Result<ExitCode> {
    let mut watch = match phone {
        Some(phone) => MpesaCheckout::new(gateway, config.clone())
            .run(payment_id, phone)
            .await
            .into_diagnostic()?,
        None => PaymentPoller::new(gateway)
            .start_with(payment_id, config)
            .into_diagnostic()?,
    };

    let outcome = tokio::select! {
        outcome = watch.outcome() => outcome,
        _ = tokio::signal::ctrl_c() => None,
    };
    if outcome.is_none() {
        watch.cancel();
    }

    Ok(match outcome {
        Some(PollOutcome::Succeeded(snapshot)) => {
            println!("Payment {} completed", snapshot.id);
            ExitCode::SUCCESS
        }
        Some(PollOutcome::Failed(snapshot)) => {
            println!(
                "Payment {} failed: {}",
                snapshot.id,
                snapshot.failure_reason.as_deref().unwrap_or("Payment failed")
            );
            ExitCode::FAILURE
        }
        Some(PollOutcome::TimedOut { attempts, .. }) => {
            println!(
                "Payment timeout after {attempts} checks. Please check your payment history."
            );
            ExitCode::FAILURE
        }
        None => {
            println!("Payment polling cancelled");
            ExitCode::FAILURE
        }
    })
}

async fn follow_notifications(
    backend: NotificationBackendRef,
    config: &NotificationPollConfig,
    once: bool,
    mark_all_read: bool,
) -> Result<ExitCode> {
    let poller = NotificationPoller::from_config(backend, config).into_diagnostic()?;

    if mark_all_read {
        poller.mark_all_read().await.into_diagnostic()?;
    }

    if once {
        poller.refresh_unread_count().await;
        poller.refresh_recent().await;
        print_digest(&poller.digest());
        return Ok(ExitCode::SUCCESS);
    }

    let mut subscriber = poller.subscribe();
    poller.start_polling(config.interval).into_diagnostic()?;

    loop {
        tokio::select! {
            changed = subscriber.changed() => match changed {
                Some(digest) => print_digest(&digest),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop_polling();
    Ok(ExitCode::SUCCESS)
}

fn print_digest(digest: &NotificationDigest) {
    let now = Utc::now();
    println!("unread: {}", digest.unread_count);
    for item in &digest.recent_items {
        println!(
            "{} {}{} ({})",
            item.notification_type.icon(),
            if item.is_read { "" } else { "* " },
            item.title,
            item.relative_time(now)
        );
    }
}

fn sample_notifications() -> Vec<Notification> {
    let now = Utc::now();
    vec![
        Notification {
            id: "sim-1".to_string(),
            notification_type: NotificationType::Welcome,
            title: "Welcome to the marketplace".to_string(),
            message: "Start browsing properties near you".to_string(),
            link: None,
            is_read: true,
            created_at: now - chrono::Duration::days(3),
        },
        Notification {
            id: "sim-2".to_string(),
            notification_type: NotificationType::BookingConfirmed,
            title: "Viewing confirmed".to_string(),
            message: "Your viewing on Saturday is confirmed".to_string(),
            link: Some("/tenant/bookings".to_string()),
            is_read: false,
            created_at: now - chrono::Duration::hours(2),
        },
        Notification {
            id: "sim-3".to_string(),
            notification_type: NotificationType::NewBooking,
            title: "New booking request".to_string(),
            message: "A tenant requested a viewing".to_string(),
            link: None,
            is_read: false,
            created_at: now - chrono::Duration::minutes(5),
        },
    ]
}

/// Initializes the tracing subscriber, logging to stderr.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rentwatch={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use pingwatch::app::MonitorApp;
use pingwatch::config::AppConfig;
use pingwatch::monitor::{HostMonitor, HostStatus};
use pingwatch::notification::{
    NotificationChannel, NotificationEvent, NotificationService, TelegramChannel,
};
use pingwatch::{logging, panic_hook};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let command = args.subcommand();

    let mut config = AppConfig::read(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if matches!(command, Commands::Check) {
        // One-shot check never notifies.
        config.telegram.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging::init_logging(&config.logging, args.verbose, args.quiet)?;
    panic_hook::install();

    let result = match command {
        Commands::Run { skip_verify } => run(config, skip_verify).await,
        Commands::Check => check(config).await,
        Commands::TestNotify => test_notify(config).await,
    };

    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

fn build_channel(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn NotificationChannel>>> {
    if !config.telegram.enabled {
        return Ok(None);
    }
    let channel: Arc<dyn NotificationChannel> = Arc::new(TelegramChannel::new(
        config.telegram.clone(),
        config.monitoring.notification_timeout(),
    )?);
    Ok(Some(channel))
}

async fn run(config: AppConfig, skip_verify: bool) -> anyhow::Result<ExitCode> {
    let channel = build_channel(&config)?;
    match &channel {
        Some(channel) if !skip_verify => {
            let bot = channel
                .verify()
                .await
                .context("Telegram bot check failed (use --skip-verify to start anyway)")?;
            info!(bot = %bot, "Telegram bot verified");
        }
        Some(_) => info!("Skipping Telegram bot check"),
        None => info!("Telegram disabled, transitions will only be logged"),
    }

    let app = Arc::new(MonitorApp::new(&config, config.build_prober(), channel)?);
    let token = app.cancellation_token();

    if let Some(log_dir) = &config.logging.log_dir {
        logging::start_retention_cleanup(
            log_dir.clone(),
            config.logging.retention_days,
            token.child_token(),
        );
    }

    let signal_app = Arc::clone(&app);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_app.stop();
    });

    app.run().await;
    Ok(ExitCode::SUCCESS)
}

async fn check(config: AppConfig) -> anyhow::Result<ExitCode> {
    let registry = config.registry()?;
    let mut settings = config.monitor_settings()?;
    settings.thresholds = pingwatch::monitor::Thresholds::new(1, 1)?;

    let monitor = HostMonitor::new(
        &registry,
        config.build_prober(),
        Arc::new(NotificationService::disabled()),
        settings,
    );
    let report = monitor.run_cycle().await;

    println!("{:<20} {:<24} {:<6} {:>10}", "NAME", "ADDRESS", "STATUS", "LATENCY");
    for check in &report.checks {
        let status = if check.reachable { "UP" } else { "DOWN" };
        let latency = check
            .latency
            .map(|l| format!("{:.1} ms", l.as_secs_f64() * 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<24} {:<6} {:>10}",
            check.host.name, check.host.address, status, latency
        );
    }
    println!(
        "\n{} up, {} down ({} ms)",
        report.up_count(),
        report.down_count(),
        report.elapsed.as_millis()
    );

    let all_up = report.faults == 0
        && report.checks.len() == registry.len()
        && report.checks.iter().all(|c| c.status == HostStatus::Up);
    Ok(if all_up {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn test_notify(config: AppConfig) -> anyhow::Result<ExitCode> {
    let channel = build_channel(&config)?
        .context("Telegram is disabled in the configuration")?;

    let bot = channel.verify().await.context("Telegram bot check failed")?;
    println!("Bot: {bot}");

    let event = NotificationEvent::Test {
        timestamp: Utc::now(),
    };
    channel
        .send(&event)
        .await
        .context("Failed to send test message")?;
    println!("Test message sent to chat {}", config.telegram.chat_id);
    Ok(ExitCode::SUCCESS)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

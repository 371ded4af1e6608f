//! Daily Habit Bot - Main Entry Point
//!
//! Sends the daily message on schedule and answers commands and habit
//! reports until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use daily_habit_bot::commands::CommandHandler;
use daily_habit_bot::config::{DEFAULT_CONFIG_PATH, RawConfig, Settings};
use daily_habit_bot::context::AppContext;
use daily_habit_bot::scheduler::{DailyScheduler, SchedulerMessage, format_local};
use daily_habit_bot::telegram::{TelegramBot, build_dispatcher};

/// Telegram bot that sends a daily message and tracks habit awareness.
#[derive(Parser, Debug)]
#[command(name = "daily_bot")]
#[command(about = "Send a daily message and track habit awareness on Telegram")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_loaded = dotenvy::from_filename(&args.env_file);

    let created = RawConfig::create_default(&args.config)
        .with_context(|| format!("Failed to create configuration file {}", args.config))?;
    let raw = RawConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?
        .with_process_env()
        .context("Invalid environment override")?;

    // Logging comes up before validation so setup problems are reported
    let level = args
        .log_level
        .clone()
        .or_else(|| raw.application.log_level.clone())
        .unwrap_or_else(|| "info".to_owned());
    init_logging(&level);

    if let Err(e) = env_loaded {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }
    if created {
        info!("Config file {} not found, created default", args.config);
    }

    let settings = Settings::from_raw(&raw)
        .with_context(|| format!("Invalid configuration in {}", args.config))?;

    let ctx = AppContext::open(settings).context("Failed to open data directory")?;
    let bot = TelegramBot::new(&ctx.settings.telegram);
    bot.verify()
        .await
        .context("Failed to connect to Telegram. Check your bot token")?;

    info!(
        "Delivering to chat {} at {} ({})",
        ctx.settings.telegram.chat_id,
        ctx.settings.schedule.time.format("%H:%M"),
        ctx.settings.schedule.timezone
    );
    info!(
        "First delivery at {}",
        format_local(ctx.next_fire(chrono::Utc::now()), ctx.settings.schedule.timezone)
    );

    // Create scheduler channel
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(32);

    let scheduler = DailyScheduler::new(Arc::new(bot.clone()), ctx.clone());
    if let Err(e) = scheduler.announce_start().await {
        warn!("Failed to send startup notification: {}", e);
    }
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let mut dispatcher = build_dispatcher(bot, CommandHandler::new(ctx), scheduler_tx.clone());
    let shutdown_token = dispatcher.shutdown_token();
    let mut dispatcher_handle = tokio::spawn(async move {
        dispatcher.dispatch().await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");
    let dispatcher_died = tokio::select! {
        () = wait_for_shutdown_signal() => false,
        joined = &mut dispatcher_handle => {
            match joined {
                Ok(()) => error!("Update dispatcher stopped unexpectedly"),
                Err(e) => error!("Update dispatcher crashed: {}", e),
            }
            true
        }
    };

    // Cleanup
    info!("Shutting down...");
    if !dispatcher_died {
        match shutdown_token.shutdown() {
            Ok(stopped) => stopped.await,
            Err(e) => warn!("Dispatcher was not running: {:?}", e),
        }
        let _ = dispatcher_handle.await;
    }
    let _ = scheduler_tx.send(SchedulerMessage::Shutdown).await;
    let _ = scheduler_handle.await;

    if dispatcher_died {
        bail!("Update dispatcher stopped, the bot can no longer receive commands");
    }
    info!("Stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM where available.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Could not listen for SIGTERM: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

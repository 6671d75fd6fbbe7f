use crate::{
    BOT_NAME, COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, EVENT_TARGET, Error,
    REQUESTS_TARGET,
};
use dashmap::DashMap;
use poise::{Context, FrameworkError};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{Level, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Everything, as JSON
pub const MAIN_LOG_FILE: &str = "sentinel";
/// Moderation events only: scam interdictions, role attributions, departures
pub const EVENT_LOG_FILE: &str = "events";

/// Start instants of running commands, keyed by invocation id
static COMMAND_STARTS: LazyLock<DashMap<u64, Instant>> = LazyLock::new(DashMap::new);

/// Filter selecting the moderation event targets
#[must_use]
pub fn event_targets() -> Targets {
    Targets::new()
        .with_target(EVENT_TARGET, Level::INFO)
        .with_target(REQUESTS_TARGET, Level::INFO)
}

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let main_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, MAIN_LOG_FILE);
    let event_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, EVENT_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    let main_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(main_file);

    let event_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(event_file)
        .with_filter(event_targets());

    // Default to INFO, keeping serenity's gateway chatter out
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info").add_directive(
            "serenity=error"
                .parse()
                .unwrap_or_else(|_| LevelFilter::ERROR.into()),
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(main_layer)
        .with(event_layer)
        .try_init()?;

    info!("{BOT_NAME} logging initialized");
    Ok(())
}

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_, Data, Error>) {
    COMMAND_STARTS.insert(ctx.id(), Instant::now());

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        invocation = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_, Data, Error>) {
    let duration_ms = COMMAND_STARTS
        .remove(&ctx.id())
        .map(|(_, start)| start.elapsed().as_millis())
        .and_then(|ms| u64::try_from(ms).ok())
        .unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            COMMAND_STARTS.remove(&ctx.id());
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

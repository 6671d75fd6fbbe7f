pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod moderation;

pub const BOT_NAME: &str = "modlog_sentinel";
pub const COMMAND_TARGET: &str = "modlog_sentinel::command";
pub const ERROR_TARGET: &str = "modlog_sentinel::error";
pub const EVENT_TARGET: &str = "modlog_sentinel::events";
pub const REQUESTS_TARGET: &str = "modlog_sentinel::requests";
pub const CONSOLE_TARGET: &str = "modlog_sentinel";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

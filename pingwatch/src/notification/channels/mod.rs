//! Notification channels.
//!
//! A channel delivers one rendered event to one external destination.
//! Only the Telegram Bot API is provided.

mod telegram;

pub use telegram::{TelegramChannel, TelegramConfig};

use async_trait::async_trait;

use super::events::NotificationEvent;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<()>;

    /// Check credentials against the remote endpoint.
    ///
    /// Returns a short identity string (e.g. the bot username) on success.
    async fn verify(&self) -> Result<String>;
}

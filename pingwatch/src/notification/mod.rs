//! Notification system module.
//!
//! Turns monitoring events into messages and delivers them through a single
//! channel (Telegram). Delivery is best-effort: one bounded attempt per
//! event, failures are logged and never reach the monitoring loop.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pingwatch::notification::{NotificationService, TelegramChannel, TelegramConfig};
//!
//! let channel = TelegramChannel::new(
//!     TelegramConfig {
//!         bot_token: "123:ABC".to_string(),
//!         chat_id: "456".to_string(),
//!         ..Default::default()
//!     },
//!     Duration::from_secs(10),
//! )?;
//! let service = Arc::new(NotificationService::new(Arc::new(channel), Duration::from_secs(10)));
//! ```

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{NotificationChannel, TelegramChannel, TelegramConfig};
pub use events::{NotificationEvent, NotificationPriority};
pub use service::{NotificationService, NotificationStats};

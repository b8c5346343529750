//! pingwatch: host availability monitor.
//!
//! Probes a fixed list of hosts on an interval, debounces the results into
//! confirmed up/down transitions and reports them through a Telegram bot.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod panic_hook;
pub mod utils;

pub use error::{Error, Result};

//! Publishes ready recipes from a Supabase table to a Telegram channel.
//!
//! Two binaries share this crate: `auto-post` runs a single publish cycle
//! (meant for cron) and `recipe-bot` serves `/start`, `/stats` and `/next`
//! to a fixed set of admins.

pub mod config;
pub mod cycle;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod publisher;
pub mod store;

pub use error::{Error, Result};

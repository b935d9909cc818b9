//! Telegram Bot API client (secondary store)

pub mod client;
pub mod errors;
pub mod file_paths;
pub mod types;

pub use client::{TelegramClient, DEFAULT_API_URL};
pub use errors::TelegramError;

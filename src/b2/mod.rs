//! Backblaze B2 API client (primary store)

pub mod client;
pub mod errors;
pub mod primary;
pub mod types;

pub use client::B2Client;
pub use errors::B2Error;

//! Bot API response shapes

use serde::Deserialize;

use super::errors::TelegramError;

/// Envelope shared by every Bot API method
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error_code: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the `result` of an `ok` response
    pub fn into_result(self) -> Result<T, TelegramError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TelegramError::Malformed("ok response without result".into())),
            (false, _) => Err(TelegramError::Api {
                code: self.error_code.unwrap_or(0),
                description: self.description.unwrap_or_default(),
            }),
        }
    }
}

/// Message returned by `sendDocument`
#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Result of `getFile`
#[derive(Debug, Deserialize)]
pub struct File {
    pub file_id: String,
    /// Relative path on the bot file server; absent when the file is too big
    #[serde(default)]
    pub file_path: Option<String>,
}

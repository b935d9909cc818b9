//! Telegram Bot API client
//!
//! A private chat or channel is used as the append-only secondary store:
//! `sendDocument` archives a file, `getFile` plus the bot file endpoint
//! fetch it back. Download URLs embed the bot token and stay inside this
//! module; neither they nor the token are logged or returned.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::errors::TelegramError;
use super::file_paths::FilePathCache;
use super::types::{ApiResponse, File, Message};
use crate::remote::{RemoteError, RemoteFile, SecondaryObject, SecondaryStore, SecondaryUpload};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Uploads of large documents can take a while
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Telegram caps captions at 1024 characters
const MAX_CAPTION_CHARS: usize = 1024;

/// Bot API client bound to one archive chat
pub struct TelegramClient {
    http_client: Client,
    api_url: String,
    token: String,
    chat_id: String,
    file_paths: FilePathCache,
}

impl TelegramClient {
    /// Build a client and verify the token with `getMe`
    pub async fn connect(api_url: &str, token: &str, chat_id: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let client = Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
            file_paths: FilePathCache::new(),
        };

        let me: serde_json::Value = client
            .call_json("getMe", &[])
            .await
            .context("Telegram bot authorization failed")?;
        info!(
            bot = me.get("username").and_then(|u| u.as_str()).unwrap_or("?"),
            chat_id = %client.chat_id,
            "Telegram client ready"
        );
        Ok(client)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TelegramError> {
        let response = self
            .http_client
            .get(self.method_url(method))
            .query(query)
            .send()
            .await?;
        // Bot API reports failures in the JSON body with a non-2xx status
        let envelope: ApiResponse<T> = response.json().await?;
        envelope.into_result()
    }

    /// Resolve a file id to its path on the bot file server
    async fn resolve_file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        if let Some(path) = self.file_paths.get(file_id) {
            return Ok(path);
        }
        let file: File = self.call_json("getFile", &[("file_id", file_id)]).await?;
        let path = file.file_path.ok_or_else(|| {
            TelegramError::Malformed(format!("no file_path for {}", file.file_id))
        })?;
        self.file_paths.insert(file_id, path.clone());
        Ok(path)
    }

    pub async fn send_document(
        &self,
        upload: &SecondaryUpload<'_>,
    ) -> Result<SecondaryObject, TelegramError> {
        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.to_string())
            .mime_str(upload.mime_type)
            .map_err(|e| TelegramError::Malformed(e.without_url().to_string()))?;

        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("disable_content_type_detection", "true")
            .part("document", part);
        if let Some(caption) = upload.caption {
            let caption: String = caption.chars().take(MAX_CAPTION_CHARS).collect();
            form = form.text("caption", caption);
        }

        info!(
            file = upload.file_name,
            size = upload.file_size,
            "Archiving file to Telegram"
        );

        let response = self
            .http_client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let envelope: ApiResponse<Message> = response.json().await?;
        let message = envelope.into_result()?;

        let document = message.document.ok_or_else(|| {
            TelegramError::Malformed("sendDocument result without document".into())
        })?;

        info!(
            file = upload.file_name,
            message_id = message.message_id,
            "File archived to Telegram"
        );
        Ok(SecondaryObject {
            id: document.file_id,
            reference: Some(message.message_id),
        })
    }

    pub async fn fetch_document(&self, file_id: &str) -> Result<RemoteFile, TelegramError> {
        let file_path = self.resolve_file_path(file_id).await?;

        debug!(file_id = file_id, "Downloading file from Telegram");

        let response = self
            .http_client
            .get(self.file_url(&file_path))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The cached path may have expired server-side
            self.file_paths.invalidate(file_id);
            warn!(file_id = file_id, status = status.as_u16(), "Telegram file download failed");
            return Err(TelegramError::Api {
                code: status.as_u16(),
                description: format!("file download returned {}", status),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|m| *m != "application/octet-stream")
            .map(String::from);
        let bytes = response.bytes().await?;

        info!(file_id = file_id, size = bytes.len(), "Downloaded file from Telegram");
        Ok(RemoteFile {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[async_trait]
impl SecondaryStore for TelegramClient {
    async fn upload_file(
        &self,
        upload: SecondaryUpload<'_>,
    ) -> Result<SecondaryObject, RemoteError> {
        Ok(self.send_document(&upload).await?)
    }

    async fn download_file(&self, id: &str) -> Result<RemoteFile, RemoteError> {
        Ok(self.fetch_document(id).await?)
    }

    fn lookup_stats(&self) -> Option<(u64, u64, f64)> {
        Some(self.file_paths.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> TelegramClient {
        TelegramClient {
            http_client: Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            token: "123:secret".to_string(),
            chat_id: "-100".to_string(),
            file_paths: FilePathCache::new(),
        }
    }

    #[test]
    fn test_urls() {
        let client = offline_client();
        assert_eq!(
            client.method_url("getFile"),
            "https://api.telegram.org/bot123:secret/getFile"
        );
        assert_eq!(
            client.file_url("documents/file_1.pdf"),
            "https://api.telegram.org/file/bot123:secret/documents/file_1.pdf"
        );
    }

    #[tokio::test]
    async fn test_cached_path_skips_get_file() {
        let client = offline_client();
        client
            .file_paths
            .insert("abc", "documents/file_1.pdf".to_string());
        let path = client.resolve_file_path("abc").await.unwrap();
        assert_eq!(path, "documents/file_1.pdf");
        let (hits, misses, hit_rate) = client.lookup_stats().unwrap();
        assert_eq!(hits, 1);
        assert_eq!(misses, 0);
        assert_eq!(hit_rate, 100.0);
    }
}

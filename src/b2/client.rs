//! Backblaze B2 API Client
//!
//! Authenticated access to the bucket that serves as the primary store:
//! listing, download by file id, upload, folder markers and version deletes.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::errors::B2Error;
use super::types::{FileInfo, ListFilesResponse};

/// B2 API base URL for authorization (v3 for nested apiInfo structure)
const B2_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Health status values
pub const HEALTH_HEALTHY: u8 = 0;
pub const HEALTH_DEGRADED: u8 = 1;
pub const HEALTH_UNHEALTHY: u8 = 2;

/// Auth state that can be refreshed (interior mutability)
struct AuthState {
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// B2 API client bound to one bucket
#[derive(Clone)]
pub struct B2Client {
    http_client: Client,
    account_id: String,
    /// Mutable auth state (refreshable on 401)
    auth_state: Arc<RwLock<AuthState>>,
    /// Stored credentials for re-authorization
    key_id: String,
    key: String,
    bucket_id: String,
    bucket_name: String,
    /// Base URL that share links are built on
    public_url: String,
    /// Connection health (0=healthy, 1=degraded, 2=unhealthy)
    health: Arc<AtomicU8>,
}

/// Response from b2_authorize_account API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    authorization_token: String,
    api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInfo {
    storage_api: StorageApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageApiInfo {
    api_url: String,
    download_url: String,
}

/// Response from b2_list_buckets API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

/// Request body for b2_list_file_names API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest {
    bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
    max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<String>,
}

/// Upload URL from B2 (for uploading files)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrl {
    upload_url: String,
    authorization_token: String,
}

/// Turn a non-success response into a typed error
async fn check_status(response: Response) -> Result<Response, B2Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(B2Error::from_status(status.as_u16(), &body))
}

/// Call b2_authorize_account with a Basic auth header
async fn authorize_account(
    http_client: &Client,
    key_id: &str,
    key: &str,
) -> Result<AuthorizeAccountResponse, B2Error> {
    let credentials = format!("{}:{}", key_id, key);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    let auth_header = format!("Basic {}", encoded);

    let response = http_client
        .get(B2_AUTH_URL)
        .header("Authorization", &auth_header)
        .send()
        .await?;

    Ok(check_status(response).await?.json().await?)
}

impl B2Client {
    fn auth_token(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .auth_token
            .clone()
    }

    fn api_url(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .api_url
            .clone()
    }

    fn download_url(&self) -> String {
        self.auth_state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .download_url
            .clone()
    }

    /// Refresh the auth token by re-authorizing with B2
    pub async fn refresh_auth(&self) -> Result<(), B2Error> {
        info!("Refreshing B2 auth token...");

        let auth_response = authorize_account(&self.http_client, &self.key_id, &self.key).await?;

        let mut state = self.auth_state.write().unwrap_or_else(|e| e.into_inner());
        state.auth_token = auth_response.authorization_token;
        state.api_url = auth_response.api_info.storage_api.api_url;
        state.download_url = auth_response.api_info.storage_api.download_url;

        info!("B2 auth token refreshed successfully");
        Ok(())
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, path: &str, f: F) -> Result<T, B2Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, B2Error>>,
    {
        let backoff_ms = [500u64, 1000, 2000];
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_retryable() || attempt == MAX_RETRIES {
                        match e {
                            B2Error::Network(_) | B2Error::Timeout => {
                                self.health.store(HEALTH_UNHEALTHY, Ordering::Relaxed)
                            }
                            B2Error::RateLimited | B2Error::Server(_, _) => {
                                self.health.store(HEALTH_DEGRADED, Ordering::Relaxed)
                            }
                            _ => {}
                        }
                        debug!(operation = operation, path = path, error = %e, "B2 operation failed");
                        return Err(e);
                    }

                    // Handle auth expiry by refreshing token
                    if matches!(e, B2Error::AuthExpired) && attempt == 0 {
                        warn!(operation = operation, "Auth expired, refreshing token...");
                        if let Err(refresh_err) = self.refresh_auth().await {
                            error!(error = %refresh_err, "Failed to refresh auth token");
                        }
                    }

                    let delay = backoff_ms.get(attempt as usize).copied().unwrap_or(2000);
                    warn!(
                        operation = operation,
                        path = path,
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay,
                        error = %e,
                        "Retrying B2 operation"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get connection health status string
    pub fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            HEALTH_DEGRADED => "degraded",
            _ => "unhealthy",
        }
    }

    /// Authorize with B2 and create a new client for the specified bucket
    ///
    /// # Arguments
    /// * `key_id` - B2 application key ID
    /// * `key` - B2 application key
    /// * `bucket_name` - Name of the bucket to access
    /// * `public_url` - Override for the share link base URL
    pub async fn authorize(
        key_id: &str,
        key: &str,
        bucket_name: &str,
        public_url: Option<String>,
    ) -> Result<Self> {
        info!(bucket = bucket_name, "Authorizing with B2 API...");

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let auth_response = authorize_account(&http_client, key_id, key)
            .await
            .context("B2 authorization failed")?;

        let api_url = auth_response.api_info.storage_api.api_url;
        let download_url = auth_response.api_info.storage_api.download_url;
        debug!(api_url = %api_url, "B2 authorization successful");

        let public_url = public_url
            .unwrap_or_else(|| format!("{}/file/{}", download_url, bucket_name))
            .trim_end_matches('/')
            .to_string();

        let mut client = Self {
            http_client,
            account_id: auth_response.account_id,
            auth_state: Arc::new(RwLock::new(AuthState {
                auth_token: auth_response.authorization_token,
                api_url,
                download_url,
            })),
            key_id: key_id.to_string(),
            key: key.to_string(),
            bucket_id: String::new(),
            bucket_name: bucket_name.to_string(),
            public_url,
            health: Arc::new(AtomicU8::new(HEALTH_HEALTHY)),
        };

        client.bucket_id = client.get_bucket_id(bucket_name).await?;

        info!(bucket_name = bucket_name, bucket_id = %client.bucket_id, "B2 client ready");
        Ok(client)
    }

    /// Look up bucket ID from bucket name
    async fn get_bucket_id(&self, bucket_name: &str) -> Result<String> {
        let url = format!("{}/b2api/v2/b2_list_buckets", self.api_url());

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(&serde_json::json!({
                "accountId": self.account_id,
                "bucketName": bucket_name
            }))
            .send()
            .await
            .context("Failed to list buckets")?;

        let list_response: ListBucketsResponse = check_status(response)
            .await
            .context("Failed to list buckets")?
            .json()
            .await
            .context("Failed to parse bucket list")?;

        list_response
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket_name)
            .map(|b| b.bucket_id)
            .ok_or_else(|| anyhow!("Bucket '{}' not found", bucket_name))
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Fetch one page of b2_list_file_names
    async fn list_page(&self, request: &ListFileNamesRequest) -> Result<ListFilesResponse, B2Error> {
        let url = format!("{}/b2api/v2/b2_list_file_names", self.api_url());
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(request)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// List files in the bucket with optional prefix and delimiter
    ///
    /// # Arguments
    /// * `prefix` - Optional path prefix to filter results
    /// * `delimiter` - Optional delimiter for directory-style listing (usually "/")
    pub async fn list_file_names(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<Vec<FileInfo>, B2Error> {
        let mut all_files = Vec::new();
        let mut start_file_name: Option<String> = None;

        loop {
            let request = ListFileNamesRequest {
                bucket_id: self.bucket_id.clone(),
                prefix: prefix.map(String::from),
                delimiter: delimiter.map(String::from),
                max_file_count: 1000,
                start_file_name: start_file_name.clone(),
            };

            debug!(prefix = ?prefix, start = ?start_file_name, "Listing files from B2");

            let page = self
                .with_retry("list_file_names", prefix.unwrap_or(""), || {
                    self.list_page(&request)
                })
                .await?;

            all_files.extend(page.files);

            match page.next_file_name {
                Some(next) => start_file_name = Some(next),
                None => break,
            }
        }

        debug!(count = all_files.len(), "Listed files from B2");
        Ok(all_files)
    }

    /// Find the latest version of an exact file name
    pub async fn find_file(&self, file_name: &str) -> Result<FileInfo, B2Error> {
        let request = ListFileNamesRequest {
            bucket_id: self.bucket_id.clone(),
            prefix: Some(file_name.to_string()),
            delimiter: None,
            max_file_count: 1,
            start_file_name: Some(file_name.to_string()),
        };
        let page = self
            .with_retry("find_file", file_name, || self.list_page(&request))
            .await?;

        page.files
            .into_iter()
            .find(|f| f.file_name == file_name)
            .ok_or_else(|| B2Error::NotFound(file_name.to_string()))
    }

    /// Whether anything at all lives under `prefix`
    pub async fn prefix_exists(&self, prefix: &str) -> Result<bool, B2Error> {
        let request = ListFileNamesRequest {
            bucket_id: self.bucket_id.clone(),
            prefix: Some(prefix.to_string()),
            delimiter: None,
            max_file_count: 1,
            start_file_name: None,
        };
        let page = self
            .with_retry("prefix_exists", prefix, || self.list_page(&request))
            .await?;
        Ok(!page.files.is_empty())
    }

    /// Download file content by B2 file id
    ///
    /// # Returns
    /// File bytes and the stored content type
    pub async fn download_file_by_id(
        &self,
        file_id: &str,
    ) -> Result<(Vec<u8>, Option<String>), B2Error> {
        self.with_retry("download_file_by_id", file_id, || async {
            let url = format!("{}/b2api/v2/b2_download_file_by_id", self.download_url());

            debug!(file_id = file_id, "Downloading file from B2");

            let response = self
                .http_client
                .get(&url)
                .query(&[("fileId", file_id)])
                .header("Authorization", &self.auth_token())
                .send()
                .await?;
            let response = check_status(response).await?;

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let bytes = response.bytes().await?;

            info!(file_id = file_id, size = bytes.len(), "Downloaded file from B2");
            Ok::<_, B2Error>((bytes.to_vec(), content_type))
        })
        .await
    }

    /// Get an upload URL for uploading files to B2
    async fn get_upload_url(&self) -> Result<UploadUrl, B2Error> {
        let url = format!("{}/b2api/v2/b2_get_upload_url", self.api_url());

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.auth_token())
            .json(&serde_json::json!({ "bucketId": self.bucket_id }))
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Upload a file to B2
    ///
    /// Gets an upload URL, calculates SHA1 hash, and uploads file content.
    ///
    /// # Arguments
    /// * `file_name` - Full file path within the bucket
    /// * `data` - File content bytes
    /// * `content_type` - MIME type (e.g. "application/octet-stream")
    pub async fn upload_file(
        &self,
        file_name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<FileInfo, B2Error> {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(data);
        let hash = format!("{:x}", hasher.finalize());

        let encoded_name = urlencoding::encode(file_name);

        info!(
            file = file_name,
            size = data.len(),
            content_type = content_type,
            "Uploading file to B2"
        );

        let uploaded: FileInfo = self
            .with_retry("upload_file", file_name, || async {
                // Upload URLs may go stale after a failure, so fetch one per attempt
                let upload_url = self.get_upload_url().await?;
                let response = self
                    .http_client
                    .post(&upload_url.upload_url)
                    .header("Authorization", &upload_url.authorization_token)
                    .header("X-Bz-File-Name", encoded_name.as_ref())
                    .header("Content-Type", content_type)
                    .header("Content-Length", data.len())
                    .header("X-Bz-Content-Sha1", &hash)
                    .body(data.to_vec())
                    .send()
                    .await?;
                Ok::<_, B2Error>(check_status(response).await?.json::<FileInfo>().await?)
            })
            .await?;

        info!(
            file = file_name,
            file_id = ?uploaded.file_id,
            "File uploaded to B2"
        );
        Ok(uploaded)
    }

    /// Delete a file version from B2 (permanent delete)
    pub async fn delete_file_version(&self, file_name: &str, file_id: &str) -> Result<(), B2Error> {
        info!(file = file_name, file_id = file_id, "Deleting file from B2");

        self.with_retry("delete_file_version", file_name, || async {
            let url = format!("{}/b2api/v2/b2_delete_file_version", self.api_url());
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", &self.auth_token())
                .json(&serde_json::json!({
                    "fileName": file_name,
                    "fileId": file_id
                }))
                .send()
                .await?;
            check_status(response).await?;
            Ok::<_, B2Error>(())
        })
        .await?;

        info!(file = file_name, "File deleted from B2");
        Ok(())
    }

    /// Create a folder marker in B2
    ///
    /// B2 uses zero-byte files with trailing slash as folder markers.
    pub async fn create_folder(&self, folder_path: &str) -> Result<FileInfo, B2Error> {
        let folder_name = if folder_path.ends_with('/') {
            folder_path.to_string()
        } else {
            format!("{}/", folder_path)
        };

        self.upload_file(&folder_name, &[], "application/x-directory")
            .await
    }
}

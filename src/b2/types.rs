//! B2 API types
//!
//! Response shapes for the B2 native API and their conversion to the
//! store-neutral [`RemoteEntry`].

use serde::{Deserialize, Deserializer};

use crate::remote::{EntryKind, RemoteEntry};

/// Deserialize a number that might be encoded as a string or null.
/// B2 API sometimes returns numeric fields as strings (e.g. "1536964279000")
/// and may return null for folder/hide entries.
fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct FlexibleU64Visitor;

    impl<'de> de::Visitor<'de> for FlexibleU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a u64, a string containing a u64, or null")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| de::Error::custom("negative value for u64"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.parse::<u64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(FlexibleU64Visitor)
}

/// B2 file/folder information from API responses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Full file path within the bucket
    pub file_name: String,
    /// File size in bytes (0 for folders)
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub content_length: u64,
    /// Upload timestamp in milliseconds since epoch
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub upload_timestamp: u64,
    /// Action type: "upload", "folder", "hide", "start"
    pub action: String,
    /// Optional file ID (null for folder entries)
    #[serde(default)]
    pub file_id: Option<String>,
    /// Content type (MIME type, null for folder entries)
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Response from b2_list_file_names API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    pub files: Vec<FileInfo>,
    /// Next file name for pagination (None if no more files)
    pub next_file_name: Option<String>,
}

impl FileInfo {
    /// Check if this entry represents a directory
    pub fn is_directory(&self) -> bool {
        self.action == "folder" || self.file_name.ends_with('/')
    }

    /// Get the base name (last component of path)
    pub fn base_name(&self) -> &str {
        let name = self.file_name.trim_end_matches('/');
        name.rsplit('/').next().unwrap_or(name)
    }

    pub fn to_entry(&self) -> RemoteEntry {
        let is_dir = self.is_directory();
        RemoteEntry {
            name: self.base_name().to_string(),
            kind: if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            file_id: if is_dir { None } else { self.file_id.clone() },
            size: self.content_length,
        }
    }
}

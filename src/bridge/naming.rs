//! Destination names and share links

use crate::mapping::paths;

/// Longest sanitized file name, in characters
pub const MAX_NAME_CHARS: usize = 120;

/// Extensions longer than this are treated as part of the stem
const MAX_EXTENSION_CHARS: usize = 16;

pub const FALLBACK_NAME: &str = "file";

fn is_unsafe(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Make an inbound file name safe to use as a single path segment
///
/// Unsafe characters are dropped, whitespace runs collapse to one space and
/// the result is bounded to [`MAX_NAME_CHARS`], keeping a short extension.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !is_unsafe(*c)).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches('.').trim();

    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    if trimmed.chars().count() <= MAX_NAME_CHARS {
        return trimmed.to_string();
    }

    let extension = trimmed
        .rfind('.')
        .map(|i| &trimmed[i..])
        .filter(|ext| ext.chars().count() <= MAX_EXTENSION_CHARS);
    match extension {
        Some(ext) => {
            let stem_len = MAX_NAME_CHARS - ext.chars().count();
            let stem: String = trimmed.chars().take(stem_len).collect();
            format!("{}{}", stem.trim_end(), ext)
        }
        None => trimmed.chars().take(MAX_NAME_CHARS).collect::<String>().trim_end().to_string(),
    }
}

/// Public link to a logical path on the primary store
pub fn share_link(base_url: &str, path: &str) -> String {
    let encoded: Vec<String> = paths::to_key(path)
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}
